use bytes::Bytes;

use crate::wire::utils::{parse_tagged_frame, put_cstr, read_cstr, tagged_frame};

use super::ObserveError;

// -----------------------------------------------------------------------------
// ----- BindFrameObserver -----------------------------------------------------

/// Bind is only inspected for its portal and statement names. Parameter
/// formats and values travel through untouched in `rest`.
#[derive(Clone, Copy, Debug)]
pub struct BindFrameObserver<'a> {
    portal: &'a str,
    statement: &'a str,
    rest: &'a [u8],
}

// -----------------------------------------------------------------------------
// ----- BindFrameObserver: Static ---------------------------------------------

impl<'a> BindFrameObserver<'a> {
    pub fn new(frame: &'a [u8]) -> Result<Self, ObserveError> {
        let meta = parse_tagged_frame(frame, b'B')?;
        let mut rest = &frame[5..meta.total_len];

        let portal = read_cstr(&mut rest)?;
        let statement = read_cstr(&mut rest)?;

        // Format code count, parameter count, result format count.
        if rest.len() < 6 {
            return Err(ObserveError::UnexpectedEof);
        }

        Ok(Self {
            portal,
            statement,
            rest,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- BindFrameObserver: Public ---------------------------------------------

impl<'a> BindFrameObserver<'a> {
    #[inline]
    pub fn portal(&self) -> &'a str {
        self.portal
    }

    #[inline]
    pub fn statement(&self) -> &'a str {
        self.statement
    }

    /// Same Bind, pointed at another prepared statement.
    pub fn renamed(&self, statement: &str) -> Bytes {
        tagged_frame(b'B', |b| {
            put_cstr(b, self.portal);
            put_cstr(b, statement);
            b.extend_from_slice(self.rest);
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn bind_frame(portal: &str, statement: &str) -> Bytes {
        tagged_frame(b'B', |b| {
            put_cstr(b, portal);
            put_cstr(b, statement);
            b.put_i16(1);
            b.put_i16(0);
            b.put_i16(1);
            b.put_i32(1);
            b.put_u8(b'7');
            b.put_i16(0);
        })
    }

    #[test]
    fn reads_names() {
        let frame = bind_frame("p1", "s1");
        let observer = BindFrameObserver::new(&frame).unwrap();
        assert_eq!(observer.portal(), "p1");
        assert_eq!(observer.statement(), "s1");
    }

    #[test]
    fn renamed_preserves_parameters() {
        let frame = bind_frame("", "s1");
        let renamed = BindFrameObserver::new(&frame).unwrap().renamed("pgharbor_00");
        assert_eq!(renamed, bind_frame("", "pgharbor_00"));
    }

    #[test]
    fn truncated_body_is_rejected() {
        let frame = tagged_frame(b'B', |b| {
            put_cstr(b, "");
            put_cstr(b, "s1");
        });
        assert!(matches!(
            BindFrameObserver::new(&frame),
            Err(ObserveError::UnexpectedEof)
        ));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
