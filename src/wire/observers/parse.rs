use bytes::{BufMut, Bytes};
use smallvec::SmallVec;

use crate::wire::utils::{be_i16, be_i32, parse_tagged_frame, put_cstr, read_cstr, tagged_frame};

use super::ObserveError;

// -----------------------------------------------------------------------------
// ----- ParseFrameObserver ----------------------------------------------------

#[derive(Clone, Debug)]
pub struct ParseFrameObserver<'a> {
    statement: &'a str,
    query: &'a str,
    param_type_oids: SmallVec<[i32; 8]>,
}

// -----------------------------------------------------------------------------
// ----- ParseFrameObserver: Static --------------------------------------------

impl<'a> ParseFrameObserver<'a> {
    /// Validate and build an observer over a complete frame slice.
    pub fn new(frame: &'a [u8]) -> Result<Self, ObserveError> {
        let meta = parse_tagged_frame(frame, b'P')?;
        let mut rest = &frame[5..meta.total_len];

        let statement = read_cstr(&mut rest)?;
        let query = read_cstr(&mut rest)?;

        if rest.len() < 2 {
            return Err(ObserveError::UnexpectedEof);
        }
        let count = be_i16(rest);
        if count < 0 {
            return Err(ObserveError::InvalidCount(count));
        }
        rest = &rest[2..];

        let count = count as usize;
        if rest.len() != 4 * count {
            return Err(ObserveError::UnexpectedLength);
        }
        let param_type_oids = rest.chunks_exact(4).map(be_i32).collect();

        Ok(Self {
            statement,
            query,
            param_type_oids,
        })
    }

    pub fn build(statement: &str, query: &str, param_type_oids: &[i32]) -> Bytes {
        tagged_frame(b'P', |b| {
            put_cstr(b, statement);
            put_cstr(b, query);
            b.put_i16(param_type_oids.len() as i16);
            for oid in param_type_oids {
                b.put_i32(*oid);
            }
        })
    }
}

// -----------------------------------------------------------------------------
// ----- ParseFrameObserver: Public --------------------------------------------

impl<'a> ParseFrameObserver<'a> {
    /// Empty for the unnamed statement.
    #[inline]
    pub fn statement(&self) -> &'a str {
        self.statement
    }

    #[inline]
    pub fn query(&self) -> &'a str {
        self.query
    }

    #[inline]
    pub fn param_type_oids(&self) -> &[i32] {
        &self.param_type_oids
    }

    /// Same Parse, different statement name.
    pub fn renamed(&self, statement: &str) -> Bytes {
        Self::build(statement, self.query, &self.param_type_oids)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
