use bytes::{BufMut, Bytes};
use smallvec::SmallVec;

use crate::wire::utils::{be_i32, put_cstr, read_cstr, untagged_frame};

use super::ObserveError;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Protocol 3.0.
pub const PROTOCOL_VERSION: i32 = 196608;

// -----------------------------------------------------------------------------
// ----- StartupFrameObserver --------------------------------------------------

#[derive(Clone, Debug)]
pub struct StartupFrameObserver<'a> {
    params: SmallVec<[(&'a str, &'a str); 8]>,
}

// -----------------------------------------------------------------------------
// ----- StartupFrameObserver: Static ------------------------------------------

impl<'a> StartupFrameObserver<'a> {
    pub fn new(frame: &'a [u8]) -> Result<Self, ObserveError> {
        if frame.len() < 8 {
            return Err(ObserveError::UnexpectedEof);
        }

        if be_i32(frame) as u32 as usize != frame.len() {
            return Err(ObserveError::UnexpectedLength);
        }

        let version = be_i32(&frame[4..]);
        if version != PROTOCOL_VERSION {
            return Err(ObserveError::UnexpectedVersion(version));
        }

        let mut rest = &frame[8..];
        let mut params = SmallVec::new();
        loop {
            let key = read_cstr(&mut rest)?;
            if key.is_empty() {
                break;
            }
            let value = read_cstr(&mut rest)?;
            params.push((key, value));
        }

        if !rest.is_empty() {
            return Err(ObserveError::UnexpectedLength);
        }

        Ok(Self { params })
    }

    /// StartupMessage with the given parameters, as sent to a backend.
    pub fn build(params: &[(&str, &str)]) -> Bytes {
        untagged_frame(|b| {
            b.put_i32(PROTOCOL_VERSION);
            for (key, value) in params {
                put_cstr(b, key);
                put_cstr(b, value);
            }
            b.put_u8(0);
        })
    }
}

// -----------------------------------------------------------------------------
// ----- StartupFrameObserver: Public ------------------------------------------

impl<'a> StartupFrameObserver<'a> {
    pub fn param(&self, name: &str) -> Option<&'a str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }

    pub fn params(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.params.iter().copied()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
