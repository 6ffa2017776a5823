use bytes::Bytes;

use crate::wire::utils::{parse_tagged_frame, put_cstr, read_cstr_take, tagged_frame};

use super::ObserveError;

// -----------------------------------------------------------------------------
// ----- QueryFrameObserver ----------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct QueryFrameObserver<'a> {
    query: &'a str,
}

// -----------------------------------------------------------------------------
// ----- QueryFrameObserver: Static --------------------------------------------

impl<'a> QueryFrameObserver<'a> {
    pub fn new(frame: &'a [u8]) -> Result<Self, ObserveError> {
        let meta = parse_tagged_frame(frame, b'Q')?;
        let (query, rest) = read_cstr_take(&frame[5..meta.total_len])?;
        if !rest.is_empty() {
            return Err(ObserveError::UnexpectedLength);
        }

        Ok(Self { query })
    }

    pub fn build(query: &str) -> Bytes {
        tagged_frame(b'Q', |b| put_cstr(b, query))
    }
}

// -----------------------------------------------------------------------------
// ----- QueryFrameObserver: Public --------------------------------------------

impl<'a> QueryFrameObserver<'a> {
    #[inline]
    pub fn query(&self) -> &'a str {
        self.query
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
