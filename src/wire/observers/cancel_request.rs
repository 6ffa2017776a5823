use std::{error::Error as StdError, fmt};

use crate::shared_types::BackendIdentity;
use crate::wire::utils::be_i32;

use super::special_packet::peek_special_packet;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub(crate) const CANCEL_REQUEST_CODE: i32 = 80877102;
const CANCEL_REQUEST_LEN: usize = 16;

// -----------------------------------------------------------------------------
// ----- CancelRequestFrameObserver --------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct CancelRequestFrameObserver<'a> {
    frame: &'a [u8],
}

// -----------------------------------------------------------------------------
// ----- CancelRequestFrameObserver: Static ------------------------------------

impl<'a> CancelRequestFrameObserver<'a> {
    /// Cheap, peeks at the header-only. Returns total frame length if fully present.
    #[inline]
    pub fn peek(buf: &[u8]) -> Option<usize> {
        peek_special_packet(buf, CANCEL_REQUEST_LEN, CANCEL_REQUEST_CODE)
    }

    pub fn new(frame: &'a [u8]) -> Result<Self, NewCancelObserverError> {
        if frame.len() != CANCEL_REQUEST_LEN {
            return Err(NewCancelObserverError::UnexpectedLength(frame.len()));
        }

        let code = be_i32(&frame[4..]);
        if code != CANCEL_REQUEST_CODE {
            return Err(NewCancelObserverError::UnexpectedCode(code));
        }

        Ok(Self { frame })
    }
}

// -----------------------------------------------------------------------------
// ----- CancelRequestFrameObserver: Public ------------------------------------

impl<'a> CancelRequestFrameObserver<'a> {
    /// The key the client received in BackendKeyData.
    #[inline]
    pub fn identity(&self) -> BackendIdentity {
        BackendIdentity::new(be_i32(&self.frame[8..]), be_i32(&self.frame[12..]))
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug)]
pub enum NewCancelObserverError {
    UnexpectedLength(usize),
    UnexpectedCode(i32),
}

impl fmt::Display for NewCancelObserverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewCancelObserverError::UnexpectedLength(len) => write!(f, "unexpected length: {len}"),
            NewCancelObserverError::UnexpectedCode(code) => write!(f, "unexpected code: {code}"),
        }
    }
}

impl StdError for NewCancelObserverError {}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
