use std::{error::Error as StdError, fmt, str};

use crate::wire::utils::{ReadCStrError, TaggedFrameError};

// -----------------------------------------------------------------------------
// ----- ObserveError ----------------------------------------------------------

/// Why a complete frame could not be viewed as the expected message.
#[derive(Debug)]
pub enum ObserveError {
    InvalidCount(i16),
    InvalidUtf8(str::Utf8Error),
    UnexpectedEof,
    UnexpectedLength,
    UnexpectedTag(u8),
    UnexpectedVersion(i32),
    UnexpectedTarget(u8),
}

impl fmt::Display for ObserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ObserveError::*;
        match self {
            InvalidCount(c) => write!(f, "invalid count: {c}"),
            InvalidUtf8(e) => write!(f, "utf8: {e}"),
            UnexpectedEof => write!(f, "unexpected EOF"),
            UnexpectedLength => write!(f, "unexpected length"),
            UnexpectedTag(t) => write!(f, "unexpected tag: {t:#X}"),
            UnexpectedVersion(v) => write!(f, "unsupported protocol version: {v}"),
            UnexpectedTarget(t) => write!(f, "unexpected target: {t:#X}"),
        }
    }
}

impl StdError for ObserveError {}

impl From<TaggedFrameError> for ObserveError {
    fn from(e: TaggedFrameError) -> Self {
        match e {
            TaggedFrameError::UnexpectedTag(tag) => ObserveError::UnexpectedTag(tag),
            TaggedFrameError::UnexpectedLength | TaggedFrameError::InvalidLength(_) => {
                ObserveError::UnexpectedLength
            }
        }
    }
}

impl From<ReadCStrError> for ObserveError {
    fn from(e: ReadCStrError) -> Self {
        match e {
            ReadCStrError::UnexpectedEof => ObserveError::UnexpectedEof,
            ReadCStrError::Utf8Error(e) => ObserveError::InvalidUtf8(e),
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
