//! NUL-terminated UTF-8 strings, the string encoding of every v3 message.

use memchr::memchr;
use std::{error::Error as StdError, fmt, str};

// -----------------------------------------------------------------------------
// ----- read_cstr -------------------------------------------------------------

/// Read a string from the front of `input` and advance `input` past its NUL.
#[inline]
pub fn read_cstr<'a>(input: &mut &'a [u8]) -> Result<&'a str, ReadCStrError> {
    let (value, rest) = read_cstr_take(input)?;
    *input = rest;
    Ok(value)
}

/// Read a string from the front of `input`, returning it with the remainder.
#[inline]
pub fn read_cstr_take(input: &[u8]) -> Result<(&str, &[u8]), ReadCStrError> {
    let nul = memchr(0, input).ok_or(ReadCStrError::UnexpectedEof)?;
    let value = str::from_utf8(&input[..nul]).map_err(ReadCStrError::Utf8Error)?;
    Ok((value, &input[nul + 1..]))
}

// -----------------------------------------------------------------------------
// ----- Error -----------------------------------------------------------------

#[derive(Debug)]
pub enum ReadCStrError {
    UnexpectedEof,
    Utf8Error(str::Utf8Error),
}

impl fmt::Display for ReadCStrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadCStrError::UnexpectedEof => write!(f, "unexpected EOF"),
            ReadCStrError::Utf8Error(e) => write!(f, "UTF-8 error: {e}"),
        }
    }
}

impl StdError for ReadCStrError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ReadCStrError::Utf8Error(e) => Some(e),
            ReadCStrError::UnexpectedEof => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
