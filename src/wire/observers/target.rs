//! Describe and Close share a body: a target kind byte and a name.

use bytes::{BufMut, Bytes};

use crate::wire::utils::{parse_tagged_frame, put_cstr, read_cstr_take, tagged_frame};

use super::ObserveError;

// -----------------------------------------------------------------------------
// ----- Target ----------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Statement,
    Portal,
}

impl Target {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'S' => Some(Target::Statement),
            b'P' => Some(Target::Portal),
            _ => None,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            Target::Statement => b'S',
            Target::Portal => b'P',
        }
    }
}

// -----------------------------------------------------------------------------
// ----- TargetFrameObserver ---------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct TargetFrameObserver<'a> {
    tag: u8,
    target: Target,
    name: &'a str,
}

// -----------------------------------------------------------------------------
// ----- TargetFrameObserver: Static -------------------------------------------

impl<'a> TargetFrameObserver<'a> {
    /// `tag` is `b'D'` for Describe or `b'C'` for Close.
    pub fn new(frame: &'a [u8], tag: u8) -> Result<Self, ObserveError> {
        let meta = parse_tagged_frame(frame, tag)?;
        let body = &frame[5..meta.total_len];

        let (&kind, body) = body.split_first().ok_or(ObserveError::UnexpectedEof)?;
        let target = Target::from_byte(kind).ok_or(ObserveError::UnexpectedTarget(kind))?;
        let (name, rest) = read_cstr_take(body)?;
        if !rest.is_empty() {
            return Err(ObserveError::UnexpectedLength);
        }

        Ok(Self { tag, target, name })
    }

    pub fn build(tag: u8, target: Target, name: &str) -> Bytes {
        tagged_frame(tag, |b| {
            b.put_u8(target.as_byte());
            put_cstr(b, name);
        })
    }
}

// -----------------------------------------------------------------------------
// ----- TargetFrameObserver: Public -------------------------------------------

impl<'a> TargetFrameObserver<'a> {
    #[inline]
    pub fn target(&self) -> Target {
        self.target
    }

    #[inline]
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn renamed(&self, name: &str) -> Bytes {
        Self::build(self.tag, self.target, name)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
