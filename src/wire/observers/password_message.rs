use crate::wire::utils::{parse_tagged_frame, read_cstr_take};

use super::ObserveError;

// -----------------------------------------------------------------------------
// ----- PasswordMessageFrameObserver ------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct PasswordMessageFrameObserver<'a> {
    password: &'a str,
}

impl<'a> PasswordMessageFrameObserver<'a> {
    pub fn new(frame: &'a [u8]) -> Result<Self, ObserveError> {
        let meta = parse_tagged_frame(frame, b'p')?;
        let (password, rest) = read_cstr_take(&frame[5..meta.total_len])?;
        if !rest.is_empty() {
            return Err(ObserveError::UnexpectedLength);
        }

        Ok(Self { password })
    }

    #[inline]
    pub fn password(&self) -> &'a str {
        self.password
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
