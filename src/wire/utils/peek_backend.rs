use super::frame::peek_any_tagged_frame;

// -----------------------------------------------------------------------------
// ----- BackendFrame ----------------------------------------------------------

/// Tag and total size (tag byte included) of a complete backend frame at the
/// front of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendFrame {
    pub tag: u8,
    pub total_len: usize,
}

// -----------------------------------------------------------------------------
// ----- peek_backend ----------------------------------------------------------

pub fn peek_backend(bytes: &[u8]) -> Option<BackendFrame> {
    let meta = peek_any_tagged_frame(bytes)?;

    Some(BackendFrame {
        tag: bytes[0],
        total_len: meta.total_len,
    })
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
