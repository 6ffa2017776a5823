use super::special_packet::peek_special_packet;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub(crate) const GSSENC_REQUEST_CODE: i32 = 80877104;

// -----------------------------------------------------------------------------
// ----- GSSENCRequestFrameObserver --------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct GSSENCRequestFrameObserver;

impl GSSENCRequestFrameObserver {
    /// Returns total frame length if a complete GSSENCRequest is present.
    #[inline]
    pub fn peek(buf: &[u8]) -> Option<usize> {
        peek_special_packet(buf, 8, GSSENC_REQUEST_CODE)
    }
}
