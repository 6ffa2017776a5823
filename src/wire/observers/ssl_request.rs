use super::special_packet::peek_special_packet;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub(crate) const SSL_REQUEST_CODE: i32 = 80877103;

// -----------------------------------------------------------------------------
// ----- SSLRequestFrameObserver -----------------------------------------------

/// SSLRequest carries no payload beyond its code, so only peeking is needed.
#[derive(Clone, Copy, Debug)]
pub struct SSLRequestFrameObserver;

impl SSLRequestFrameObserver {
    /// Returns total frame length if a complete SSLRequest is present.
    #[inline]
    pub fn peek(buf: &[u8]) -> Option<usize> {
        peek_special_packet(buf, 8, SSL_REQUEST_CODE)
    }
}
