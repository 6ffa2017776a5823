use crate::wire::utils::be_i32;

/// Untagged packets identified by a fixed length and a magic request code.
#[inline]
pub(crate) fn peek_special_packet(buf: &[u8], expected_len: usize, code: i32) -> Option<usize> {
    if buf.len() < expected_len {
        return None;
    }

    if be_i32(buf) as usize != expected_len || be_i32(&buf[4..]) != code {
        return None;
    }

    Some(expected_len)
}
