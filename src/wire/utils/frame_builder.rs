use bytes::{BufMut, Bytes, BytesMut};

// -----------------------------------------------------------------------------
// ----- Frame Builders --------------------------------------------------------

/// Build a tagged frame, filling in the self-inclusive length once the body
/// has been written.
pub fn tagged_frame(tag: u8, body: impl FnOnce(&mut BytesMut)) -> Bytes {
    let mut b = BytesMut::with_capacity(64);
    b.put_u8(tag);
    b.put_u32(0);
    body(&mut b);
    let len = (b.len() - 1) as u32;
    b[1..5].copy_from_slice(&len.to_be_bytes());
    b.freeze()
}

/// Build an untagged packet (startup family): Int32 length then body.
pub fn untagged_frame(body: impl FnOnce(&mut BytesMut)) -> Bytes {
    let mut b = BytesMut::with_capacity(64);
    b.put_u32(0);
    body(&mut b);
    let len = b.len() as u32;
    b[0..4].copy_from_slice(&len.to_be_bytes());
    b.freeze()
}

#[inline]
pub fn put_cstr(b: &mut BytesMut, value: &str) {
    b.extend_from_slice(value.as_bytes());
    b.put_u8(0);
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
