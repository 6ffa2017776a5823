// Helpers for tagged frames: Byte1 tag, Int32 length (self-inclusive), body.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedFrame {
    pub len: usize,
    pub total_len: usize,
}

#[derive(Debug)]
pub enum TaggedFrameError {
    UnexpectedTag(u8),
    UnexpectedLength,
    InvalidLength(usize),
}

pub fn peek_tagged_frame(buf: &[u8], tag: u8) -> Option<TaggedFrame> {
    if buf.len() < 5 || buf[0] != tag {
        return None;
    }

    peek_any_tagged_frame(buf)
}

/// Like `peek_tagged_frame` but accepts whatever tag is present.
pub fn peek_any_tagged_frame(buf: &[u8]) -> Option<TaggedFrame> {
    if buf.len() < 5 {
        return None;
    }

    let len = be_i32(&buf[1..]) as u32 as usize;
    if len < 4 {
        return None;
    }

    let total_len = 1 + len;
    if buf.len() < total_len {
        return None;
    }

    Some(TaggedFrame { len, total_len })
}

pub fn parse_tagged_frame(frame: &[u8], tag: u8) -> Result<TaggedFrame, TaggedFrameError> {
    if frame.len() < 5 {
        return Err(TaggedFrameError::UnexpectedLength);
    }

    if frame[0] != tag {
        return Err(TaggedFrameError::UnexpectedTag(frame[0]));
    }

    let len = be_i32(&frame[1..]) as u32 as usize;
    if len < 4 {
        return Err(TaggedFrameError::InvalidLength(len));
    }

    let total_len = 1 + len;
    if frame.len() != total_len {
        return Err(TaggedFrameError::UnexpectedLength);
    }

    Ok(TaggedFrame { len, total_len })
}

#[inline]
pub fn be_i32(b: &[u8]) -> i32 {
    i32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
pub fn be_i16(b: &[u8]) -> i16 {
    i16::from_be_bytes([b[0], b[1]])
}
