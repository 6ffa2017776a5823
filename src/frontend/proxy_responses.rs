// Proxy responses are backend protocol messages emitted by the pooler itself
// (auth, parameters, admin result sets, answers for cached statements),
// rather than forwarded from a server connection.

use bytes::{BufMut, Bytes};

use crate::shared_types::{BackendIdentity, TransactionStatus};
use crate::wire::utils::{put_cstr, tagged_frame};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const TEXT_OID: i32 = 25;

// -----------------------------------------------------------------------------
// ----- Handshake -------------------------------------------------------------

pub(crate) fn ssl_yes() -> Bytes {
    Bytes::from_static(b"S")
}

pub(crate) fn ssl_no() -> Bytes {
    Bytes::from_static(b"N")
}

pub(crate) fn gssenc_no() -> Bytes {
    Bytes::from_static(b"N")
}

pub(crate) fn auth_cleartext() -> Bytes {
    tagged_frame(b'R', |b| b.put_i32(3))
}

pub(crate) fn auth_ok() -> Bytes {
    tagged_frame(b'R', |b| b.put_i32(0))
}

pub(crate) fn param_status(name: &str, value: &str) -> Bytes {
    tagged_frame(b'S', |b| {
        put_cstr(b, name);
        put_cstr(b, value);
    })
}

pub(crate) fn backend_key_data(identity: BackendIdentity) -> Bytes {
    tagged_frame(b'K', |b| {
        b.put_i32(identity.process_id);
        b.put_i32(identity.secret_key);
    })
}

pub(crate) fn ready_with_status(status: TransactionStatus) -> Bytes {
    tagged_frame(b'Z', |b| b.put_u8(status.as_byte()))
}

// -----------------------------------------------------------------------------
// ----- Extended Protocol -----------------------------------------------------

pub(crate) fn parse_complete() -> Bytes {
    tagged_frame(b'1', |_| {})
}

pub(crate) fn close_complete() -> Bytes {
    tagged_frame(b'3', |_| {})
}

// -----------------------------------------------------------------------------
// ----- Result Sets -----------------------------------------------------------

/// RowDescription with every column typed as text.
pub(crate) fn row_description(columns: &[&str]) -> Bytes {
    tagged_frame(b'T', |b| {
        b.put_i16(columns.len() as i16);
        for name in columns {
            put_cstr(b, name);
            b.put_i32(0); // table oid
            b.put_i16(0); // column attr
            b.put_i32(TEXT_OID);
            b.put_i16(-1); // variable length
            b.put_i32(-1); // no modifier
            b.put_i16(0); // text format
        }
    })
}

pub(crate) fn data_row<S: AsRef<str>>(values: &[S]) -> Bytes {
    tagged_frame(b'D', |b| {
        b.put_i16(values.len() as i16);
        for value in values {
            let value = value.as_ref().as_bytes();
            b.put_i32(value.len() as i32);
            b.extend_from_slice(value);
        }
    })
}

pub(crate) fn command_complete(tag: &str) -> Bytes {
    tagged_frame(b'C', |b| put_cstr(b, tag))
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_for_query_carries_status() {
        let frame = ready_with_status(TransactionStatus::InTransaction);
        assert_eq!(&frame[..], &[b'Z', 0, 0, 0, 5, b'T']);
    }

    #[test]
    fn data_row_lengths() {
        let frame = data_row(&["ab", ""]);
        assert_eq!(
            &frame[..],
            &[b'D', 0, 0, 0, 16, 0, 2, 0, 0, 0, 2, b'a', b'b', 0, 0, 0, 0]
        );
    }

    #[test]
    fn row_description_is_text_typed() {
        let frame = row_description(&["x"]);
        // tag, len, count, "x\0", table oid, attr, type oid ...
        assert_eq!(frame[0], b'T');
        assert_eq!(&frame[5..7], &[0, 1]);
        assert_eq!(&frame[7..9], b"x\0");
        assert_eq!(&frame[15..19], &TEXT_OID.to_be_bytes());
        assert_eq!(frame.len(), 1 + 4 + 2 + 2 + 18);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
