//! Frontend messages the pooler itself sends to backends.

use bytes::{BufMut, Bytes};

use crate::shared_types::BackendIdentity;
use crate::wire::observers::cancel_request::CANCEL_REQUEST_CODE;
use crate::wire::utils::{put_cstr, tagged_frame, untagged_frame};

pub fn password(password: &str) -> Bytes {
    tagged_frame(b'p', |b| put_cstr(b, password))
}

/// `"md5" + md5(md5(password + user) + salt)`, hex encoded.
pub fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> Bytes {
    let inner = format!("{:x}", md5::compute(format!("{password}{user}")));

    let mut outer = md5::Context::new();
    outer.consume(inner.as_bytes());
    outer.consume(salt);

    let hashed = format!("md5{:x}", outer.compute());
    self::password(&hashed)
}

pub fn sync() -> Bytes {
    tagged_frame(b'S', |_| {})
}

pub fn terminate() -> Bytes {
    tagged_frame(b'X', |_| {})
}

pub fn cancel_request(key: BackendIdentity) -> Bytes {
    untagged_frame(|b| {
        b.put_i32(CANCEL_REQUEST_CODE);
        b.put_i32(key.process_id);
        b.put_i32(key.secret_key);
    })
}
