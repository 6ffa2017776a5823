use bytes::{BufMut, Bytes, BytesMut};

use crate::wire::utils::tagged_frame;

// -----------------------------------------------------------------------------
// ----- ErrorResponse ---------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct ErrorResponse {
    pub severity: Severity, // S
    pub code: &'static str, // C (SQLSTATE 5-char)
    pub message: String,    // M

    pub detail: Option<String>, // D
    pub hint: Option<String>,   // H
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse: Static -------------------------------------------------

impl ErrorResponse {
    pub fn new(severity: Severity, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, "XX000", message)
    }

    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, "08P01", message)
    }

    pub fn invalid_password(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, "28P01", message)
    }

    pub fn unknown_database(database: &str) -> Self {
        Self::new(
            Severity::Fatal,
            "3D000",
            format!("database \"{database}\" does not exist"),
        )
    }

    /// No server connection became available in time. Not fatal: the client
    /// may retry on its next query.
    pub fn pool_timeout(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, "53300", message)
    }

    pub fn backend_broken(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, "08006", message)
    }

    pub fn admin_shutdown() -> Self {
        Self::new(
            Severity::Fatal,
            "57P01",
            "terminating connection due to administrator command",
        )
    }

    pub fn cannot_connect_now() -> Self {
        Self::new(Severity::Fatal, "57P03", "the pooler is shutting down")
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, "42601", message)
    }

    pub fn active_transaction(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, "25001", message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, "22023", message)
    }
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse: Builder ------------------------------------------------

impl ErrorResponse {
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse: Public -------------------------------------------------

impl ErrorResponse {
    /// Build the backend 'E' frame. Returns a complete wire buffer.
    pub fn to_bytes(&self) -> Bytes {
        tagged_frame(b'E', |buf| {
            put_field(buf, b'S', self.severity.as_str());
            put_field(buf, b'V', self.severity.as_str());
            put_field(buf, b'C', self.code);
            put_field(buf, b'M', &self.message);

            if let Some(v) = self.detail.as_deref() {
                put_field(buf, b'D', v);
            }

            if let Some(v) = self.hint.as_deref() {
                put_field(buf, b'H', v);
            }

            buf.put_u8(0); // terminator
        })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.severity, Severity::Fatal | Severity::Panic)
    }
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse: Severity -----------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub enum Severity {
    #[default]
    Error,
    Fatal,
    Panic,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
            Severity::Panic => "PANIC",
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

#[inline]
fn put_field(buf: &mut BytesMut, tag: u8, val: &str) {
    buf.put_u8(tag);
    buf.extend_from_slice(val.as_bytes());
    buf.put_u8(0);
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_minimal_error() {
        let b = ErrorResponse::internal_error("boom").to_bytes();
        assert_eq!(b[0], b'E');
        let len = u32::from_be_bytes([b[1], b[2], b[3], b[4]]) as usize;
        assert_eq!(len + 1, b.len());
        assert_eq!(*b.last().unwrap(), 0);
    }

    #[test]
    fn carries_code_and_optional_fields() {
        let b = ErrorResponse::cannot_connect_now()
            .with_detail("draining")
            .with_hint("retry later")
            .to_bytes();
        assert!(b.windows(7).any(|w| w == b"SFATAL\0"));
        assert!(b.windows(7).any(|w| w == b"C57P03\0"));
        assert!(b.windows(10).any(|w| w == b"Ddraining\0"));
    }

    #[test]
    fn pool_timeout_is_not_fatal() {
        assert!(!ErrorResponse::pool_timeout("timeout").is_fatal());
        assert!(ErrorResponse::admin_shutdown().is_fatal());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
