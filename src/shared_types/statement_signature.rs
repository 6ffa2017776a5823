use std::fmt::Write;

use md5::Context;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const SERVER_NAME_PREFIX: &str = "pgharbor_";

// -----------------------------------------------------------------------------
// ----- StatementSignature ----------------------------------------------------

/// Fingerprint of a prepared statement: query text plus declared parameter
/// types. Two client statements with the same signature are interchangeable
/// on any server connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StatementSignature(pub(crate) [u8; 16]);

impl StatementSignature {
    pub fn new(sql: &str, param_type_oids: &[i32]) -> Self {
        let mut ctx = Context::new();
        ctx.consume(sql.as_bytes());
        ctx.consume([0]);
        for oid in param_type_oids {
            ctx.consume(oid.to_be_bytes());
        }
        StatementSignature(ctx.compute().0)
    }

    /// Content-addressed name used for the statement on the server side.
    pub fn server_name(&self) -> String {
        let mut name = String::with_capacity(SERVER_NAME_PREFIX.len() + 32);
        name.push_str(SERVER_NAME_PREFIX);
        for byte in self.0 {
            let _ = write!(name, "{byte:02x}");
        }
        name
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_types_change_the_signature() {
        let a = StatementSignature::new("SELECT $1", &[23]);
        let b = StatementSignature::new("SELECT $1", &[25]);
        assert_ne!(a, b);
        assert_eq!(a, StatementSignature::new("SELECT $1", &[23]));
    }

    #[test]
    fn server_name_is_stable_hex() {
        let name = StatementSignature::new("SELECT 1", &[]).server_name();
        assert!(name.starts_with("pgharbor_"));
        assert_eq!(name.len(), "pgharbor_".len() + 32);
        assert_eq!(name, StatementSignature::new("SELECT 1", &[]).server_name());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
