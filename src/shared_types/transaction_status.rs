// -----------------------------------------------------------------------------
// ----- TransactionStatus -----------------------------------------------------

/// Maps to the ReadyForQuery transaction status byte. The backend reports it
/// after every sync point and the session state machine follows it; the
/// proxy also emits it for responses it produces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    #[default]
    Idle,
    InTransaction,
    /// An error occurred inside a transaction block; only ROLLBACK is accepted.
    Aborted,
}

// -----------------------------------------------------------------------------
// ----- TransactionStatus: Static ---------------------------------------------

impl TransactionStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'I' => Some(TransactionStatus::Idle),
            b'T' => Some(TransactionStatus::InTransaction),
            b'E' => Some(TransactionStatus::Aborted),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            TransactionStatus::Idle => b'I',
            TransactionStatus::InTransaction => b'T',
            TransactionStatus::Aborted => b'E',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Idle => "idle",
            TransactionStatus::InTransaction => "in transaction",
            TransactionStatus::Aborted => "aborted",
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
