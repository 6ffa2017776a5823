//! Frontend message kinds the pooler distinguishes. Backend frames are
//! handled by tag byte directly (see `utils::peek_backend`).

// -----------------------------------------------------------------------------
// ----- MessageType -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    // -- Frontend (startup)
    Startup,       // no tag (length + protocol + params)
    SSLRequest,    // no tag (special startup packet)
    GSSENCRequest, // no tag (special startup packet)
    CancelRequest, // no tag (special startup packet)

    // -- Frontend (authenticating)
    PasswordMessage, // 'p'

    // -- Frontend (ready)
    Bind,         // 'B'
    Close,        // 'C'
    CopyData,     // 'd'
    CopyDone,     // 'c'
    CopyFail,     // 'f'
    Describe,     // 'D'
    Execute,      // 'E'
    Flush,        // 'H'
    FunctionCall, // 'F'
    Parse,        // 'P'
    Query,        // 'Q'
    Sync,         // 'S'
    Terminate,    // 'X'

    /// Well-formed tagged frame with a tag the pooler does not know.
    Unknown(u8),
}

// -----------------------------------------------------------------------------
// ----- MessageType: Static ---------------------------------------------------

impl MessageType {
    pub fn from_ready_tag(tag: u8) -> Self {
        match tag {
            b'B' => MessageType::Bind,
            b'C' => MessageType::Close,
            b'd' => MessageType::CopyData,
            b'c' => MessageType::CopyDone,
            b'f' => MessageType::CopyFail,
            b'D' => MessageType::Describe,
            b'E' => MessageType::Execute,
            b'H' => MessageType::Flush,
            b'F' => MessageType::FunctionCall,
            b'P' => MessageType::Parse,
            b'Q' => MessageType::Query,
            b'S' => MessageType::Sync,
            b'X' => MessageType::Terminate,
            other => MessageType::Unknown(other),
        }
    }

    /// Frames after which the client expects the pooler to act instead of
    /// buffering more input.
    pub fn ends_sequence(self) -> bool {
        matches!(
            self,
            MessageType::Sync
                | MessageType::Flush
                | MessageType::Query
                | MessageType::Terminate
                | MessageType::CopyDone
                | MessageType::CopyFail
                | MessageType::FunctionCall
        )
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
