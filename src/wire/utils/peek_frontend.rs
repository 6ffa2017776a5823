use crate::shared_types::AuthStage;
use crate::wire::observers::{
    cancel_request::CancelRequestFrameObserver, gssenc_request::GSSENCRequestFrameObserver,
    ssl_request::SSLRequestFrameObserver,
};
use crate::wire::types::MessageType;

use super::frame::{be_i32, peek_any_tagged_frame};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

// Startup packets are small; anything larger is garbage or an attack.
const MAX_STARTUP_PACKET_LEN: usize = 10_000;

// -----------------------------------------------------------------------------
// ----- Structs ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeekResult {
    pub message_type: MessageType,
    pub len: usize,
}

// -----------------------------------------------------------------------------
// ----- peek_frontend ---------------------------------------------------------

/// Classify the complete frame at the front of `bytes`, if there is one.
///
/// Returns `None` while the frame is still incomplete. Malformed startup
/// packets are reported as `Startup` so the handler can reject them with a
/// proper error instead of waiting forever.
pub fn peek_frontend(stage: AuthStage, bytes: &[u8]) -> Option<PeekResult> {
    match stage {
        AuthStage::Startup => peek_frontend_startup(bytes),
        AuthStage::Authenticating => peek_frontend_tagged(bytes, |tag| match tag {
            b'p' => MessageType::PasswordMessage,
            other => MessageType::Unknown(other),
        }),
        AuthStage::Ready => peek_frontend_tagged(bytes, MessageType::from_ready_tag),
    }
}

// -----------------------------------------------------------------------------
// ----- peek_frontend: Startup ------------------------------------------------

#[inline]
fn peek_frontend_startup(bytes: &[u8]) -> Option<PeekResult> {
    if let Some(len) = SSLRequestFrameObserver::peek(bytes) {
        return Some(PeekResult {
            message_type: MessageType::SSLRequest,
            len,
        });
    }

    if let Some(len) = GSSENCRequestFrameObserver::peek(bytes) {
        return Some(PeekResult {
            message_type: MessageType::GSSENCRequest,
            len,
        });
    }

    if let Some(len) = CancelRequestFrameObserver::peek(bytes) {
        return Some(PeekResult {
            message_type: MessageType::CancelRequest,
            len,
        });
    }

    if bytes.len() < 8 {
        return None;
    }

    let len = be_i32(bytes) as u32 as usize;
    let len = len.clamp(8, MAX_STARTUP_PACKET_LEN);
    if bytes.len() < len {
        return None;
    }

    Some(PeekResult {
        message_type: MessageType::Startup,
        len,
    })
}

// -----------------------------------------------------------------------------
// ----- peek_frontend: Tagged -------------------------------------------------

#[inline]
fn peek_frontend_tagged(bytes: &[u8], classify: impl Fn(u8) -> MessageType) -> Option<PeekResult> {
    let meta = peek_any_tagged_frame(bytes)?;

    Some(PeekResult {
        message_type: classify(bytes[0]),
        len: meta.total_len,
    })
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
