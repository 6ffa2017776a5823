use bytes::BytesMut;
use std::io;

use crate::frontend::sequence_tracker::SequenceTracker;
use crate::frontend::transport::FrontendTransport;
use crate::shared_types::AuthStage;
use crate::wire::utils::peek_frontend;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const READ_RESERVE: usize = 4096;
const OUTBOX_HINT: usize = 4096;

// -----------------------------------------------------------------------------
// ----- FrontendBuffers -------------------------------------------------------

/// Bytes read from the client, the frame boundaries found in them so far,
/// and replies waiting to be written back.
#[derive(Debug)]
pub(crate) struct FrontendBuffers {
    received: BytesMut,
    frames: SequenceTracker,
    replies: BytesMut,
}

// -----------------------------------------------------------------------------
// ----- FrontendBuffers: Static -----------------------------------------------

impl FrontendBuffers {
    pub(crate) fn new() -> Self {
        Self {
            received: BytesMut::with_capacity(READ_RESERVE),
            frames: SequenceTracker::new(),
            replies: BytesMut::with_capacity(OUTBOX_HINT),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- FrontendBuffers: Inbound ----------------------------------------------

impl FrontendBuffers {
    /// Cancel safe: whatever was read before cancellation stays buffered.
    pub(crate) async fn read_from(&mut self, transport: &mut FrontendTransport) -> io::Result<usize> {
        self.received.reserve(READ_RESERVE);
        transport.read_buf(&mut self.received).await
    }

    /// Record every complete frame past the last one already tracked.
    pub(crate) fn track_new_inbox_frames(&mut self, stage: AuthStage) {
        while let Some(found) = peek_frontend(stage, &self.received[self.frames.len()..]) {
            self.frames.push(found.message_type, found.len);
        }
    }

    /// Split off the next batch the session should handle as a unit.
    pub(crate) fn pull_next_sequence(&mut self, stage: AuthStage) -> Option<BytesMut> {
        self.frames
            .take_until_flush(stage)
            .map(|len| self.received.split_to(len))
    }

    /// Input left over once the handshake is done, e.g. a query sent right
    /// behind the password.
    pub(crate) fn has_buffered_input(&self) -> bool {
        !self.received.is_empty()
    }
}

// -----------------------------------------------------------------------------
// ----- FrontendBuffers: Outbound ---------------------------------------------

impl FrontendBuffers {
    pub(crate) fn queue_response(&mut self, frame: &[u8]) {
        self.replies.extend_from_slice(frame);
    }

    pub(crate) fn has_pending_output(&self) -> bool {
        !self.replies.is_empty()
    }

    pub(crate) async fn flush_to(&mut self, transport: &mut FrontendTransport) -> io::Result<()> {
        if self.replies.is_empty() {
            return Ok(());
        }
        transport.write_all_buf(&mut self.replies).await?;
        transport.flush().await
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
