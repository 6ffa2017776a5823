use smallvec::SmallVec;

use crate::shared_types::AuthStage;
use crate::wire::MessageType;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const SMALLVEC_SIZE: usize = 16;

// Hand a batch to the session early rather than buffer without bound.
const MAX_COUNT: usize = 64;
const MAX_SIZE: usize = 64 * 1024;

// -----------------------------------------------------------------------------
// ----- SequenceTracker -------------------------------------------------------

/// Complete frames sitting in the inbox that have not been handed out yet,
/// in arrival order.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    frames: SmallVec<[MessageMetadata; SMALLVEC_SIZE]>,
    tracked_bytes: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct MessageMetadata {
    pub message_type: MessageType,
    pub len: usize,
}

// -----------------------------------------------------------------------------
// ----- SequenceTracker: Static -----------------------------------------------

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

// -----------------------------------------------------------------------------
// ----- SequenceTracker: Public -----------------------------------------------

impl SequenceTracker {
    pub fn push(&mut self, message_type: MessageType, len: usize) {
        self.frames.push(MessageMetadata { message_type, len });
        self.tracked_bytes += len;
    }

    /// Bytes of the next sequence ready for processing, removed from the
    /// tracker. Before authentication every frame is its own sequence.
    pub fn take_until_flush(&mut self, stage: AuthStage) -> Option<usize> {
        let frames = match stage {
            AuthStage::Startup | AuthStage::Authenticating => {
                (!self.frames.is_empty()).then_some(1)
            }
            AuthStage::Ready => self.find_ready_boundary(),
        }?;

        let bytes: usize = self.frames.drain(..frames).map(|meta| meta.len).sum();
        self.tracked_bytes -= bytes;
        Some(bytes)
    }

    /// Length of all tracked frames, in bytes.
    pub fn len(&self) -> usize {
        self.tracked_bytes
    }

    pub fn count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

// -----------------------------------------------------------------------------
// ----- SequenceTracker: Private ----------------------------------------------

impl SequenceTracker {
    fn find_ready_boundary(&self) -> Option<usize> {
        let mut bytes = 0;

        for (index, meta) in self.frames.iter().enumerate() {
            bytes += meta.len;

            let is_boundary = meta.message_type.ends_sequence();
            let is_too_large = bytes >= MAX_SIZE || index + 1 >= MAX_COUNT;
            // Streaming COPY data goes out as it arrives.
            let is_copy = meta.message_type == MessageType::CopyData;

            if is_boundary || is_too_large || is_copy {
                return Some(index + 1);
            }
        }

        None
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
