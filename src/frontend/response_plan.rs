use bytes::Bytes;
use smallvec::SmallVec;
use std::collections::VecDeque;

use crate::shared_types::{StatementSignature, TransactionStatus};

// -----------------------------------------------------------------------------
// ----- Types -----------------------------------------------------------------

/// Frontend message whose backend reply is still owed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expect {
    Parse,
    Bind,
    Close,
    Describe,
    Execute,
    Sync,
    /// Simple query or function call: everything up to ReadyForQuery.
    Query,
}

impl Expect {
    fn is_sync_point(self) -> bool {
        matches!(self, Expect::Sync | Expect::Query)
    }
}

#[derive(Debug)]
enum PlanEntry {
    Server {
        expect: Expect,
        /// Hidden entries were injected by the pooler; their replies are
        /// swallowed.
        visible: bool,
        /// Set for Parse entries that register a statement on the server.
        signature: Option<StatementSignature>,
    },
    /// A reply the pooler produces itself, emitted once it reaches the front.
    Synthetic(Bytes),
}

/// What to do with one backend frame.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Observed {
    pub forward: bool,
    /// ReadyForQuery retired a sync point.
    pub ready: Option<TransactionStatus>,
    /// Statements the server never prepared after all.
    pub failed_statements: SmallVec<[StatementSignature; 2]>,
    /// A Close for an evicted statement was skipped, so the server still
    /// holds a statement the connection's cache no longer lists.
    pub cache_desynced: bool,
}

// -----------------------------------------------------------------------------
// ----- ResponsePlan ----------------------------------------------------------

/// Ordered record of the replies a session still expects from its server
/// connection. Backend frames retire entries front to back.
#[derive(Debug, Default)]
pub(crate) struct ResponsePlan {
    entries: VecDeque<PlanEntry>,
    sync_points: usize,
    pending_syncs: usize,
}

// -----------------------------------------------------------------------------
// ----- ResponsePlan: Static --------------------------------------------------

impl ResponsePlan {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

// -----------------------------------------------------------------------------
// ----- ResponsePlan: Public --------------------------------------------------

impl ResponsePlan {
    pub(crate) fn push(&mut self, expect: Expect) {
        self.push_server(expect, true, None);
    }

    pub(crate) fn push_hidden(&mut self, expect: Expect) {
        self.push_server(expect, false, None);
    }

    pub(crate) fn push_parse(&mut self, visible: bool, signature: Option<StatementSignature>) {
        self.push_server(Expect::Parse, visible, signature);
    }

    pub(crate) fn push_synthetic(&mut self, reply: Bytes) {
        self.entries.push_back(PlanEntry::Synthetic(reply));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outstanding Sync and simple-query replies.
    pub(crate) fn sync_points(&self) -> usize {
        self.sync_points
    }

    /// At least one extended-protocol Sync is in flight.
    pub(crate) fn is_pipelining(&self) -> bool {
        self.pending_syncs > 0
    }

    /// Next reply the pooler owes the client by itself, if it is due.
    pub(crate) fn pop_synthetic(&mut self) -> Option<Bytes> {
        match self.entries.front() {
            Some(PlanEntry::Synthetic(_)) => match self.entries.pop_front() {
                Some(PlanEntry::Synthetic(reply)) => Some(reply),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn observe(&mut self, frame: &[u8]) -> Observed {
        let mut observed = Observed {
            forward: true,
            ..Observed::default()
        };

        match frame[0] {
            b'1' => self.retire(&[Expect::Parse], &mut observed),
            b'2' => self.retire(&[Expect::Bind], &mut observed),
            b'3' => self.retire(&[Expect::Close], &mut observed),
            b'n' => self.retire(&[Expect::Describe], &mut observed),
            b'T' => self.retire(&[Expect::Describe], &mut observed),
            b'C' | b'I' | b's' => self.retire(&[Expect::Execute], &mut observed),
            b'E' => self.skip_to_sync_point(&mut observed),
            b'Z' => {
                self.retire(&[Expect::Sync, Expect::Query], &mut observed);
                observed.forward = true;
                observed.ready = frame.get(5).copied().and_then(TransactionStatus::from_byte);
            }
            _ => {}
        }

        observed
    }

    /// Replies that will never come because the server connection is gone.
    /// Returns the number of sync points that were outstanding.
    pub(crate) fn abandon(&mut self) -> usize {
        let syncs = self.sync_points;
        self.entries.clear();
        self.sync_points = 0;
        self.pending_syncs = 0;
        syncs
    }
}

// -----------------------------------------------------------------------------
// ----- ResponsePlan: Private -------------------------------------------------

impl ResponsePlan {
    fn push_server(&mut self, expect: Expect, visible: bool, signature: Option<StatementSignature>) {
        if expect.is_sync_point() {
            self.sync_points += 1;
        }
        if expect == Expect::Sync {
            self.pending_syncs += 1;
        }
        self.entries.push_back(PlanEntry::Server {
            expect,
            visible,
            signature,
        });
    }

    /// Pop the front entry if it is one of `kinds`. A frame that matches
    /// nothing is forwarded untouched.
    fn retire(&mut self, kinds: &[Expect], observed: &mut Observed) {
        let Some(PlanEntry::Server { expect, .. }) = self.entries.front() else {
            return;
        };
        if !kinds.contains(expect) {
            return;
        }

        if let Some(PlanEntry::Server { expect, visible, .. }) = self.entries.pop_front() {
            observed.forward = visible;
            self.note_retired(expect);
        }
    }

    /// The server skips everything up to the next Sync after an error. So do
    /// we, including synthetic replies queued in that range.
    fn skip_to_sync_point(&mut self, observed: &mut Observed) {
        while let Some(entry) = self.entries.front() {
            if let PlanEntry::Server { expect, .. } = entry {
                if expect.is_sync_point() {
                    break;
                }
            }

            match self.entries.pop_front() {
                Some(PlanEntry::Server {
                    expect,
                    signature: Some(signature),
                    ..
                }) => {
                    observed.failed_statements.push(signature);
                    self.note_retired(expect);
                }
                Some(PlanEntry::Server {
                    expect: Expect::Close,
                    visible: false,
                    ..
                }) => observed.cache_desynced = true,
                Some(PlanEntry::Server { expect, .. }) => self.note_retired(expect),
                _ => {}
            }
        }
    }

    fn note_retired(&mut self, expect: Expect) {
        if expect.is_sync_point() {
            self.sync_points -= 1;
        }
        if expect == Expect::Sync {
            self.pending_syncs -= 1;
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> Vec<u8> {
        vec![tag, 0, 0, 0, 4]
    }

    fn ready(status: u8) -> Vec<u8> {
        vec![b'Z', 0, 0, 0, 5, status]
    }

    #[test]
    fn extended_batch_retires_in_order() {
        let mut plan = ResponsePlan::new();
        plan.push_parse(true, None);
        plan.push(Expect::Bind);
        plan.push(Expect::Execute);
        plan.push(Expect::Sync);
        assert!(plan.is_pipelining());

        assert!(plan.observe(&frame(b'1')).forward);
        assert!(plan.observe(&frame(b'2')).forward);
        assert!(plan.observe(&frame(b'D')).forward);
        assert!(plan.observe(&frame(b'C')).forward);

        let observed = plan.observe(&ready(b'I'));
        assert_eq!(observed.ready, Some(TransactionStatus::Idle));
        assert!(plan.is_empty());
        assert!(!plan.is_pipelining());
    }

    #[test]
    fn hidden_entries_are_swallowed() {
        let mut plan = ResponsePlan::new();
        plan.push_hidden(Expect::Close);
        plan.push_parse(false, None);
        plan.push(Expect::Bind);

        assert!(!plan.observe(&frame(b'3')).forward);
        assert!(!plan.observe(&frame(b'1')).forward);
        assert!(plan.observe(&frame(b'2')).forward);
    }

    #[test]
    fn skipped_eviction_close_is_reported() {
        let mut plan = ResponsePlan::new();
        plan.push(Expect::Execute);
        plan.push_hidden(Expect::Close);
        plan.push_parse(true, None);
        plan.push(Expect::Sync);

        let observed = plan.observe(&frame(b'E'));
        assert!(observed.cache_desynced);
        assert_eq!(plan.sync_points(), 1);
    }

    #[test]
    fn synthetic_reply_waits_for_its_turn() {
        let mut plan = ResponsePlan::new();
        plan.push(Expect::Bind);
        plan.push_synthetic(Bytes::from_static(b"1\0\0\0\x04"));
        assert_eq!(plan.pop_synthetic(), None);

        plan.observe(&frame(b'2'));
        assert!(plan.pop_synthetic().is_some());
        assert!(plan.is_empty());
    }

    #[test]
    fn error_skips_to_next_sync() {
        let sig = StatementSignature::new("select * from missing", &[]);
        let mut plan = ResponsePlan::new();
        // first statement
        plan.push(Expect::Bind);
        plan.push(Expect::Execute);
        // second statement fails at Parse
        plan.push_parse(true, Some(sig));
        plan.push(Expect::Bind);
        plan.push(Expect::Execute);
        // third statement, already prepared
        plan.push_synthetic(Bytes::from_static(b"1\0\0\0\x04"));
        plan.push(Expect::Bind);
        plan.push(Expect::Execute);
        plan.push(Expect::Sync);

        plan.observe(&frame(b'2'));
        plan.observe(&frame(b'C'));

        let observed = plan.observe(&frame(b'E'));
        assert!(observed.forward);
        assert_eq!(observed.failed_statements.as_slice(), &[sig]);
        assert_eq!(plan.pop_synthetic(), None);
        assert_eq!(plan.sync_points(), 1);

        let observed = plan.observe(&ready(b'I'));
        assert_eq!(observed.ready, Some(TransactionStatus::Idle));
        assert!(plan.is_empty());
    }

    #[test]
    fn simple_query_error_keeps_the_sync_point() {
        let mut plan = ResponsePlan::new();
        plan.push(Expect::Query);
        assert!(!plan.is_pipelining());

        plan.observe(&frame(b'T'));
        plan.observe(&frame(b'E'));
        assert_eq!(plan.sync_points(), 1);

        let observed = plan.observe(&ready(b'E'));
        assert_eq!(observed.ready, Some(TransactionStatus::Aborted));
        assert!(plan.is_empty());
    }

    #[test]
    fn abandon_counts_outstanding_syncs() {
        let mut plan = ResponsePlan::new();
        plan.push(Expect::Sync);
        plan.push(Expect::Parse);
        plan.push(Expect::Sync);
        assert_eq!(plan.abandon(), 2);
        assert!(plan.is_empty());
        assert!(!plan.is_pipelining());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
