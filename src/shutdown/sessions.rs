use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    net::SocketAddr,
};
use tokio::sync::Notify;

use crate::backend::CancelTarget;
use crate::shared_types::{BackendIdentity, PoolIdentity};

// -----------------------------------------------------------------------------
// ----- Types -----------------------------------------------------------------

pub type SessionId = u64;

/// What SHOW CLIENTS reports for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    InTransaction,
    Aborted,
    Pipelining,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::InTransaction => "in transaction",
            SessionState::Aborted => "aborted",
            SessionState::Pipelining => "pipelining",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub identity: PoolIdentity,
    pub peer: SocketAddr,
    pub client_key: BackendIdentity,
    pub state: SessionState,
    /// Backend running this session's queries, while it holds one.
    pub cancel_target: Option<CancelTarget>,
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry -------------------------------------------------------

/// Live regular sessions. Once admission closes, the sessions present at
/// that moment become the watched set that draining waits on.
#[derive(Debug)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    drained: Notify,
}

#[derive(Debug)]
struct RegistryInner {
    accepting: bool,
    sessions: BTreeMap<SessionId, SessionEntry>,
    watched: BTreeSet<SessionId>,
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry: Static -----------------------------------------------

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                accepting: true,
                sessions: BTreeMap::new(),
                watched: BTreeSet::new(),
            }),
            drained: Notify::new(),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// ----- SessionRegistry: Public -----------------------------------------------

impl SessionRegistry {
    /// Register a regular session. Refused once draining has begun.
    pub fn admit(&self, id: SessionId, entry: SessionEntry) -> bool {
        let mut inner = self.inner.lock();
        if !inner.accepting {
            return false;
        }
        inner.sessions.insert(id, entry);
        true
    }

    pub fn remove(&self, id: SessionId) {
        let mut inner = self.inner.lock();
        inner.sessions.remove(&id);
        if inner.watched.remove(&id) && inner.watched.is_empty() {
            self.drained.notify_waiters();
        }
    }

    /// Stop admitting sessions and snapshot the ones to wait for. Returns
    /// how many are watched. Later calls change nothing.
    pub fn close_admission(&self) -> usize {
        let mut inner = self.inner.lock();
        if inner.accepting {
            inner.accepting = false;
            inner.watched = inner.sessions.keys().copied().collect();
        }
        if inner.watched.is_empty() {
            self.drained.notify_waiters();
        }
        inner.watched.len()
    }

    pub fn watched_count(&self) -> usize {
        self.inner.lock().watched.len()
    }

    /// Resolves once admission is closed and every watched session is gone.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            {
                let inner = self.inner.lock();
                if !inner.accepting && inner.watched.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    pub fn set_state(&self, id: SessionId, state: SessionState) {
        if let Some(entry) = self.inner.lock().sessions.get_mut(&id) {
            entry.state = state;
        }
    }

    pub fn set_identity(&self, id: SessionId, identity: PoolIdentity) {
        if let Some(entry) = self.inner.lock().sessions.get_mut(&id) {
            entry.identity = identity;
        }
    }

    pub fn set_cancel_target(&self, id: SessionId, target: Option<CancelTarget>) {
        if let Some(entry) = self.inner.lock().sessions.get_mut(&id) {
            entry.cancel_target = target;
        }
    }

    /// Backend to forward a client's CancelRequest to, if the key matches a
    /// session that is currently running something.
    pub fn cancel_target_for(&self, key: BackendIdentity) -> Option<CancelTarget> {
        self.inner
            .lock()
            .sessions
            .values()
            .find(|entry| entry.client_key == key)
            .and_then(|entry| entry.cancel_target.clone())
    }

    pub fn snapshot(&self) -> Vec<(SessionId, SessionEntry)> {
        self.inner
            .lock()
            .sessions
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
