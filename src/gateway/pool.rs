use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt,
    ops::{Deref, DerefMut},
    sync::{Arc, OnceLock},
    time::Duration,
};
use thiserror::Error;
use tokio::{sync::oneshot, time::timeout};
use tracing::{debug, error, info, warn};

use crate::backend::{Connector, ServerConnection, ServerError, ServerStatus, ServerTarget};
use crate::shared_types::{PoolIdentity, TransactionStatus};

// -----------------------------------------------------------------------------
// ----- PoolSettings ----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub min_size: usize,
    pub max_size: usize,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Consecutive acquire timeouts after which an alert is logged.
    pub timeout_alert_threshold: u32,
}

// -----------------------------------------------------------------------------
// ----- PoolError -------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no server connection available for {identity} within {waited:?}")]
    Timeout {
        identity: PoolIdentity,
        waited: Duration,
    },

    #[error("pool is closed")]
    Closed,

    #[error("could not open server connection: {0}")]
    Connect(#[from] ServerError),
}

// -----------------------------------------------------------------------------
// ----- PoolStats -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub identity: PoolIdentity,
    pub min_size: usize,
    pub max_size: usize,
    /// Idle, checked out, and connecting.
    pub size: usize,
    pub idle: usize,
    pub checked_out: usize,
    pub waiting: usize,
    pub timeouts: u64,
}

// -----------------------------------------------------------------------------
// ----- ConnHandle ------------------------------------------------------------

/// Arena slot plus generation. A handle outliving its slot (pool torn down,
/// slot reused) is detected instead of touching someone else's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnHandle {
    index: usize,
    generation: u64,
}

// -----------------------------------------------------------------------------
// ----- Pool ------------------------------------------------------------------

/// Server connections for one identity. Idle connections wait in the arena;
/// callers that find none and no spare capacity queue up in strict FIFO
/// order and are handed connections directly on release.
pub struct Pool {
    identity: PoolIdentity,
    target: ServerTarget,
    connector: Arc<dyn Connector>,
    settings: PoolSettings,
    server_parameters: OnceLock<Vec<(String, String)>>,
    inner: Mutex<PoolInner>,
}

#[derive(Default)]
struct PoolInner {
    slots: Vec<Slot>,
    vacant: Vec<usize>,
    idle: VecDeque<usize>,
    waiters: VecDeque<Waiter>,

    size: usize,
    checked_out: usize,
    next_waiter: u64,

    consecutive_timeouts: u32,
    total_timeouts: u64,
    closed: bool,
}

struct Slot {
    generation: u64,
    state: SlotState,
}

enum SlotState {
    Vacant,
    Connecting,
    Idle(ServerConnection),
    CheckedOut,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Grant>,
}

/// Decided under the lock, carried out after it is released.
enum AcquireStep {
    Connect(ConnHandle),
    Wait(u64, oneshot::Receiver<Grant>),
}

/// What a queued caller receives when it reaches the front of the line.
enum Grant {
    Ready(ConnHandle, ServerConnection),
    /// Capacity freed up; the caller opens the connection itself.
    Connect(ConnHandle),
}

// -----------------------------------------------------------------------------
// ----- Pool: Static ----------------------------------------------------------

impl Pool {
    pub fn new(
        identity: PoolIdentity,
        target: ServerTarget,
        connector: Arc<dyn Connector>,
        settings: PoolSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            target,
            connector,
            settings,
            server_parameters: OnceLock::new(),
            inner: Mutex::new(PoolInner::default()),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Pool: Public ----------------------------------------------------------

impl Pool {
    pub fn identity(&self) -> &PoolIdentity {
        &self.identity
    }

    pub fn target(&self) -> &ServerTarget {
        &self.target
    }

    /// ParameterStatus values reported by the first backend this pool
    /// connected to.
    pub fn server_parameters(&self) -> Option<&[(String, String)]> {
        self.server_parameters.get().map(Vec::as_slice)
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            identity: self.identity.clone(),
            min_size: self.settings.min_size,
            max_size: self.settings.max_size,
            size: inner.size,
            idle: inner.idle.len(),
            checked_out: inner.checked_out,
            waiting: inner.waiters.len(),
            timeouts: inner.total_timeouts,
        }
    }

    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, PoolError> {
        let step = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(PoolError::Closed);
            }

            if let Some((handle, conn)) = inner.pop_idle() {
                inner.consecutive_timeouts = 0;
                return Ok(PooledConnection::new(self.clone(), handle, conn));
            }

            if inner.size < self.settings.max_size {
                AcquireStep::Connect(inner.reserve())
            } else {
                let (tx, rx) = oneshot::channel();
                let id = inner.next_waiter;
                inner.next_waiter += 1;
                inner.waiters.push_back(Waiter { id, tx });
                AcquireStep::Wait(id, rx)
            }
        };

        let (waiter_id, mut rx) = match step {
            AcquireStep::Connect(handle) => return self.connect_into(handle).await,
            AcquireStep::Wait(id, rx) => (id, rx),
        };

        match timeout(self.settings.acquire_timeout, &mut rx).await {
            Ok(Ok(grant)) => self.accept_grant(grant).await,
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => {
                self.inner.lock().waiters.retain(|w| w.id != waiter_id);

                // A release may have granted us a connection right at the deadline.
                rx.close();
                if let Ok(grant) = rx.try_recv() {
                    return self.accept_grant(grant).await;
                }

                self.note_timeout();
                Err(PoolError::Timeout {
                    identity: self.identity.clone(),
                    waited: self.settings.acquire_timeout,
                })
            }
        }
    }

    /// Return a connection. One left inside a transaction is rolled back
    /// first; broken ones are destroyed and replaced if the pool is below
    /// its minimum.
    pub async fn release(self: &Arc<Self>, mut pooled: PooledConnection) {
        let handle = pooled.handle;
        let Some(mut conn) = pooled.conn.take() else {
            return;
        };

        if !conn.is_broken() && conn.transaction_status() != TransactionStatus::Idle {
            match timeout(self.target.connect_timeout, conn.rollback()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(pool = %self.identity, "rollback on check-in failed: {e}");
                    conn.mark_broken();
                }
                Err(_) => {
                    warn!(pool = %self.identity, "rollback on check-in timed out");
                    conn.mark_broken();
                }
            }
        }

        self.check_in(handle, conn);
    }

    /// Open connections until the pool holds at least `min_size`.
    pub async fn warm(self: &Arc<Self>) {
        self.replenish().await;
    }

    /// Close idle connections unused for longer than the idle timeout while
    /// the pool is above its minimum.
    pub async fn reap_idle(&self) -> usize {
        let expired = {
            let mut inner = self.inner.lock();
            let mut expired = Vec::new();

            let mut kept = VecDeque::with_capacity(inner.idle.len());
            while let Some(index) = inner.idle.pop_front() {
                let stale = match &inner.slots[index].state {
                    SlotState::Idle(conn) => conn.last_used().elapsed() >= self.settings.idle_timeout,
                    _ => false,
                };

                if stale && inner.size > self.settings.min_size {
                    if let SlotState::Idle(conn) = inner.vacate(index) {
                        expired.push(conn);
                    }
                } else {
                    kept.push_back(index);
                }
            }
            inner.idle = kept;
            expired
        };

        let count = expired.len();
        for mut conn in expired {
            conn.terminate().await;
        }

        if count > 0 {
            debug!(pool = %self.identity, closed = count, "reaped idle server connections");
        }
        count
    }

    /// Close every idle connection, fail every waiter, and refuse further
    /// acquires. Checked-out connections are closed as they come back.
    pub async fn teardown(&self) {
        let idle = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.waiters.clear();

            let indexes: Vec<usize> = inner.idle.drain(..).collect();
            indexes
                .into_iter()
                .filter_map(|index| match inner.vacate(index) {
                    SlotState::Idle(conn) => Some(conn),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };

        for mut conn in idle {
            conn.terminate().await;
        }

        info!(pool = %self.identity, "pool torn down");
    }
}

// -----------------------------------------------------------------------------
// ----- Pool: Private ---------------------------------------------------------

impl Pool {
    async fn accept_grant(self: &Arc<Self>, grant: Grant) -> Result<PooledConnection, PoolError> {
        self.inner.lock().consecutive_timeouts = 0;
        match grant {
            Grant::Ready(handle, conn) => Ok(PooledConnection::new(self.clone(), handle, conn)),
            Grant::Connect(handle) => self.connect_into(handle).await,
        }
    }

    /// Open a server connection for a slot already reserved as Connecting.
    async fn connect_into(self: &Arc<Self>, handle: ConnHandle) -> Result<PooledConnection, PoolError> {
        let guard = ConnectGuard {
            pool: self,
            handle: Some(handle),
        };

        let mut conn = self.connector.connect(&self.target).await?;
        let _ = self.server_parameters.set(conn.parameters().to_vec());

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PoolError::Closed);
        }

        guard.disarm();
        inner.slots[handle.index].state = SlotState::CheckedOut;
        inner.checked_out += 1;
        inner.consecutive_timeouts = 0;
        drop(inner);

        conn.set_status(ServerStatus::CheckedOut);
        Ok(PooledConnection::new(self.clone(), handle, conn))
    }

    fn check_in(self: &Arc<Self>, handle: ConnHandle, mut conn: ServerConnection) {
        let mut inner = self.inner.lock();

        let owned = inner
            .slots
            .get(handle.index)
            .is_some_and(|slot| {
                slot.generation == handle.generation && matches!(slot.state, SlotState::CheckedOut)
            });
        if !owned {
            return;
        }
        inner.checked_out -= 1;

        if conn.is_broken() || inner.closed {
            inner.vacate(handle.index);
            self.fill_capacity(&mut inner);
            return;
        }

        conn.set_status(ServerStatus::Idle);

        while let Some(waiter) = inner.waiters.pop_front() {
            conn.set_status(ServerStatus::CheckedOut);
            match waiter.tx.send(Grant::Ready(handle, conn)) {
                Ok(()) => {
                    inner.checked_out += 1;
                    return;
                }
                Err(Grant::Ready(_, returned)) => {
                    conn = returned;
                    conn.set_status(ServerStatus::Idle);
                }
                Err(Grant::Connect(_)) => unreachable!("sent a ready grant"),
            }
        }

        inner.slots[handle.index].state = SlotState::Idle(conn);
        inner.idle.push_back(handle.index);
    }

    /// After capacity was freed: let the longest waiter open a connection,
    /// or top the pool back up to its minimum in the background.
    fn fill_capacity(self: &Arc<Self>, inner: &mut PoolInner) {
        while !inner.closed && inner.size < self.settings.max_size {
            let Some(waiter) = inner.waiters.pop_front() else {
                break;
            };

            let handle = inner.reserve();
            if waiter.tx.send(Grant::Connect(handle)).is_err() {
                inner.vacate(handle.index);
            }
        }

        if !inner.closed && inner.size < self.settings.min_size {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let pool = self.clone();
                runtime.spawn(async move { pool.replenish().await });
            }
        }
    }

    async fn replenish(self: &Arc<Self>) {
        loop {
            let handle = {
                let mut inner = self.inner.lock();
                if inner.closed || inner.size >= self.settings.min_size {
                    return;
                }
                inner.reserve()
            };

            match self.connect_into(handle).await {
                Ok(mut pooled) => {
                    if let Some(conn) = pooled.conn.take() {
                        self.check_in(pooled.handle, conn);
                    }
                }
                Err(PoolError::Closed) => return,
                Err(e) => {
                    error!(pool = %self.identity, "cannot keep pool at its minimum size: {e}");
                    return;
                }
            }
        }
    }

    fn note_timeout(&self) {
        let mut inner = self.inner.lock();
        inner.total_timeouts += 1;
        inner.consecutive_timeouts += 1;

        let threshold = self.settings.timeout_alert_threshold;
        if threshold > 0 && inner.consecutive_timeouts % threshold == 0 {
            error!(
                pool = %self.identity,
                consecutive = inner.consecutive_timeouts,
                "server connections repeatedly unavailable"
            );
        } else {
            warn!(pool = %self.identity, "timed out waiting for a server connection");
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("identity", &self.identity)
            .field("target", &self.target)
            .field("settings", &self.settings)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- PoolInner -------------------------------------------------------------

impl PoolInner {
    fn pop_idle(&mut self) -> Option<(ConnHandle, ServerConnection)> {
        while let Some(index) = self.idle.pop_back() {
            let slot = &mut self.slots[index];
            let SlotState::Idle(_) = slot.state else {
                continue;
            };

            let SlotState::Idle(mut conn) = std::mem::replace(&mut slot.state, SlotState::CheckedOut)
            else {
                continue;
            };
            let handle = ConnHandle {
                index,
                generation: slot.generation,
            };

            conn.set_status(ServerStatus::CheckedOut);
            self.checked_out += 1;
            return Some((handle, conn));
        }
        None
    }

    /// Claim capacity for a connection about to be opened.
    fn reserve(&mut self) -> ConnHandle {
        self.size += 1;

        let index = match self.vacant.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    state: SlotState::Vacant,
                });
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        slot.state = SlotState::Connecting;
        ConnHandle {
            index,
            generation: slot.generation,
        }
    }

    /// Free a slot, returning what it held.
    fn vacate(&mut self, index: usize) -> SlotState {
        let slot = &mut self.slots[index];
        let previous = std::mem::replace(&mut slot.state, SlotState::Vacant);
        if matches!(previous, SlotState::Vacant) {
            return previous;
        }

        slot.generation += 1;
        self.size -= 1;
        self.vacant.push(index);
        previous
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectGuard ----------------------------------------------------------

/// Gives a Connecting slot back if the connect attempt fails or the task
/// is cancelled mid-handshake.
struct ConnectGuard<'a> {
    pool: &'a Arc<Pool>,
    handle: Option<ConnHandle>,
}

impl ConnectGuard<'_> {
    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        let mut inner = self.pool.inner.lock();
        let current = inner.slots[handle.index].generation == handle.generation;
        if current {
            inner.vacate(handle.index);
            self.pool.fill_capacity(&mut inner);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PooledConnection ------------------------------------------------------

/// A checked-out server connection. Hand it back with [`Pool::release`];
/// dropping it instead discards the connection as broken.
pub struct PooledConnection {
    pool: Arc<Pool>,
    handle: ConnHandle,
    conn: Option<ServerConnection>,
}

impl PooledConnection {
    fn new(pool: Arc<Pool>, handle: ConnHandle, conn: ServerConnection) -> Self {
        Self {
            pool,
            handle,
            conn: Some(conn),
        }
    }

    pub async fn release(self) {
        let pool = self.pool.clone();
        pool.release(self).await;
    }
}

impl Deref for PooledConnection {
    type Target = ServerConnection;

    fn deref(&self) -> &ServerConnection {
        self.conn.as_ref().expect("pooled connection present until released")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut ServerConnection {
        self.conn.as_mut().expect("pooled connection present until released")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        conn.mark_broken();
        self.pool.check_in(self.handle, conn);
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.identity)
            .field("handle", &self.handle)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
