use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{
    select,
    sync::watch,
    time::{Instant, sleep_until},
};
use tracing::{info, warn};

use crate::gateway::PoolRegistry;

use super::SessionRegistry;

// -----------------------------------------------------------------------------
// ----- ShutdownPhase ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    Running,
    /// New regular sessions are refused; existing transactions may finish.
    Draining,
    /// Terminal. Pools are gone and the listener has stopped.
    Terminating,
}

/// Outcome of [`ShutdownCoordinator::request_shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownRequest {
    Started,
    /// Already draining: nothing changes, the deadline stays.
    AlreadyDraining,
    Refused,
}

impl ShutdownRequest {
    pub fn accepted(self) -> bool {
        !matches!(self, ShutdownRequest::Refused)
    }
}

// -----------------------------------------------------------------------------
// ----- ShutdownCoordinator ---------------------------------------------------

/// The only writer of the process shutdown phase. Everyone else reads it
/// through [`ShutdownCoordinator::subscribe`].
#[derive(Debug)]
pub struct ShutdownCoordinator {
    phase: watch::Sender<ShutdownPhase>,
    grace: Duration,
    deadline: Mutex<Option<Instant>>,
    sessions: Arc<SessionRegistry>,
}

// -----------------------------------------------------------------------------
// ----- ShutdownCoordinator: Static -------------------------------------------

impl ShutdownCoordinator {
    pub fn new(grace: Duration, sessions: Arc<SessionRegistry>) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self {
            phase,
            grace,
            deadline: Mutex::new(None),
            sessions,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ShutdownCoordinator: Public -------------------------------------------

impl ShutdownCoordinator {
    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    pub fn is_draining(&self) -> bool {
        self.phase() != ShutdownPhase::Running
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }

    /// Begin draining. Safe to call any number of times from signals and
    /// admin sessions alike.
    pub fn request_shutdown(&self) -> ShutdownRequest {
        let mut outcome = ShutdownRequest::Refused;
        self.phase.send_if_modified(|phase| match *phase {
            ShutdownPhase::Running => {
                *phase = ShutdownPhase::Draining;
                outcome = ShutdownRequest::Started;
                true
            }
            ShutdownPhase::Draining => {
                outcome = ShutdownRequest::AlreadyDraining;
                false
            }
            ShutdownPhase::Terminating => false,
        });

        if outcome == ShutdownRequest::Started {
            *self.deadline.lock() = Some(Instant::now() + self.grace);
            let watched = self.sessions.close_admission();
            info!(watched, grace = ?self.grace, "shutdown requested, draining sessions");
        }

        outcome
    }

    /// Wait for a shutdown request, drain, then terminate and tear down every
    /// pool. Returns once Terminating.
    pub async fn run(&self, pools: &PoolRegistry) {
        let mut phase = self.subscribe();
        if phase
            .wait_for(|phase| *phase != ShutdownPhase::Running)
            .await
            .is_err()
        {
            return;
        }

        let deadline = self
            .deadline()
            .unwrap_or_else(|| Instant::now() + self.grace);

        select! {
            _ = self.sessions.wait_drained() => {
                info!("all sessions drained");
            }
            _ = sleep_until(deadline) => {
                warn!(
                    remaining = self.sessions.watched_count(),
                    "shutdown grace period elapsed, force-closing sessions"
                );
            }
        }

        self.phase.send_replace(ShutdownPhase::Terminating);
        pools.teardown().await;
        info!("terminating");
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
