use bytes::{Bytes, BytesMut};
use lru::LruCache;
use std::{fmt, num::NonZeroUsize, time::Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::shared_types::{BackendIdentity, StatementSignature, TransactionStatus};
use crate::wire::observers::query::QueryFrameObserver;
use crate::wire::utils::peek_backend;

use super::{CancelTarget, ServerError, ServerStream, ServerTarget, messages};

// -----------------------------------------------------------------------------
// ----- ServerStatus ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Idle,
    CheckedOut,
    /// Transport failed or the backend misbehaved. Never handed out again.
    Broken,
}

// -----------------------------------------------------------------------------
// ----- ServerConnection ------------------------------------------------------

/// One physical backend connection. Owned by a pool while idle and by
/// exactly one session while checked out.
pub struct ServerConnection {
    stream: Box<dyn ServerStream>,
    buffer: BytesMut,

    status: ServerStatus,
    transaction_status: TransactionStatus,

    host: String,
    port: u16,
    backend_key: Option<BackendIdentity>,
    pub(crate) parameters: Vec<(String, String)>,

    /// Signatures already prepared on this backend under their server names.
    statements: LruCache<StatementSignature, ()>,

    last_used: Instant,
}

// -----------------------------------------------------------------------------
// ----- ServerConnection: Static ----------------------------------------------

impl ServerConnection {
    pub fn new(stream: Box<dyn ServerStream>, target: &ServerTarget) -> Self {
        let capacity = NonZeroUsize::new(target.statement_cache_size).unwrap_or(NonZeroUsize::MIN);

        Self {
            stream,
            buffer: BytesMut::with_capacity(8192),
            status: ServerStatus::Idle,
            transaction_status: TransactionStatus::Idle,
            host: target.host.clone(),
            port: target.port,
            backend_key: None,
            parameters: Vec::new(),
            statements: LruCache::new(capacity),
            last_used: Instant::now(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ServerConnection: Public ----------------------------------------------

impl ServerConnection {
    pub fn status(&self) -> ServerStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ServerStatus) {
        if self.status != ServerStatus::Broken {
            self.status = status;
        }
        self.last_used = Instant::now();
    }

    pub fn mark_broken(&mut self) {
        self.status = ServerStatus::Broken;
    }

    pub fn is_broken(&self) -> bool {
        self.status == ServerStatus::Broken
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    pub(crate) fn set_transaction_status(&mut self, status: TransactionStatus) {
        self.transaction_status = status;
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    pub(crate) fn set_backend_key(&mut self, key: BackendIdentity) {
        self.backend_key = Some(key);
    }

    /// Where a CancelRequest for whatever runs on this connection must go.
    pub fn cancel_target(&self) -> Option<CancelTarget> {
        self.backend_key.map(|key| CancelTarget {
            host: self.host.clone(),
            port: self.port,
            key,
        })
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<(), ServerError> {
        if let Err(e) = self.stream.write_all(data).await {
            self.status = ServerStatus::Broken;
            return Err(e.into());
        }
        Ok(())
    }

    /// Next complete backend frame. Cancel safe: partial reads stay buffered.
    pub async fn read_frame(&mut self) -> Result<Bytes, ServerError> {
        loop {
            if let Some(frame) = peek_backend(&self.buffer) {
                return Ok(self.buffer.split_to(frame.total_len).freeze());
            }

            let n = match self.stream.read_buf(&mut self.buffer).await {
                Ok(n) => n,
                Err(e) => {
                    self.status = ServerStatus::Broken;
                    return Err(e.into());
                }
            };

            if n == 0 {
                self.status = ServerStatus::Broken;
                return Err(ServerError::Closed);
            }
        }
    }

    /// Run a simple query and discard its results, up to ReadyForQuery.
    pub async fn execute_discard(&mut self, sql: &str) -> Result<(), ServerError> {
        self.send(&QueryFrameObserver::build(sql)).await?;

        let mut failed = false;
        loop {
            let frame = self.read_frame().await?;
            match frame[0] {
                b'E' => failed = true,
                b'Z' => {
                    let status = frame
                        .get(5)
                        .copied()
                        .and_then(TransactionStatus::from_byte)
                        .ok_or(ServerError::Protocol("malformed ReadyForQuery"))?;
                    self.transaction_status = status;
                    break;
                }
                _ => {}
            }
        }

        if failed {
            return Err(ServerError::Rejected(format!("{sql} failed")));
        }
        Ok(())
    }

    /// Abort whatever transaction a vanished client left open.
    pub async fn rollback(&mut self) -> Result<(), ServerError> {
        self.execute_discard("ROLLBACK").await?;
        if self.transaction_status != TransactionStatus::Idle {
            self.status = ServerStatus::Broken;
            return Err(ServerError::Protocol("still in a transaction after ROLLBACK"));
        }
        Ok(())
    }

    /// Best effort: tell the backend we are leaving.
    pub async fn terminate(&mut self) {
        let _ = self.stream.write_all(&messages::terminate()).await;
        let _ = self.stream.shutdown().await;
        self.status = ServerStatus::Broken;
    }
}

// -----------------------------------------------------------------------------
// ----- ServerConnection: Prepared Statements ---------------------------------

impl ServerConnection {
    pub fn has_statement(&mut self, signature: &StatementSignature) -> bool {
        self.statements.get(signature).is_some()
    }

    /// Record a statement as prepared. Returns the statement pushed out of
    /// the cache, which the caller must close on the server.
    pub fn remember_statement(
        &mut self,
        signature: StatementSignature,
    ) -> Option<StatementSignature> {
        match self.statements.push(signature, ()) {
            Some((evicted, _)) if evicted != signature => Some(evicted),
            _ => None,
        }
    }

    /// Drop one signature, e.g. after its Parse failed on the server.
    pub fn forget_statement(&mut self, signature: &StatementSignature) {
        self.statements.pop(signature);
    }

    pub fn forget_statements(&mut self) {
        self.statements.clear();
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }
}

impl fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("addr", &format_args!("{}:{}", self.host, self.port))
            .field("status", &self.status)
            .field("transaction_status", &self.transaction_status)
            .field("statements", &self.statements.len())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
