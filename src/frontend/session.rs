use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ErrorResponse;
use crate::backend::ServerError;
use crate::frontend::buffers::FrontendBuffers;
use crate::frontend::proxy_responses as responses;
use crate::frontend::response_plan::{Expect, ResponsePlan};
use crate::frontend::statements::{self, StatementMap};
use crate::gateway::{Gateway, PoolError, PooledConnection};
use crate::parser::{self, Directive};
use crate::shared_types::{AuthStage, PoolIdentity, TransactionStatus};
use crate::shutdown::{SessionId, SessionState};
use crate::wire::MessageType;
use crate::wire::observers::{
    bind::BindFrameObserver,
    parse::ParseFrameObserver,
    query::QueryFrameObserver,
    target::{Target, TargetFrameObserver},
};
use crate::wire::utils::peek_frontend;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const SERVER_BUFFER_HINT: usize = 1024;

// -----------------------------------------------------------------------------
// ----- Session ---------------------------------------------------------------

/// State machine of one regular client connection. Holds a server
/// connection from the first statement of a transaction (or pipeline) until
/// the server reports Idle with nothing left in flight.
pub(crate) struct Session {
    id: SessionId,
    gateway: Arc<Gateway>,

    identity: PoolIdentity,
    shards: usize,

    server: Option<PooledConnection>,
    plan: ResponsePlan,
    to_server: BytesMut,

    statements: StatementMap,
    rewrite_statements: bool,

    status: TransactionStatus,
    published: SessionState,

    /// The client has sent extended-protocol messages not yet closed by a
    /// Sync.
    in_extended_batch: bool,
    /// A local error ended the current extended-protocol batch; skip input
    /// until the client's Sync, as the server would.
    discard_until_sync: bool,
    /// A DISCARD ALL / DEALLOCATE ALL is in flight.
    forget_in_flight: bool,
    close: bool,
}

// -----------------------------------------------------------------------------
// ----- Session: Static -------------------------------------------------------

impl Session {
    pub(crate) fn new(
        id: SessionId,
        gateway: Arc<Gateway>,
        identity: PoolIdentity,
        shards: usize,
    ) -> Self {
        let rewrite_statements = gateway.config.general.prepared_statements;
        Self {
            id,
            gateway,
            identity,
            shards,
            server: None,
            plan: ResponsePlan::new(),
            to_server: BytesMut::with_capacity(SERVER_BUFFER_HINT),
            statements: StatementMap::new(),
            rewrite_statements,
            status: TransactionStatus::Idle,
            published: SessionState::Idle,
            in_extended_batch: false,
            discard_until_sync: false,
            forget_in_flight: false,
            close: false,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Public -------------------------------------------------------

impl Session {
    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn state(&self) -> SessionState {
        if self.plan.is_pipelining() {
            return SessionState::Pipelining;
        }
        match self.status {
            TransactionStatus::Idle if self.server.is_some() => SessionState::Active,
            TransactionStatus::Idle => SessionState::Idle,
            TransactionStatus::InTransaction => SessionState::InTransaction,
            TransactionStatus::Aborted => SessionState::Aborted,
        }
    }

    /// Nothing would be lost by closing the client now.
    pub(crate) fn is_safe_to_drop(&self) -> bool {
        self.status == TransactionStatus::Idle && self.server.is_none()
    }

    pub(crate) fn should_close(&self) -> bool {
        self.close
    }

    /// Handle one batch of client frames, forwarding what the server must see.
    pub(crate) async fn handle_client_sequence(
        &mut self,
        sequence: BytesMut,
        buffers: &mut FrontendBuffers,
    ) {
        let sequence = sequence.freeze();
        let mut offset = 0;

        while offset < sequence.len() && !self.close {
            let Some(found) = peek_frontend(AuthStage::Ready, &sequence[offset..]) else {
                break;
            };
            let frame = sequence.slice(offset..offset + found.len);
            offset += found.len;

            self.handle_frame(found.message_type, frame, buffers).await;
        }

        self.flush_to_server(buffers).await;
        self.emit_due_replies(buffers);
        self.publish_state();
    }

    /// Next frame from the held server connection. Pends forever while none
    /// is held, so it can sit in a `select!` unconditionally.
    pub(crate) async fn read_server_frame(&mut self) -> Result<Bytes, ServerError> {
        match self.server.as_mut() {
            Some(server) => server.read_frame().await,
            None => std::future::pending().await,
        }
    }

    pub(crate) async fn handle_server_frame(&mut self, frame: Bytes, buffers: &mut FrontendBuffers) {
        let observed = self.plan.observe(&frame);

        if let Some(server) = self.server.as_mut() {
            for signature in &observed.failed_statements {
                server.forget_statement(signature);
            }
            if observed.cache_desynced {
                debug!(session = self.id, "statement cache out of sync, retiring connection");
                server.mark_broken();
            }
            if frame[0] == b'E' && self.forget_in_flight {
                server.mark_broken();
            }
        }

        if observed.forward {
            buffers.queue_response(&frame);
        }
        self.emit_due_replies(buffers);

        if let Some(status) = observed.ready {
            self.status = status;
            self.forget_in_flight = false;
            if let Some(server) = self.server.as_mut() {
                server.set_transaction_status(status);
            }

            if self.plan.is_empty() && status == TransactionStatus::Idle {
                self.release_server().await;
            }
        }

        self.publish_state();
    }

    /// The server connection failed underneath the session. The client gets
    /// an error plus whatever ReadyForQuery it is still owed; the session
    /// itself survives.
    pub(crate) fn handle_server_error(&mut self, error: ServerError, buffers: &mut FrontendBuffers) {
        warn!(session = self.id, pool = %self.identity, "server connection lost: {error}");

        // Dropping marks it broken; the pool replaces it if needed.
        self.server = None;
        self.gateway.sessions.set_cancel_target(self.id, None);

        let owed = self.plan.abandon();
        self.status = TransactionStatus::Idle;
        self.forget_in_flight = false;

        let error = ErrorResponse::backend_broken("server connection lost")
            .with_detail(error.to_string());
        buffers.queue_response(&error.to_bytes());
        for _ in 0..owed {
            buffers.queue_response(&responses::ready_with_status(TransactionStatus::Idle));
        }
        // A simple query sent next must still be answered.
        if self.in_extended_batch {
            self.discard_until_sync = true;
        }

        self.publish_state();
    }

    /// Terminating: drop the server connection without waiting for anything.
    pub(crate) fn force_close(&mut self, buffers: &mut FrontendBuffers) {
        if let Some(mut server) = self.server.take() {
            info!(
                session = self.id,
                status = self.status.as_str(),
                "force-closing session holding a server connection"
            );
            server.mark_broken();
        }
        self.plan.abandon();
        buffers.queue_response(&ErrorResponse::admin_shutdown().to_bytes());
        self.close = true;
    }

    /// Client went away. A connection with replies still in flight cannot be
    /// reused; one merely inside a transaction is rolled back by the pool.
    pub(crate) async fn finish(mut self) {
        let Some(server) = self.server.take() else {
            return;
        };

        if self.plan.is_empty() {
            server.release().await;
        } else {
            drop(server);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Client Frames ------------------------------------------------

impl Session {
    async fn handle_frame(
        &mut self,
        message_type: MessageType,
        frame: Bytes,
        buffers: &mut FrontendBuffers,
    ) {
        match message_type {
            MessageType::Parse
            | MessageType::Bind
            | MessageType::Describe
            | MessageType::Execute
            | MessageType::Close => self.in_extended_batch = true,
            MessageType::Sync => self.in_extended_batch = false,
            _ => {}
        }

        if self.discard_until_sync {
            match message_type {
                MessageType::Sync => {
                    self.discard_until_sync = false;
                    self.reply_local(responses::ready_with_status(self.status), buffers);
                }
                MessageType::Terminate => self.close = true,
                _ => {}
            }
            return;
        }

        match message_type {
            MessageType::Query => self.on_query(frame, buffers).await,
            MessageType::FunctionCall => self.forward(frame, Expect::Query, true, buffers).await,
            MessageType::Parse => self.on_parse(frame, buffers).await,
            MessageType::Bind => self.on_bind(frame, buffers).await,
            MessageType::Describe => self.on_describe(frame, buffers).await,
            MessageType::Close => self.on_close(frame, buffers).await,
            MessageType::Execute => self.forward(frame, Expect::Execute, false, buffers).await,
            MessageType::Sync => self.forward(frame, Expect::Sync, true, buffers).await,

            MessageType::Flush | MessageType::CopyData | MessageType::CopyDone | MessageType::CopyFail => {
                if self.server.is_some() {
                    self.to_server.extend_from_slice(&frame);
                }
            }

            MessageType::Terminate => self.close = true,

            other => {
                let error = ErrorResponse::protocol_violation(format!(
                    "unexpected frontend message {other:?}"
                ));
                buffers.queue_response(&error.to_bytes());
                self.close = true;
            }
        }
    }

    async fn forward(
        &mut self,
        frame: Bytes,
        expect: Expect,
        sync_point: bool,
        buffers: &mut FrontendBuffers,
    ) {
        if !self.ensure_server(sync_point, buffers).await {
            return;
        }
        self.to_server.extend_from_slice(&frame);
        self.plan.push(expect);
    }

    async fn on_query(&mut self, frame: Bytes, buffers: &mut FrontendBuffers) {
        let Ok(query) = QueryFrameObserver::new(&frame) else {
            self.reject_malformed("Query", buffers);
            return;
        };

        let mut forget_all = false;
        match parser::directive(query.query()) {
            Ok(Directive::SetShard(value)) => {
                self.set_shard(&value, buffers);
                return;
            }
            Ok(Directive::ForgetStatement(name))
                if self.rewrite_statements && self.statements.remove(&name) =>
            {
                self.reply_local(responses::command_complete("DEALLOCATE"), buffers);
                self.reply_local(responses::ready_with_status(self.status), buffers);
                return;
            }
            Ok(Directive::ForgetAllStatements) => {
                self.statements.clear();
                forget_all = true;
            }
            Ok(_) => {}
            Err(e) => debug!(session = self.id, "query left to the server: {e}"),
        }

        if !self.ensure_server(true, buffers).await {
            return;
        }
        if forget_all {
            if let Some(server) = self.server.as_mut() {
                server.forget_statements();
            }
            self.forget_in_flight = true;
        }

        self.to_server.extend_from_slice(&frame);
        self.plan.push(Expect::Query);
    }

    async fn on_parse(&mut self, frame: Bytes, buffers: &mut FrontendBuffers) {
        let Ok(parse) = ParseFrameObserver::new(&frame) else {
            self.reject_malformed("Parse", buffers);
            return;
        };

        if !self.rewrite_statements || parse.statement().is_empty() {
            self.forward(frame, Expect::Parse, false, buffers).await;
            return;
        }

        let statement = self.statements.register(&parse);
        if !self.ensure_server(false, buffers).await {
            return;
        }
        if let Some(server) = self.server.as_mut() {
            statements::prepare(server, &mut self.plan, &mut self.to_server, &statement);
        }
    }

    async fn on_bind(&mut self, frame: Bytes, buffers: &mut FrontendBuffers) {
        let Ok(bind) = BindFrameObserver::new(&frame) else {
            self.reject_malformed("Bind", buffers);
            return;
        };

        let statement = match bind.statement() {
            "" => None,
            name if self.rewrite_statements => self.statements.get(name).cloned(),
            _ => None,
        };

        if !self.ensure_server(false, buffers).await {
            return;
        }
        let Some(server) = self.server.as_mut() else {
            return;
        };

        match statement {
            Some(statement) => {
                let name = statements::ensure_prepared(server, &mut self.plan, &mut self.to_server, &statement);
                self.to_server.extend_from_slice(&bind.renamed(&name));
            }
            None => self.to_server.extend_from_slice(&frame),
        }
        self.plan.push(Expect::Bind);
    }

    async fn on_describe(&mut self, frame: Bytes, buffers: &mut FrontendBuffers) {
        let Ok(describe) = TargetFrameObserver::new(&frame, b'D') else {
            self.reject_malformed("Describe", buffers);
            return;
        };

        let statement = match (describe.target(), describe.name()) {
            (Target::Statement, name) if !name.is_empty() && self.rewrite_statements => {
                self.statements.get(name).cloned()
            }
            _ => None,
        };

        if !self.ensure_server(false, buffers).await {
            return;
        }
        let Some(server) = self.server.as_mut() else {
            return;
        };

        match statement {
            Some(statement) => {
                let name = statements::ensure_prepared(server, &mut self.plan, &mut self.to_server, &statement);
                self.to_server.extend_from_slice(&describe.renamed(&name));
            }
            None => self.to_server.extend_from_slice(&frame),
        }
        self.plan.push(Expect::Describe);
    }

    async fn on_close(&mut self, frame: Bytes, buffers: &mut FrontendBuffers) {
        let Ok(close) = TargetFrameObserver::new(&frame, b'C') else {
            self.reject_malformed("Close", buffers);
            return;
        };

        // Server-side statements are shared; only the client's name goes away.
        if self.rewrite_statements && close.target() == Target::Statement && !close.name().is_empty() {
            self.statements.remove(close.name());
            self.reply_local(responses::close_complete(), buffers);
            return;
        }

        self.forward(frame, Expect::Close, false, buffers).await;
    }

    fn set_shard(&mut self, value: &str, buffers: &mut FrontendBuffers) {
        let reply = if self.server.is_some() || self.status != TransactionStatus::Idle {
            Err(ErrorResponse::active_transaction(
                "SET SHARD is only allowed outside a transaction",
            ))
        } else {
            match value.trim().parse::<usize>() {
                Ok(shard) if shard < self.shards => {
                    self.identity = self.identity.with_shard(shard);
                    self.gateway.sessions.set_identity(self.id, self.identity.clone());
                    debug!(session = self.id, pool = %self.identity, "switched shard");
                    Ok(())
                }
                _ => Err(ErrorResponse::invalid_parameter(format!(
                    "invalid shard \"{value}\""
                ))
                .with_hint(format!("shards are numbered 0 to {}", self.shards.saturating_sub(1)))),
            }
        };

        match reply {
            Ok(()) => self.reply_local(responses::command_complete("SET"), buffers),
            Err(error) => self.reply_local(error.to_bytes(), buffers),
        }
        self.reply_local(responses::ready_with_status(self.status), buffers);
    }

    fn reject_malformed(&mut self, what: &str, buffers: &mut FrontendBuffers) {
        let error = ErrorResponse::protocol_violation(format!("malformed {what} message"));
        buffers.queue_response(&error.to_bytes());
        self.close = true;
    }
}

// -----------------------------------------------------------------------------
// ----- Session: Private ------------------------------------------------------

impl Session {
    /// Check out a server connection if the session does not hold one.
    /// `sync_point` tells whether the failing frame owes a ReadyForQuery.
    async fn ensure_server(&mut self, sync_point: bool, buffers: &mut FrontendBuffers) -> bool {
        if self.server.is_some() {
            return true;
        }

        let Some(pool) = self.gateway.pools.get(&self.identity).cloned() else {
            let error = ErrorResponse::internal_error(format!("no pool for {}", self.identity));
            self.fail_local(error, sync_point, buffers);
            return false;
        };

        match pool.acquire().await {
            Ok(server) => {
                self.gateway
                    .sessions
                    .set_cancel_target(self.id, server.cancel_target());
                self.server = Some(server);
                true
            }
            Err(PoolError::Closed) => {
                buffers.queue_response(&ErrorResponse::admin_shutdown().to_bytes());
                self.close = true;
                false
            }
            Err(e @ PoolError::Timeout { .. }) => {
                self.fail_local(ErrorResponse::pool_timeout(e.to_string()), sync_point, buffers);
                false
            }
            Err(e @ PoolError::Connect(_)) => {
                warn!(session = self.id, pool = %self.identity, "{e}");
                self.fail_local(ErrorResponse::backend_broken(e.to_string()), sync_point, buffers);
                false
            }
        }
    }

    fn fail_local(&mut self, error: ErrorResponse, sync_point: bool, buffers: &mut FrontendBuffers) {
        self.reply_local(error.to_bytes(), buffers);
        if sync_point {
            self.reply_local(responses::ready_with_status(self.status), buffers);
        } else {
            self.discard_until_sync = true;
        }
    }

    /// Emit a pooler-made reply after everything the server still owes.
    fn reply_local(&mut self, reply: Bytes, buffers: &mut FrontendBuffers) {
        if self.plan.is_empty() {
            buffers.queue_response(&reply);
        } else {
            self.plan.push_synthetic(reply);
        }
    }

    fn emit_due_replies(&mut self, buffers: &mut FrontendBuffers) {
        while let Some(reply) = self.plan.pop_synthetic() {
            buffers.queue_response(&reply);
        }
    }

    async fn flush_to_server(&mut self, buffers: &mut FrontendBuffers) {
        if self.to_server.is_empty() {
            return;
        }
        let data = self.to_server.split();

        let Some(server) = self.server.as_mut() else {
            return;
        };
        if let Err(e) = server.send(&data).await {
            self.handle_server_error(e, buffers);
        }
    }

    async fn release_server(&mut self) {
        let Some(server) = self.server.take() else {
            return;
        };
        self.gateway.sessions.set_cancel_target(self.id, None);
        server.release().await;
    }

    fn publish_state(&mut self) {
        let state = self.state();
        if state != self.published {
            self.published = state;
            self.gateway.sessions.set_state(self.id, state);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
