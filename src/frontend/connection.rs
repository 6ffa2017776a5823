use std::{io, net::SocketAddr, sync::Arc};
use tokio::{net::TcpStream, select, sync::watch};
use tracing::{debug, info};

use crate::ErrorResponse;
use crate::gateway::{Binding, Gateway};
use crate::shared_types::AuthStage;
use crate::shutdown::{SessionId, ShutdownPhase};

use super::{
    buffers::FrontendBuffers,
    context::FrontendContext,
    handlers::{admin::handle_admin, handle_authenticating, handle_startup},
    session::Session,
    transport::FrontendTransport,
};

// -----------------------------------------------------------------------------
// ----- FrontendConnection ----------------------------------------------------

/// One accepted client, from the first startup packet to disconnect.
#[derive(Debug)]
pub struct FrontendConnection {
    gateway: Arc<Gateway>,
    peer: SocketAddr,
    session_id: SessionId,

    transport: FrontendTransport,
    buffers: FrontendBuffers,
    context: FrontendContext,
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Static --------------------------------------------

impl FrontendConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr, gateway: Arc<Gateway>) -> Self {
        let session_id = gateway.next_session_id();
        Self {
            gateway,
            peer,
            session_id,
            transport: FrontendTransport::new(stream),
            buffers: FrontendBuffers::new(),
            context: FrontendContext::new(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Public --------------------------------------------

impl FrontendConnection {
    pub async fn serve(mut self) -> io::Result<()> {
        let result = self.serve_inner().await;

        if self.context.admitted {
            self.gateway.sessions.remove(self.session_id);
        }
        self.transport.shutdown().await;
        debug!(session = self.session_id, peer = %self.peer, "client disconnected");

        result
    }
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Private -------------------------------------------

impl FrontendConnection {
    async fn serve_inner(&mut self) -> io::Result<()> {
        if !self.handshake().await? {
            return Ok(());
        }

        match self.context.binding.take() {
            Some(Binding::Admin) => self.serve_admin().await,
            Some(Binding::Regular { identity, shards }) => {
                let session = Session::new(self.session_id, self.gateway.clone(), identity, shards);
                self.serve_regular(session).await
            }
            None => Ok(()),
        }
    }

    /// Run startup and authentication. False when the connection is done.
    async fn handshake(&mut self) -> io::Result<bool> {
        loop {
            let n = self.buffers.read_from(&mut self.transport).await?;
            if n == 0 {
                return Ok(false);
            }

            self.buffers.track_new_inbox_frames(self.context.stage);

            while let Some(sequence) = self.buffers.pull_next_sequence(self.context.stage) {
                match self.context.stage {
                    AuthStage::Startup => {
                        handle_startup(&mut self.context, &mut self.buffers, sequence, &self.gateway)
                    }
                    AuthStage::Authenticating => handle_authenticating(
                        &mut self.context,
                        &mut self.buffers,
                        sequence,
                        &self.gateway,
                        self.session_id,
                        self.peer,
                    ),
                    AuthStage::Ready => unreachable!("handshake ends at Ready"),
                }

                self.buffers.flush_to(&mut self.transport).await?;

                if self.context.should_close() {
                    return Ok(false);
                }

                if self.context.take_tls_upgrade() {
                    if let Some(acceptor) = self.gateway.tls.clone() {
                        self.transport.upgrade_to_tls(&acceptor).await?;
                    }
                }

                if self.context.stage == AuthStage::Ready {
                    return Ok(true);
                }
            }
        }
    }

    async fn serve_admin(&mut self) -> io::Result<()> {
        loop {
            self.buffers.track_new_inbox_frames(AuthStage::Ready);
            while let Some(sequence) = self.buffers.pull_next_sequence(AuthStage::Ready) {
                handle_admin(&mut self.context, &mut self.buffers, sequence, &self.gateway);
                if self.context.should_close() {
                    break;
                }
            }

            self.buffers.flush_to(&mut self.transport).await?;
            if self.context.should_close() {
                return Ok(());
            }

            let n = self.buffers.read_from(&mut self.transport).await?;
            if n == 0 {
                return Ok(());
            }
        }
    }

    async fn serve_regular(&mut self, mut session: Session) -> io::Result<()> {
        let mut phase = self.gateway.shutdown.subscribe();
        let result = self.drive_session(&mut session, &mut phase).await;
        session.finish().await;
        result
    }

    async fn drive_session(
        &mut self,
        session: &mut Session,
        phase: &mut watch::Receiver<ShutdownPhase>,
    ) -> io::Result<()> {
        // Anything the client sent right behind its password.
        if self.buffers.has_buffered_input() {
            self.process_client_input(session).await;
        }

        loop {
            let current = *phase.borrow_and_update();
            match current {
                ShutdownPhase::Terminating => {
                    session.force_close(&mut self.buffers);
                    self.buffers.flush_to(&mut self.transport).await?;
                    return Ok(());
                }
                ShutdownPhase::Draining if session.is_safe_to_drop() => {
                    info!(session = session.id(), "closing drained session");
                    let err = ErrorResponse::admin_shutdown();
                    self.buffers.queue_response(&err.to_bytes());
                    self.buffers.flush_to(&mut self.transport).await?;
                    return Ok(());
                }
                _ => {}
            }

            if self.buffers.has_pending_output() {
                self.buffers.flush_to(&mut self.transport).await?;
            }
            if session.should_close() {
                return Ok(());
            }

            select! {
                biased;

                // -- Shutdown progress --
                changed = phase.changed() => {
                    if changed.is_err() {
                        session.force_close(&mut self.buffers);
                        self.buffers.flush_to(&mut self.transport).await?;
                        return Ok(());
                    }
                }

                // -- Server responses --
                frame = session.read_server_frame() => {
                    match frame {
                        Ok(frame) => session.handle_server_frame(frame, &mut self.buffers).await,
                        Err(e) => session.handle_server_error(e, &mut self.buffers),
                    }
                }

                // -- Client requests --
                read_res = self.buffers.read_from(&mut self.transport) => {
                    if read_res? == 0 {
                        return Ok(());
                    }
                    self.process_client_input(session).await;
                }
            }
        }
    }

    async fn process_client_input(&mut self, session: &mut Session) {
        self.buffers.track_new_inbox_frames(AuthStage::Ready);
        while let Some(sequence) = self.buffers.pull_next_sequence(AuthStage::Ready) {
            session.handle_client_sequence(sequence, &mut self.buffers).await;
            if session.should_close() {
                break;
            }
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
