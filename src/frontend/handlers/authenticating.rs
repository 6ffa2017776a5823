use bytes::BytesMut;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::ErrorResponse;
use crate::frontend::buffers::FrontendBuffers;
use crate::frontend::context::FrontendContext;
use crate::frontend::proxy_responses as responses;
use crate::gateway::{Binding, Gateway, ResolveError};
use crate::shared_types::{AuthStage, TransactionStatus};
use crate::shutdown::{SessionEntry, SessionId, SessionState};
use crate::wire::observers::password_message::PasswordMessageFrameObserver;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Reported until a pool has talked to a real server.
const DEFAULT_PARAMETERS: &[(&str, &str)] = &[
    ("server_version", "16.0"),
    ("server_encoding", "UTF8"),
    ("client_encoding", "UTF8"),
    ("DateStyle", "ISO, MDY"),
    ("integer_datetimes", "on"),
    ("standard_conforming_strings", "on"),
    ("IntervalStyle", "postgres"),
];

// -----------------------------------------------------------------------------
// ----- Authenticating Handler ------------------------------------------------

pub(crate) fn handle_authenticating(
    context: &mut FrontendContext,
    buffers: &mut FrontendBuffers,
    message: BytesMut,
    gateway: &Gateway,
    session_id: SessionId,
    peer: SocketAddr,
) {
    let Ok(frame) = PasswordMessageFrameObserver::new(&message) else {
        reject(context, buffers, ErrorResponse::protocol_violation("cannot parse password"));
        return;
    };

    let username = context.username.clone().unwrap_or_default();
    let database = context.database.clone().unwrap_or_default();

    let binding = match gateway.pools.resolve(&username, frame.password(), &database) {
        Ok(binding) => binding,
        Err(ResolveError::Unauthorized) => {
            warn!(%peer, user = %username, "password authentication failed");
            let err = ErrorResponse::invalid_password(format!(
                "password authentication failed for user \"{username}\""
            ));
            reject(context, buffers, err);
            return;
        }
        Err(ResolveError::UnknownDatabase { database }) => {
            reject(context, buffers, ErrorResponse::unknown_database(&database));
            return;
        }
    };

    let parameters = match &binding {
        Binding::Admin => None,
        Binding::Regular { identity, .. } => {
            let entry = SessionEntry {
                identity: identity.clone(),
                peer,
                client_key: context.client_key,
                state: SessionState::Idle,
                cancel_target: None,
            };
            if !gateway.sessions.admit(session_id, entry) {
                reject(context, buffers, ErrorResponse::cannot_connect_now());
                return;
            }
            context.admitted = true;

            gateway
                .pools
                .get(identity)
                .and_then(|pool| pool.server_parameters().map(<[_]>::to_vec))
        }
    };

    info!(session = session_id, %peer, user = %username, %database, "client authenticated");

    context.stage = AuthStage::Ready;
    context.binding = Some(binding);

    buffers.queue_response(&responses::auth_ok());
    match parameters {
        Some(parameters) => {
            for (name, value) in &parameters {
                buffers.queue_response(&responses::param_status(name, value));
            }
        }
        None => {
            for (name, value) in DEFAULT_PARAMETERS {
                buffers.queue_response(&responses::param_status(name, value));
            }
        }
    }
    buffers.queue_response(&responses::backend_key_data(context.client_key));
    buffers.queue_response(&responses::ready_with_status(TransactionStatus::Idle));
}

fn reject(context: &mut FrontendContext, buffers: &mut FrontendBuffers, error: ErrorResponse) {
    buffers.queue_response(&error.to_bytes());
    context.request_close();
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
