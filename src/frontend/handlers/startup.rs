use bytes::BytesMut;
use tracing::debug;

use crate::ErrorResponse;
use crate::backend::send_cancel;
use crate::frontend::buffers::FrontendBuffers;
use crate::frontend::context::FrontendContext;
use crate::frontend::proxy_responses as responses;
use crate::gateway::{Classification, Gateway};
use crate::shared_types::{AuthStage, BackendIdentity};
use crate::wire::MessageType;
use crate::wire::observers::ObserveError;
use crate::wire::observers::cancel_request::CancelRequestFrameObserver;
use crate::wire::observers::startup::StartupFrameObserver;
use crate::wire::utils::peek_frontend;

// -----------------------------------------------------------------------------
// ----- Startup Handler -------------------------------------------------------

pub(crate) fn handle_startup(
    context: &mut FrontendContext,
    buffers: &mut FrontendBuffers,
    message: BytesMut,
    gateway: &Gateway,
) {
    let Some(found) = peek_frontend(AuthStage::Startup, &message[..]) else {
        reject(context, buffers, ErrorResponse::protocol_violation("bad startup message"));
        return;
    };

    match found.message_type {
        MessageType::SSLRequest => {
            if gateway.tls.is_some() {
                buffers.queue_response(&responses::ssl_yes());
                context.request_tls_upgrade();
            } else {
                buffers.queue_response(&responses::ssl_no());
            }
        }

        MessageType::GSSENCRequest => {
            // Client will send a real Startup next.
            buffers.queue_response(&responses::gssenc_no());
        }

        MessageType::CancelRequest => {
            if let Ok(frame) = CancelRequestFrameObserver::new(&message) {
                forward_cancel(gateway, frame.identity());
            }
            // No reply; the client hangs up.
            context.request_close();
        }

        MessageType::Startup => {
            let startup_frame = match StartupFrameObserver::new(&message) {
                Ok(frame) => frame,
                Err(ObserveError::UnexpectedVersion(version)) => {
                    let err = ErrorResponse::protocol_violation("unsupported startup protocol version")
                        .with_detail(format!("version: {version}"));
                    reject(context, buffers, err);
                    return;
                }
                Err(_) => {
                    reject(context, buffers, ErrorResponse::protocol_violation("bad startup message"));
                    return;
                }
            };

            let Some(username) = startup_frame.param("user").filter(|v| !v.is_empty()) else {
                reject(context, buffers, ErrorResponse::protocol_violation("startup missing user"));
                return;
            };

            let database = startup_frame
                .param("database")
                .filter(|v| !v.is_empty())
                .unwrap_or(username);

            // Regular clients are turned away before authentication while
            // draining; the admin channel never is.
            if gateway.pools.classify(database) == Classification::Regular
                && gateway.shutdown.is_draining()
            {
                reject(context, buffers, ErrorResponse::cannot_connect_now());
                return;
            }

            context.username = Some(username.to_string());
            context.database = Some(database.to_string());
            context.stage = AuthStage::Authenticating;

            buffers.queue_response(&responses::auth_cleartext());
        }

        _ => {
            reject(context, buffers, ErrorResponse::protocol_violation("unexpected message in startup"));
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn reject(context: &mut FrontendContext, buffers: &mut FrontendBuffers, error: ErrorResponse) {
    buffers.queue_response(&error.to_bytes());
    context.request_close();
}

fn forward_cancel(gateway: &Gateway, key: BackendIdentity) {
    let Some(target) = gateway.sessions.cancel_target_for(key) else {
        debug!("cancel request for an idle or unknown session");
        return;
    };

    tokio::spawn(async move {
        if let Err(e) = send_cancel(&target).await {
            debug!(host = %target.host, port = target.port, "cancel forwarding failed: {e}");
        }
    });
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
