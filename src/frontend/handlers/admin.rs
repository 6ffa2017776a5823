use bytes::BytesMut;
use tracing::info;

use crate::ErrorResponse;
use crate::admin::{self, AdminCommand};
use crate::frontend::buffers::FrontendBuffers;
use crate::frontend::context::FrontendContext;
use crate::frontend::proxy_responses as responses;
use crate::gateway::Gateway;
use crate::shared_types::{AuthStage, TransactionStatus};
use crate::wire::MessageType;
use crate::wire::observers::query::QueryFrameObserver;
use crate::wire::utils::peek_frontend;

// -----------------------------------------------------------------------------
// ----- Admin Handler ---------------------------------------------------------

/// Answer admin commands. Never touches a pool and ignores shutdown state.
pub(crate) fn handle_admin(
    context: &mut FrontendContext,
    buffers: &mut FrontendBuffers,
    sequence: BytesMut,
    gateway: &Gateway,
) {
    let mut rest = &sequence[..];

    while let Some(found) = peek_frontend(AuthStage::Ready, rest) {
        let (frame, tail) = rest.split_at(found.len);
        rest = tail;

        match found.message_type {
            MessageType::Query => {
                let Ok(query) = QueryFrameObserver::new(frame) else {
                    let err = ErrorResponse::protocol_violation("malformed Query message");
                    buffers.queue_response(&err.to_bytes());
                    context.request_close();
                    return;
                };
                run_query(buffers, query.query(), gateway);
            }

            MessageType::Terminate => {
                context.request_close();
                return;
            }

            _ => {
                let err = ErrorResponse::protocol_violation(
                    "the admin console only accepts simple queries",
                );
                buffers.queue_response(&err.to_bytes());
                context.request_close();
                return;
            }
        }
    }
}

fn run_query(buffers: &mut FrontendBuffers, query: &str, gateway: &Gateway) {
    match AdminCommand::parse(query) {
        Some(command) => {
            info!(?command, "admin command");
            let result = admin::execute(command, gateway);

            buffers.queue_response(&responses::row_description(result.columns));
            for row in &result.rows {
                buffers.queue_response(&responses::data_row(row));
            }
            buffers.queue_response(&responses::command_complete(&result.tag));
        }
        None => {
            let err = ErrorResponse::syntax_error(format!("unsupported admin command: {}", query.trim()))
                .with_hint("try SHOW POOLS, SHOW DATABASES, SHOW CLIENTS, SHOW VERSION or SHUTDOWN");
            buffers.queue_response(&err.to_bytes());
        }
    }

    buffers.queue_response(&responses::ready_with_status(TransactionStatus::Idle));
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
