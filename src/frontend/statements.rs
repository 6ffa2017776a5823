use bytes::BytesMut;
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::debug;

use crate::backend::ServerConnection;
use crate::frontend::proxy_responses as responses;
use crate::frontend::response_plan::{Expect, ResponsePlan};
use crate::shared_types::StatementSignature;
use crate::wire::observers::parse::ParseFrameObserver;
use crate::wire::observers::target::{Target, TargetFrameObserver};

// -----------------------------------------------------------------------------
// ----- ClientStatement -------------------------------------------------------

/// A named statement as the client prepared it.
#[derive(Debug, Clone)]
pub(crate) struct ClientStatement {
    pub(crate) signature: StatementSignature,
    query: String,
    param_type_oids: SmallVec<[i32; 8]>,
}

// -----------------------------------------------------------------------------
// ----- StatementMap ----------------------------------------------------------

/// Client statement names of one session, mapped onto content-addressed
/// server names so any pooled connection can serve them.
#[derive(Debug, Default)]
pub(crate) struct StatementMap {
    by_name: HashMap<String, ClientStatement>,
}

impl StatementMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, parse: &ParseFrameObserver<'_>) -> ClientStatement {
        let statement = ClientStatement {
            signature: StatementSignature::new(parse.query(), parse.param_type_oids()),
            query: parse.query().to_string(),
            param_type_oids: parse.param_type_oids().iter().copied().collect(),
        };
        self.by_name
            .insert(parse.statement().to_string(), statement.clone());
        statement
    }

    pub(crate) fn get(&self, name: &str) -> Option<&ClientStatement> {
        self.by_name.get(name)
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        self.by_name.remove(name).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.by_name.clear();
    }
}

// -----------------------------------------------------------------------------
// ----- Server Side -----------------------------------------------------------

/// Answer a client Parse. Already prepared on this connection: the pooler
/// replies ParseComplete itself once earlier replies are through.
pub(crate) fn prepare(
    server: &mut ServerConnection,
    plan: &mut ResponsePlan,
    out: &mut BytesMut,
    statement: &ClientStatement,
) {
    if server.has_statement(&statement.signature) {
        plan.push_synthetic(responses::parse_complete());
        return;
    }
    send_parse(server, plan, out, statement, true);
}

/// Make sure the statement exists on this connection before a Bind or
/// Describe refers to it. Returns the server-side name.
pub(crate) fn ensure_prepared(
    server: &mut ServerConnection,
    plan: &mut ResponsePlan,
    out: &mut BytesMut,
    statement: &ClientStatement,
) -> String {
    if !server.has_statement(&statement.signature) {
        send_parse(server, plan, out, statement, false);
    }
    statement.signature.server_name()
}

fn send_parse(
    server: &mut ServerConnection,
    plan: &mut ResponsePlan,
    out: &mut BytesMut,
    statement: &ClientStatement,
    visible: bool,
) {
    if let Some(evicted) = server.remember_statement(statement.signature) {
        debug!(statement = %evicted.server_name(), "closing evicted statement");
        out.extend_from_slice(&TargetFrameObserver::build(
            b'C',
            Target::Statement,
            &evicted.server_name(),
        ));
        plan.push_hidden(Expect::Close);
    }

    out.extend_from_slice(&ParseFrameObserver::build(
        &statement.signature.server_name(),
        &statement.query,
        &statement.param_type_oids,
    ));
    plan.push_parse(visible, Some(statement.signature));
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
