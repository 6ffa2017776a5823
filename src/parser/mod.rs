//! The little SQL the pooler has to understand: its own sharding directive
//! and statements that drop server-side prepared statements.

use pg_query::NodeEnum;
use pg_query::protobuf::{DiscardMode, Node, a_const};
use tracing::debug;

// -----------------------------------------------------------------------------
// ----- Directive -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `SET SHARD TO '<n>'`, handled by the pooler.
    SetShard(String),

    /// `DISCARD ALL` or `DEALLOCATE ALL`: the server forgets every prepared
    /// statement.
    ForgetAllStatements,

    /// `DEALLOCATE <name>`.
    ForgetStatement(String),

    Passthrough,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
}

// -----------------------------------------------------------------------------
// ----- directive -------------------------------------------------------------

/// Classify a simple-query string. Only statements starting with one of the
/// keywords the pooler cares about are handed to the parser.
pub fn directive(sql: &str) -> Result<Directive, ParseError> {
    if !starts_with_interesting_keyword(sql) {
        return Ok(Directive::Passthrough);
    }

    let ast = pg_query::parse(sql).map_err(|e| ParseError {
        message: e.to_string(),
    })?;
    debug!(statements = ?ast.statement_types(), "classifying query");

    let mut found = Directive::Passthrough;
    for raw in &ast.protobuf.stmts {
        let Some(node) = raw.stmt.as_ref().and_then(|stmt| stmt.node.as_ref()) else {
            continue;
        };

        let next = match node {
            NodeEnum::VariableSetStmt(set) if set.name == "shard" => {
                shard_argument(&set.args).map(Directive::SetShard)
            }
            NodeEnum::DiscardStmt(discard) if discard.target == DiscardMode::DiscardAll as i32 => {
                Some(Directive::ForgetAllStatements)
            }
            NodeEnum::DeallocateStmt(dealloc) if dealloc.name.is_empty() => {
                Some(Directive::ForgetAllStatements)
            }
            NodeEnum::DeallocateStmt(dealloc) => {
                Some(Directive::ForgetStatement(dealloc.name.clone()))
            }
            _ => None,
        };

        // Forgetting everything wins over anything else in the batch.
        match next {
            Some(Directive::ForgetAllStatements) => return Ok(Directive::ForgetAllStatements),
            Some(directive) if found == Directive::Passthrough => found = directive,
            _ => {}
        }
    }

    Ok(found)
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn starts_with_interesting_keyword(sql: &str) -> bool {
    let word: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    ["set", "discard", "deallocate"]
        .iter()
        .any(|keyword| word.eq_ignore_ascii_case(keyword))
}

fn shard_argument(args: &[Node]) -> Option<String> {
    let [arg] = args else {
        return None;
    };

    let NodeEnum::AConst(constant) = arg.node.as_ref()? else {
        return None;
    };

    match constant.val.as_ref()? {
        a_const::Val::Sval(s) => Some(s.sval.clone()),
        a_const::Val::Ival(i) => Some(i.ival.to_string()),
        _ => None,
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
