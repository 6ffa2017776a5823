use tokio::{io::AsyncWriteExt, net::TcpStream};

use crate::shared_types::BackendIdentity;

use super::messages;

// -----------------------------------------------------------------------------
// ----- CancelTarget ----------------------------------------------------------

/// A backend process that can be asked to cancel its current query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelTarget {
    pub host: String,
    pub port: u16,
    pub key: BackendIdentity,
}

/// CancelRequest travels over its own short-lived connection.
pub async fn send_cancel(target: &CancelTarget) -> std::io::Result<()> {
    let mut stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
    stream.write_all(&messages::cancel_request(target.key)).await?;
    stream.shutdown().await
}
