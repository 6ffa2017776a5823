use async_trait::async_trait;
use secrecy::SecretString;
use std::{fmt, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::timeout,
};
use tracing::debug;

use super::{ServerConnection, ServerError, startup};

// -----------------------------------------------------------------------------
// ----- ServerStream ----------------------------------------------------------

/// Transport of a server connection. TCP in production, in-memory pipes in
/// tests.
pub trait ServerStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ServerStream for T {}

// -----------------------------------------------------------------------------
// ----- ServerTarget ----------------------------------------------------------

/// Where and as whom a pool opens its server connections.
#[derive(Clone)]
pub struct ServerTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: SecretString,
    pub connect_timeout: Duration,
    pub statement_cache_size: usize,
}

impl ServerTarget {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTarget")
            .field("addr", &self.addr())
            .field("database", &self.database)
            .field("user", &self.user)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Connector -------------------------------------------------------------

/// Opens a ready-for-query server connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, target: &ServerTarget) -> Result<ServerConnection, ServerError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, target: &ServerTarget) -> Result<ServerConnection, ServerError> {
        let addr = target.addr();

        let handshake = async {
            let stream = TcpStream::connect(&addr).await?;
            stream.set_nodelay(true)?;

            let mut conn = ServerConnection::new(Box::new(stream), target);
            startup::startup(&mut conn, target).await?;
            Ok::<_, ServerError>(conn)
        };

        let conn = timeout(target.connect_timeout, handshake)
            .await
            .map_err(|_| ServerError::ConnectTimeout { addr: addr.clone() })??;

        debug!(addr = %addr, database = %target.database, "server connection established");
        Ok(conn)
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
