use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

// -----------------------------------------------------------------------------
// ----- FrontendTransport -----------------------------------------------------

/// Client socket, upgraded in place once an SSLRequest is accepted.
#[derive(Debug)]
pub(crate) enum FrontendTransport {
    Plain(Option<TcpStream>),
    Tls(Box<TlsStream<TcpStream>>),
}

impl FrontendTransport {
    pub(crate) fn new(stream: TcpStream) -> Self {
        FrontendTransport::Plain(Some(stream))
    }

    pub(crate) async fn read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            FrontendTransport::Plain(Some(stream)) => stream.read_buf(buf).await,
            FrontendTransport::Plain(None) => Err(missing_stream()),
            FrontendTransport::Tls(stream) => stream.read_buf(buf).await,
        }
    }

    pub(crate) async fn write_all_buf(&mut self, buf: &mut BytesMut) -> io::Result<()> {
        match self {
            FrontendTransport::Plain(Some(stream)) => stream.write_all_buf(buf).await,
            FrontendTransport::Plain(None) => Err(missing_stream()),
            FrontendTransport::Tls(stream) => stream.write_all_buf(buf).await,
        }
    }

    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        match self {
            FrontendTransport::Plain(Some(stream)) => stream.flush().await,
            FrontendTransport::Plain(None) => Err(missing_stream()),
            FrontendTransport::Tls(stream) => stream.flush().await,
        }
    }

    pub(crate) async fn shutdown(&mut self) {
        let _ = match self {
            FrontendTransport::Plain(Some(stream)) => stream.shutdown().await,
            FrontendTransport::Plain(None) => Ok(()),
            FrontendTransport::Tls(stream) => stream.shutdown().await,
        };
    }

    pub(crate) async fn upgrade_to_tls(&mut self, acceptor: &TlsAcceptor) -> io::Result<()> {
        let FrontendTransport::Plain(stream) = self else {
            return Ok(());
        };

        let stream = stream.take().ok_or_else(missing_stream)?;
        let tls_stream = acceptor.accept(stream).await?;
        *self = FrontendTransport::Tls(Box::new(tls_stream));

        Ok(())
    }
}

fn missing_stream() -> io::Error {
    io::Error::other("missing plaintext stream")
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
