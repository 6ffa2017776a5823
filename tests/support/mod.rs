#![allow(dead_code)]

mod backend;

pub use backend::{BACKEND_PASSWORD, BackendStats, MockBackend};

use bytes::{BufMut, Bytes};
use pgharbor::{
    Config, Gateway, Server, backend::TcpConnector, config::LogLevel,
    wire::utils::{put_cstr, tagged_frame, untagged_frame},
};
use std::{io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    task::JoinHandle,
    time::timeout,
};
use tokio_postgres::{Client, NoTls};

pub const USER: &str = "alice";
pub const PASSWORD: &str = "alice_pw";
pub const DATABASE: &str = "app";
pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin_pw";
pub const ADMIN_DATABASE: &str = "pgharbor";

const IO_TIMEOUT: Duration = Duration::from_secs(5);

// -----------------------------------------------------------------------------
// ----- Harness ---------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Options {
    pub shutdown_timeout: &'static str,
    pub pool_timeout: &'static str,
    pub pool_max: usize,
    pub prepared_statements: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            shutdown_timeout: "5s",
            pool_timeout: "1s",
            pool_max: 4,
            prepared_statements: true,
        }
    }
}

/// A pooler running in-process in front of a mock backend.
pub struct Harness {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub backend: MockBackend,
    server: JoinHandle<io::Result<()>>,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(Options::default()).await
    }

    pub async fn start_with(options: Options) -> Self {
        let backend = MockBackend::start().await;
        let raw = config_toml(&options, backend.port());
        let config = Config::parse(&raw, "127.0.0.1:0".parse().unwrap(), LogLevel::Info)
            .expect("test config parses");

        let gateway = Gateway::new(Arc::new(config), Arc::new(TcpConnector), None);
        let server = Server::bind(gateway.clone()).expect("bind pooler");
        let addr = server.local_addr().unwrap();
        let server = tokio::spawn(server.run());

        Self {
            addr,
            gateway,
            backend,
            server,
        }
    }

    pub async fn connect(&self) -> Client {
        self.connect_as(USER, PASSWORD, DATABASE).await.expect("connect")
    }

    pub async fn connect_as(
        &self,
        user: &str,
        password: &str,
        database: &str,
    ) -> Result<Client, tokio_postgres::Error> {
        let conn_str = format!(
            "host=127.0.0.1 port={} user={user} password={password} dbname={database}",
            self.addr.port()
        );
        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;
        tokio::spawn(async move {
            let _ = connection.await;
        });
        Ok(client)
    }

    pub async fn admin(&self) -> Client {
        self.connect_as(ADMIN_USER, ADMIN_PASSWORD, ADMIN_DATABASE)
            .await
            .expect("admin connect")
    }

    pub async fn raw(&self) -> RawClient {
        RawClient::login(self.addr, USER, PASSWORD, DATABASE).await
    }

    /// Wait for `Server::run` to return.
    pub async fn stopped(&mut self, within: Duration) -> bool {
        match timeout(within, &mut self.server).await {
            Ok(joined) => {
                joined.expect("server task").expect("server run");
                true
            }
            Err(_) => false,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn config_toml(options: &Options, backend_port: u16) -> String {
    format!(
        r#"
        [general]
        shutdown_timeout = "{shutdown_timeout}"
        pool_timeout = "{pool_timeout}"
        connect_timeout = "2s"
        prepared_statements = {prepared_statements}
        admin_username = "{ADMIN_USER}"
        admin_password = "{ADMIN_PASSWORD}"
        admin_database = "{ADMIN_DATABASE}"

        [[databases]]
        name = "{DATABASE}"
        pool_min = 0
        pool_max = {pool_max}

        [[databases.shards]]
        host = "127.0.0.1"
        port = {backend_port}
        database = "shard0"

        [[databases.shards]]
        host = "127.0.0.1"
        port = {backend_port}
        database = "shard1"

        [[users]]
        username = "{USER}"
        password = "{PASSWORD}"
        server_password = "{BACKEND_PASSWORD}"
        "#,
        shutdown_timeout = options.shutdown_timeout,
        pool_timeout = options.pool_timeout,
        prepared_statements = options.prepared_statements,
        pool_max = options.pool_max,
    )
}

// -----------------------------------------------------------------------------
// ----- RawClient -------------------------------------------------------------

/// Frame-level client for asserting exact protocol sequences.
pub struct RawClient {
    stream: TcpStream,
}

impl RawClient {
    pub async fn login(addr: SocketAddr, user: &str, password: &str, database: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&startup(user, database)).await;

        let (tag, body) = client.recv().await.expect("auth request");
        assert_eq!(tag, b'R');
        assert_eq!(&body[..], &3i32.to_be_bytes());

        client.send(&password_message(password)).await;
        let frames = client.until_ready().await;
        assert!(
            frames.iter().any(|(tag, body)| *tag == b'R' && &body[..] == &0i32.to_be_bytes()),
            "login failed: {frames:?}"
        );
        client
    }

    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to pooler");
        stream.set_nodelay(true).unwrap();
        Self { stream }
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write to pooler");
    }

    /// Next frame, or None once the pooler closed the connection.
    pub async fn recv(&mut self) -> Option<(u8, Bytes)> {
        timeout(IO_TIMEOUT, async {
            let tag = self.stream.read_u8().await.ok()?;
            let len = self.stream.read_i32().await.ok()? as usize;
            let mut body = vec![0u8; len - 4];
            self.stream.read_exact(&mut body).await.ok()?;
            Some((tag, Bytes::from(body)))
        })
        .await
        .expect("pooler response timed out")
    }

    /// Frames up to and including the next ReadyForQuery.
    pub async fn until_ready(&mut self) -> Vec<(u8, Bytes)> {
        let mut frames = Vec::new();
        loop {
            let frame = self.recv().await.expect("connection closed before ReadyForQuery");
            let done = frame.0 == b'Z';
            frames.push(frame);
            if done {
                return frames;
            }
        }
    }

    /// Run a simple query; returns the tags seen and the final status byte.
    pub async fn simple(&mut self, sql: &str) -> (Vec<u8>, u8) {
        self.send(&query(sql)).await;
        let frames = self.until_ready().await;
        let status = frames.last().map(|(_, body)| body[0]).unwrap_or_default();
        (frames.iter().map(|(tag, _)| *tag).collect(), status)
    }

    /// True when the pooler closes the connection within `within`.
    pub async fn closed_within(&mut self, within: Duration) -> bool {
        let mut scratch = [0u8; 512];
        matches!(
            timeout(within, async {
                loop {
                    match self.stream.read(&mut scratch).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => {}
                    }
                }
            })
            .await,
            Ok(())
        )
    }
}

// -----------------------------------------------------------------------------
// ----- Frame builders --------------------------------------------------------

pub fn startup(user: &str, database: &str) -> Bytes {
    untagged_frame(|b| {
        b.put_i32(196608);
        put_cstr(b, "user");
        put_cstr(b, user);
        put_cstr(b, "database");
        put_cstr(b, database);
        b.put_u8(0);
    })
}

pub fn password_message(password: &str) -> Bytes {
    tagged_frame(b'p', |b| put_cstr(b, password))
}

pub fn query(sql: &str) -> Bytes {
    tagged_frame(b'Q', |b| put_cstr(b, sql))
}

pub fn parse(name: &str, sql: &str) -> Bytes {
    tagged_frame(b'P', |b| {
        put_cstr(b, name);
        put_cstr(b, sql);
        b.put_i16(0);
    })
}

pub fn bind(portal: &str, statement: &str) -> Bytes {
    tagged_frame(b'B', |b| {
        put_cstr(b, portal);
        put_cstr(b, statement);
        b.put_i16(0);
        b.put_i16(0);
        b.put_i16(0);
    })
}

pub fn describe_statement(name: &str) -> Bytes {
    tagged_frame(b'D', |b| {
        b.put_u8(b'S');
        put_cstr(b, name);
    })
}

pub fn execute(portal: &str) -> Bytes {
    tagged_frame(b'E', |b| {
        put_cstr(b, portal);
        b.put_i32(0);
    })
}

pub fn close_statement(name: &str) -> Bytes {
    tagged_frame(b'C', |b| {
        b.put_u8(b'S');
        put_cstr(b, name);
    })
}

pub fn sync() -> Bytes {
    tagged_frame(b'S', |_| {})
}

pub fn copy_data(data: &str) -> Bytes {
    tagged_frame(b'd', |b| b.extend_from_slice(data.as_bytes()))
}

pub fn copy_done() -> Bytes {
    tagged_frame(b'c', |_| {})
}

pub fn copy_fail(reason: &str) -> Bytes {
    tagged_frame(b'f', |b| put_cstr(b, reason))
}

pub fn terminate() -> Bytes {
    tagged_frame(b'X', |_| {})
}

/// SQLSTATE of an ErrorResponse body.
pub fn sqlstate(body: &[u8]) -> String {
    let mut fields = body;
    while let Some((&code, rest)) = fields.split_first() {
        if code == 0 {
            break;
        }
        let end = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
        if code == b'C' {
            return String::from_utf8_lossy(&rest[..end]).into_owned();
        }
        fields = &rest[(end + 1).min(rest.len())..];
    }
    String::new()
}

pub fn concat(frames: &[Bytes]) -> Vec<u8> {
    frames.iter().flat_map(|f| f.iter().copied()).collect()
}
