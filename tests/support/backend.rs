//! Scripted PostgreSQL backend. Understands just enough SQL, extended
//! protocol and COPY for the pooler's integration tests.
//!
//! A simple query mentioning `hangup` is answered, then the backend closes
//! the socket.

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use pgharbor::wire::utils::{put_cstr, tagged_frame};
use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicI32, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

pub const BACKEND_PASSWORD: &str = "backend_pw";

const SSL_REQUEST: i32 = 80877103;
const TEXT_OID: i32 = 25;

// -----------------------------------------------------------------------------
// ----- MockBackend -----------------------------------------------------------

#[derive(Clone, Default)]
pub struct BackendStats {
    pub connections: Arc<AtomicUsize>,
    pub open: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<String>>>,
}

impl BackendStats {
    /// Every simple query and Parse the backend saw, in order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log.lock().iter().filter(|e| e.as_str() == entry).count()
    }

    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub stats: BackendStats,
    task: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = BackendStats::default();
        let next_pid = Arc::new(AtomicI32::new(1000));

        let task_stats = stats.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let stats = task_stats.clone();
                let pid = next_pid.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(async move {
                    stats.connections.fetch_add(1, Ordering::SeqCst);
                    stats.open.fetch_add(1, Ordering::SeqCst);
                    let _ = BackendSession::new(stream, stats.clone(), pid).run().await;
                    stats.open.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        Self { addr, stats, task }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait until the backend has no open connections.
    pub async fn wait_all_closed(&self, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.stats.open.load(Ordering::SeqCst) == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// -----------------------------------------------------------------------------
// ----- BackendSession --------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tx {
    Idle,
    InBlock,
    Failed,
}

impl Tx {
    fn byte(self) -> u8 {
        match self {
            Tx::Idle => b'I',
            Tx::InBlock => b'T',
            Tx::Failed => b'E',
        }
    }
}

enum Outcome {
    Rows { column: String, values: Vec<String> },
    Command(String),
    Error { code: &'static str, message: String },
}

struct BackendSession {
    stream: TcpStream,
    stats: BackendStats,
    pid: i32,
    database: String,
    tx: Tx,
    statements: HashMap<String, String>,
    portals: HashMap<String, String>,
    skip_until_sync: bool,
    /// Rows received so far while in COPY FROM STDIN.
    copy_in: Option<usize>,
    hang_up: bool,
    out: BytesMut,
}

impl BackendSession {
    fn new(stream: TcpStream, stats: BackendStats, pid: i32) -> Self {
        Self {
            stream,
            stats,
            pid,
            database: String::new(),
            tx: Tx::Idle,
            statements: HashMap::new(),
            portals: HashMap::new(),
            skip_until_sync: false,
            copy_in: None,
            hang_up: false,
            out: BytesMut::new(),
        }
    }

    async fn run(mut self) -> io::Result<()> {
        if !self.startup().await? {
            return Ok(());
        }

        loop {
            let tag = match self.stream.read_u8().await {
                Ok(tag) => tag,
                Err(_) => return Ok(()),
            };
            let len = self.stream.read_i32().await? as usize;
            let mut body = vec![0u8; len - 4];
            self.stream.read_exact(&mut body).await?;

            if tag == b'X' {
                return Ok(());
            }
            self.handle(tag, &body);

            if !self.out.is_empty() {
                let out = self.out.split();
                self.stream.write_all(&out).await?;
            }
            if self.hang_up {
                return Ok(());
            }
        }
    }

    async fn startup(&mut self) -> io::Result<bool> {
        let params = loop {
            let len = self.stream.read_i32().await? as usize;
            let mut body = vec![0u8; len - 4];
            self.stream.read_exact(&mut body).await?;
            let code = i32::from_be_bytes([body[0], body[1], body[2], body[3]]);
            if code == SSL_REQUEST {
                self.stream.write_all(b"N").await?;
                continue;
            }
            break cstr_pairs(&body[4..]);
        };
        self.database = params
            .iter()
            .find(|(k, _)| k == "database")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();

        self.stream
            .write_all(&tagged_frame(b'R', |b| b.put_i32(3)))
            .await?;

        let tag = self.stream.read_u8().await?;
        let len = self.stream.read_i32().await? as usize;
        let mut body = vec![0u8; len - 4];
        self.stream.read_exact(&mut body).await?;
        let password = cstr(&body);
        if tag != b'p' || password != BACKEND_PASSWORD {
            let err = error_frame("28P01", "password authentication failed");
            self.stream.write_all(&err).await?;
            return Ok(false);
        }

        let mut out = BytesMut::new();
        out.extend_from_slice(&tagged_frame(b'R', |b| b.put_i32(0)));
        for (name, value) in [
            ("server_version", "16.4 (mock)"),
            ("server_encoding", "UTF8"),
            ("client_encoding", "UTF8"),
        ] {
            out.extend_from_slice(&tagged_frame(b'S', |b| {
                put_cstr(b, name);
                put_cstr(b, value);
            }));
        }
        let pid = self.pid;
        out.extend_from_slice(&tagged_frame(b'K', |b| {
            b.put_i32(pid);
            b.put_i32(pid * 7);
        }));
        out.extend_from_slice(&ready(Tx::Idle));
        self.stream.write_all(&out).await?;
        Ok(true)
    }

    fn handle(&mut self, tag: u8, body: &[u8]) {
        if self.copy_in.is_some() {
            self.handle_copy_in(tag, body);
            return;
        }
        if self.skip_until_sync && tag != b'S' {
            return;
        }

        match tag {
            b'Q' => {
                let sql = cstr(body);
                self.stats.record(format!("Q:{sql}"));
                self.hang_up = sql.contains("hangup");
                if self.start_copy(&sql) {
                    return;
                }
                match self.run_sql(&sql) {
                    Outcome::Rows { column, values } => {
                        self.out.extend_from_slice(&row_description(&column));
                        self.push_rows(&values);
                    }
                    Outcome::Command(tag) => self.out.extend_from_slice(&complete(&tag)),
                    Outcome::Error { code, message } => self.fail(code, &message),
                }
                self.out.extend_from_slice(&ready(self.tx));
            }
            b'P' => {
                let mut fields = body.split(|b| *b == 0);
                let name = utf8(fields.next());
                let sql = utf8(fields.next());
                self.stats.record(format!("P:{name}:{sql}"));

                if sql.contains("missing_table") {
                    self.fail_extended("42P01", "relation \"missing_table\" does not exist");
                } else if !name.is_empty() && self.statements.contains_key(&name) {
                    self.fail_extended("42P05", &format!("prepared statement \"{name}\" already exists"));
                } else {
                    self.statements.insert(name, sql);
                    self.out.extend_from_slice(&tagged_frame(b'1', |_| {}));
                }
            }
            b'B' => {
                let mut fields = body.split(|b| *b == 0);
                let portal = utf8(fields.next());
                let statement = utf8(fields.next());
                match self.statements.get(&statement).cloned() {
                    Some(sql) => {
                        self.portals.insert(portal, sql);
                        self.out.extend_from_slice(&tagged_frame(b'2', |_| {}));
                    }
                    None => self.fail_extended(
                        "26000",
                        &format!("prepared statement \"{statement}\" does not exist"),
                    ),
                }
            }
            b'D' => {
                let name = cstr(&body[1..]);
                let sql = if body[0] == b'S' {
                    self.statements.get(&name).cloned()
                } else {
                    self.portals.get(&name).cloned()
                };
                let Some(sql) = sql else {
                    self.fail_extended("26000", &format!("\"{name}\" does not exist"));
                    return;
                };
                if body[0] == b'S' {
                    self.out.extend_from_slice(&tagged_frame(b't', |b| b.put_i16(0)));
                }
                match select_column(&sql) {
                    Some(column) => self.out.extend_from_slice(&row_description(&column)),
                    None => self.out.extend_from_slice(&tagged_frame(b'n', |_| {})),
                }
            }
            b'E' => {
                let portal = cstr(body);
                let Some(sql) = self.portals.get(&portal).cloned() else {
                    self.fail_extended("34000", &format!("portal \"{portal}\" does not exist"));
                    return;
                };
                match self.run_sql(&sql) {
                    Outcome::Rows { values, .. } => self.push_rows(&values),
                    Outcome::Command(tag) => self.out.extend_from_slice(&complete(&tag)),
                    Outcome::Error { code, message } => {
                        self.fail(code, &message);
                        self.skip_until_sync = true;
                    }
                }
            }
            b'C' => {
                let name = cstr(&body[1..]);
                if body[0] == b'S' {
                    self.statements.remove(&name);
                } else {
                    self.portals.remove(&name);
                }
                self.out.extend_from_slice(&tagged_frame(b'3', |_| {}));
            }
            b'S' => {
                self.skip_until_sync = false;
                self.portals.clear();
                self.out.extend_from_slice(&ready(self.tx));
            }
            b'H' => {}
            other => self.fail("08P01", &format!("unexpected message {:?}", other as char)),
        }
    }

    /// COPY ... FROM STDIN waits for client data; COPY ... TO STDOUT
    /// streams three rows. Returns false for anything else.
    fn start_copy(&mut self, sql: &str) -> bool {
        let normalized = sql.trim().trim_end_matches(';').trim().to_ascii_uppercase();
        if !normalized.starts_with("COPY ") {
            return false;
        }

        if normalized.ends_with("FROM STDIN") {
            self.out.extend_from_slice(&copy_response(b'G'));
            self.copy_in = Some(0);
        } else if normalized.ends_with("TO STDOUT") {
            self.out.extend_from_slice(&copy_response(b'H'));
            for row in ["1", "2", "3"] {
                self.out
                    .extend_from_slice(&tagged_frame(b'd', |b| b.extend_from_slice(format!("{row}\n").as_bytes())));
            }
            self.out.extend_from_slice(&tagged_frame(b'c', |_| {}));
            self.out.extend_from_slice(&complete("COPY 3"));
            self.out.extend_from_slice(&ready(self.tx));
        } else {
            self.fail("42601", "unsupported COPY");
            self.out.extend_from_slice(&ready(self.tx));
        }
        true
    }

    fn handle_copy_in(&mut self, tag: u8, body: &[u8]) {
        let rows = self.copy_in.unwrap_or_default();
        match tag {
            b'd' => {
                self.copy_in = Some(rows + body.iter().filter(|b| **b == b'\n').count());
            }
            b'c' => {
                self.copy_in = None;
                self.stats.record(format!("COPY:{rows}"));
                self.out.extend_from_slice(&complete(&format!("COPY {rows}")));
                self.out.extend_from_slice(&ready(self.tx));
            }
            b'f' => {
                self.copy_in = None;
                self.fail("57014", &format!("COPY from stdin failed: {}", cstr(body)));
                self.out.extend_from_slice(&ready(self.tx));
            }
            // Flush and Sync are ignored during COPY IN.
            _ => {}
        }
    }

    fn run_sql(&mut self, sql: &str) -> Outcome {
        let normalized = sql.trim().trim_end_matches(';').trim().to_ascii_uppercase();

        if self.tx == Tx::Failed && normalized != "ROLLBACK" && normalized != "COMMIT" {
            return Outcome::Error {
                code: "25P02",
                message: "current transaction is aborted".into(),
            };
        }

        match normalized.as_str() {
            "BEGIN" => {
                self.tx = Tx::InBlock;
                return Outcome::Command("BEGIN".into());
            }
            "COMMIT" => {
                let tag = if self.tx == Tx::Failed { "ROLLBACK" } else { "COMMIT" };
                self.tx = Tx::Idle;
                return Outcome::Command(tag.into());
            }
            "ROLLBACK" => {
                self.tx = Tx::Idle;
                return Outcome::Command("ROLLBACK".into());
            }
            "DISCARD ALL" => {
                self.statements.clear();
                return Outcome::Command("DISCARD ALL".into());
            }
            "DEALLOCATE ALL" => {
                self.statements.clear();
                return Outcome::Command("DEALLOCATE ALL".into());
            }
            "SELECT CURRENT_DATABASE()" => {
                return Outcome::Rows {
                    column: "current_database".into(),
                    values: vec![self.database.clone()],
                };
            }
            "SELECT PG_BACKEND_PID()" => {
                return Outcome::Rows {
                    column: "pg_backend_pid".into(),
                    values: vec![self.pid.to_string()],
                };
            }
            _ => {}
        }

        if normalized.contains("MISSING_TABLE") {
            if self.tx == Tx::InBlock {
                self.tx = Tx::Failed;
            }
            return Outcome::Error {
                code: "42P01",
                message: "relation \"missing_table\" does not exist".into(),
            };
        }
        if normalized.starts_with("SET ") {
            return Outcome::Command("SET".into());
        }
        if let Some(column) = select_column(sql) {
            let value = sql.trim().trim_end_matches(';')[7..].trim().trim_matches('\'').to_string();
            return Outcome::Rows {
                column,
                values: vec![value],
            };
        }

        Outcome::Error {
            code: "42601",
            message: format!("syntax error at or near \"{sql}\""),
        }
    }

    fn push_rows(&mut self, values: &[String]) {
        for value in values {
            self.out.extend_from_slice(&tagged_frame(b'D', |b| {
                b.put_i16(1);
                b.put_i32(value.len() as i32);
                b.extend_from_slice(value.as_bytes());
            }));
        }
        self.out
            .extend_from_slice(&complete(&format!("SELECT {}", values.len())));
    }

    fn fail(&mut self, code: &'static str, message: &str) {
        if self.tx == Tx::InBlock {
            self.tx = Tx::Failed;
        }
        self.out.extend_from_slice(&error_frame(code, message));
    }

    fn fail_extended(&mut self, code: &'static str, message: &str) {
        self.fail(code, message);
        self.skip_until_sync = true;
    }
}

// -----------------------------------------------------------------------------
// ----- Frame helpers ---------------------------------------------------------

fn select_column(sql: &str) -> Option<String> {
    let trimmed = sql.trim();
    if trimmed.len() > 7 && trimmed[..7].eq_ignore_ascii_case("SELECT ") {
        Some("?column?".to_string())
    } else {
        None
    }
}

/// CopyInResponse or CopyOutResponse: text format, one column.
fn copy_response(tag: u8) -> Bytes {
    tagged_frame(tag, |b| {
        b.put_u8(0);
        b.put_i16(1);
        b.put_i16(0);
    })
}

fn ready(tx: Tx) -> Bytes {
    tagged_frame(b'Z', |b| b.put_u8(tx.byte()))
}

fn complete(tag: &str) -> Bytes {
    tagged_frame(b'C', |b| put_cstr(b, tag))
}

fn row_description(column: &str) -> Bytes {
    tagged_frame(b'T', |b| {
        b.put_i16(1);
        put_cstr(b, column);
        b.put_i32(0);
        b.put_i16(0);
        b.put_i32(TEXT_OID);
        b.put_i16(-1);
        b.put_i32(-1);
        b.put_i16(0);
    })
}

fn error_frame(code: &str, message: &str) -> Bytes {
    tagged_frame(b'E', |b| {
        b.put_u8(b'S');
        put_cstr(b, "ERROR");
        b.put_u8(b'C');
        put_cstr(b, code);
        b.put_u8(b'M');
        put_cstr(b, message);
        b.put_u8(0);
    })
}

fn cstr(body: &[u8]) -> String {
    utf8(body.split(|b| *b == 0).next())
}

fn utf8(bytes: Option<&[u8]>) -> String {
    String::from_utf8_lossy(bytes.unwrap_or_default()).into_owned()
}

fn cstr_pairs(mut body: &[u8]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    loop {
        let Some(end) = body.iter().position(|b| *b == 0) else {
            break;
        };
        if end == 0 {
            break;
        }
        let key = String::from_utf8_lossy(&body[..end]).into_owned();
        body = &body[end + 1..];
        let Some(end) = body.iter().position(|b| *b == 0) else {
            break;
        };
        let value = String::from_utf8_lossy(&body[..end]).into_owned();
        body = &body[end + 1..];
        pairs.push((key, value));
    }
    pairs
}
