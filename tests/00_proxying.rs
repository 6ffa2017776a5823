mod support;

use std::time::Duration;
use support::{
    DATABASE, Harness, Options, PASSWORD, USER, concat, copy_data, copy_done, copy_fail, query,
};
use tokio_postgres::{Client, SimpleQueryMessage};

async fn first_value(client: &Client, sql: &str) -> String {
    let messages = client.simple_query(sql).await.expect("query");
    messages
        .into_iter()
        .find_map(|m| match m {
            SimpleQueryMessage::Row(row) => row.get(0).map(str::to_string),
            _ => None,
        })
        .expect("one row")
}

fn sqlstate(err: &tokio_postgres::Error) -> Option<&str> {
    err.code().map(|code| code.code())
}

#[tokio::test]
async fn forwards_simple_queries() {
    let harness = Harness::start().await;
    let client = harness.connect().await;

    assert_eq!(first_value(&client, "SELECT 1").await, "1");
    assert_eq!(first_value(&client, "SELECT current_database()").await, "shard0");
}

#[tokio::test]
async fn rejects_bad_password_and_unknown_database() {
    let harness = Harness::start().await;

    let err = harness.connect_as(USER, "wrong", DATABASE).await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("28P01"));

    let err = harness.connect_as(USER, PASSWORD, "nope").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("3D000"));
}

#[tokio::test]
async fn clients_share_server_connections_between_transactions() {
    let harness = Harness::start_with(Options {
        pool_max: 1,
        ..Options::default()
    })
    .await;

    let a = harness.connect().await;
    let b = harness.connect().await;
    for _ in 0..3 {
        assert_eq!(first_value(&a, "SELECT 1").await, "1");
        assert_eq!(first_value(&b, "SELECT 2").await, "2");
    }

    let pid_a = first_value(&a, "SELECT pg_backend_pid()").await;
    let pid_b = first_value(&b, "SELECT pg_backend_pid()").await;
    assert_eq!(pid_a, pid_b);
    assert_eq!(harness.backend.stats.connections.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn set_shard_switches_backend_outside_transactions() {
    let harness = Harness::start().await;
    let client = harness.connect().await;

    client.simple_query("SET SHARD TO '1'").await.expect("set shard");
    assert_eq!(first_value(&client, "SELECT current_database()").await, "shard1");

    let err = client.simple_query("SET SHARD TO '7'").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("22023"));

    client.simple_query("BEGIN").await.unwrap();
    let err = client.simple_query("SET SHARD TO '0'").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("25001"));
    client.simple_query("COMMIT").await.unwrap();

    assert_eq!(first_value(&client, "SELECT current_database()").await, "shard1");
}

#[tokio::test]
async fn server_errors_reach_the_client_and_session_survives() {
    let harness = Harness::start().await;
    let client = harness.connect().await;

    client.simple_query("BEGIN").await.unwrap();
    let err = client.simple_query("SELECT * FROM missing_table").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("42P01"));
    let err = client.simple_query("SELECT 1").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("25P02"));
    client.simple_query("ROLLBACK").await.unwrap();

    assert_eq!(first_value(&client, "SELECT 3").await, "3");
}

#[tokio::test]
async fn abandoned_transaction_is_rolled_back_before_reuse() {
    let harness = Harness::start_with(Options {
        pool_max: 1,
        ..Options::default()
    })
    .await;

    let mut raw = harness.raw().await;
    let (_, status) = raw.simple("BEGIN").await;
    assert_eq!(status, b'T');
    drop(raw);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut next = harness.raw().await;
    let (tags, status) = next.simple("SELECT 1").await;
    assert_eq!(tags, vec![b'T', b'D', b'C', b'Z']);
    assert_eq!(status, b'I');
    assert_eq!(harness.backend.stats.count("Q:ROLLBACK"), 1);
}

#[tokio::test]
async fn lost_server_connection_is_reported_and_the_next_query_runs() {
    let harness = Harness::start().await;
    let mut client = harness.raw().await;

    let (_, status) = client.simple("BEGIN").await;
    assert_eq!(status, b'T');

    // The backend answers this one, then hangs up while the session idles
    // inside the transaction.
    let (tags, status) = client.simple("SELECT 'hangup'").await;
    assert_eq!(tags, vec![b'T', b'D', b'C', b'Z']);
    assert_eq!(status, b'T');

    let (tag, body) = client.recv().await.expect("connection-lost error");
    assert_eq!(tag, b'E');
    assert_eq!(support::sqlstate(&body), "08006");

    let (tags, status) = client.simple("SELECT 1").await;
    assert_eq!(tags, vec![b'T', b'D', b'C', b'Z']);
    assert_eq!(status, b'I');
    assert_eq!(harness.backend.stats.connections.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn copy_streams_pass_through() {
    let harness = Harness::start().await;
    let mut client = harness.raw().await;

    client.send(&query("COPY items FROM STDIN")).await;
    let (tag, _) = client.recv().await.expect("CopyInResponse");
    assert_eq!(tag, b'G');
    client
        .send(&concat(&[copy_data("a\n"), copy_data("b\nc\n"), copy_done()]))
        .await;
    let frames = client.until_ready().await;
    let tags: Vec<u8> = frames.iter().map(|(tag, _)| *tag).collect();
    assert_eq!(tags, vec![b'C', b'Z']);
    assert_eq!(&frames[0].1[..], b"COPY 3\0");
    assert_eq!(harness.backend.stats.count("COPY:3"), 1);

    client.send(&query("COPY items TO STDOUT")).await;
    let frames = client.until_ready().await;
    let tags: Vec<u8> = frames.iter().map(|(tag, _)| *tag).collect();
    assert_eq!(tags, vec![b'H', b'd', b'd', b'd', b'c', b'C', b'Z']);
    assert_eq!(&frames[1].1[..], b"1\n");
}

#[tokio::test]
async fn failed_copy_leaves_the_session_usable() {
    let harness = Harness::start().await;
    let mut client = harness.raw().await;

    client.send(&query("COPY items FROM STDIN")).await;
    let (tag, _) = client.recv().await.expect("CopyInResponse");
    assert_eq!(tag, b'G');
    client.send(&copy_fail("client gave up")).await;

    let frames = client.until_ready().await;
    assert_eq!(frames[0].0, b'E');
    assert_eq!(support::sqlstate(&frames[0].1), "57014");
    assert_eq!(frames.last().map(|(_, body)| body[0]), Some(b'I'));

    let (_, status) = client.simple("SELECT 1").await;
    assert_eq!(status, b'I');
}
