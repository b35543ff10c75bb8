//! Dispatcher-level command tests: frames in, RESP reply bytes out.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;

use rudis::commands::{Command, CommandError, CommandResult, dispatch};
use rudis::resp::RespValue;
use rudis::server::RedisServer;
use rudis::store::Store;

fn master() -> (Arc<RwLock<RedisServer>>, Arc<Store>) {
    server_with_args(&[])
}

fn replica() -> (Arc<RwLock<RedisServer>>, Arc<Store>) {
    server_with_args(&["--replicaof", "127.0.0.1 6399"])
}

fn server_with_args(extra: &[&str]) -> (Arc<RwLock<RedisServer>>, Arc<Store>) {
    let args: Vec<String> = std::iter::once("rudis")
        .chain(extra.iter().copied())
        .map(str::to_string)
        .collect();
    let server = RedisServer::new(args).expect("invalid test arguments");
    (Arc::new(RwLock::new(server)), Arc::new(Store::new()))
}

async fn exec(
    server: &Arc<RwLock<RedisServer>>,
    store: &Arc<Store>,
    parts: &[&str],
) -> Result<CommandResult, CommandError> {
    let command = Command::from_frame(RespValue::command(parts)).expect("unparseable command");
    dispatch(command, server, store, false).await
}

async fn exec_from_master(
    server: &Arc<RwLock<RedisServer>>,
    store: &Arc<Store>,
    parts: &[&str],
) -> Result<CommandResult, CommandError> {
    let command = Command::from_frame(RespValue::command(parts)).expect("unparseable command");
    dispatch(command, server, store, true).await
}

fn reply(result: Result<CommandResult, CommandError>) -> Bytes {
    match result.expect("command failed") {
        CommandResult::Response(bytes) => bytes,
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ping_answers_pong() {
    let (server, store) = master();
    assert_eq!(reply(exec(&server, &store, &["PING"]).await), "+PONG\r\n");
}

#[tokio::test]
async fn test_echo_answers_its_argument() {
    let (server, store) = master();
    assert_eq!(
        reply(exec(&server, &store, &["ECHO", "hey"]).await),
        "$3\r\nhey\r\n"
    );
}

#[tokio::test]
async fn test_command_names_are_case_insensitive() {
    let (server, store) = master();
    assert_eq!(reply(exec(&server, &store, &["ping"]).await), "+PONG\r\n");
}

#[tokio::test]
async fn test_set_then_get() {
    let (server, store) = master();
    assert_eq!(
        reply(exec(&server, &store, &["SET", "k", "v"]).await),
        "+OK\r\n"
    );
    assert_eq!(
        reply(exec(&server, &store, &["GET", "k"]).await),
        "$1\r\nv\r\n"
    );
}

#[tokio::test]
async fn test_get_missing_key_answers_null_bulk() {
    let (server, store) = master();
    assert_eq!(
        reply(exec(&server, &store, &["GET", "missing"]).await),
        "$-1\r\n"
    );
}

#[tokio::test]
async fn test_set_with_px_expires() {
    tokio::time::pause();
    let (server, store) = master();
    assert_eq!(
        reply(exec(&server, &store, &["SET", "k", "v", "PX", "100"]).await),
        "+OK\r\n"
    );

    tokio::time::advance(Duration::from_millis(10)).await;
    assert_eq!(
        reply(exec(&server, &store, &["GET", "k"]).await),
        "$1\r\nv\r\n"
    );

    tokio::time::advance(Duration::from_millis(190)).await;
    assert_eq!(reply(exec(&server, &store, &["GET", "k"]).await), "$-1\r\n");
    assert_eq!(
        reply(exec(&server, &store, &["TYPE", "k"]).await),
        "+none\r\n"
    );
}

#[tokio::test]
async fn test_set_argument_errors_are_suppressed() {
    let (server, store) = master();

    let missing_value = exec(&server, &store, &["SET", "k"]).await.unwrap_err();
    assert_eq!(missing_value, CommandError::WrongArity("set"));
    assert!(!missing_value.warrants_reply());

    let bad_expiry = exec(&server, &store, &["SET", "k", "v", "PX", "soon"])
        .await
        .unwrap_err();
    assert!(!bad_expiry.warrants_reply());
}

#[tokio::test]
async fn test_unknown_commands_are_suppressed() {
    let (server, store) = master();
    let error = exec(&server, &store, &["FLUSHALL"]).await.unwrap_err();
    assert_eq!(error, CommandError::UnknownCommand("FLUSHALL".to_string()));
    assert!(!error.warrants_reply());
}

#[tokio::test]
async fn test_type_reports_each_kind() {
    let (server, store) = master();
    exec(&server, &store, &["SET", "s", "v"]).await.unwrap();
    exec(&server, &store, &["XADD", "x", "1-1", "f", "v"])
        .await
        .unwrap();

    assert_eq!(
        reply(exec(&server, &store, &["TYPE", "s"]).await),
        "+string\r\n"
    );
    assert_eq!(
        reply(exec(&server, &store, &["TYPE", "x"]).await),
        "+stream\r\n"
    );
    assert_eq!(
        reply(exec(&server, &store, &["TYPE", "nothing"]).await),
        "+none\r\n"
    );
}

#[tokio::test]
async fn test_xadd_answers_the_entry_id() {
    let (server, store) = master();
    assert_eq!(
        reply(exec(&server, &store, &["XADD", "s", "1-1", "f", "v"]).await),
        "$3\r\n1-1\r\n"
    );
}

#[tokio::test]
async fn test_xadd_rejects_non_increasing_ids_with_an_error_reply() {
    let (server, store) = master();
    exec(&server, &store, &["XADD", "s", "1-1"]).await.unwrap();
    exec(&server, &store, &["XADD", "s", "1-2"]).await.unwrap();

    for stale in ["1-2", "1-1", "0-9"] {
        let error = exec(&server, &store, &["XADD", "s", stale])
            .await
            .unwrap_err();
        assert!(error.warrants_reply(), "id {stale} must produce a reply");
        assert_eq!(
            error.to_frame().encode(),
            "-ERR The ID specified in XADD is equal or smaller than the target stream top item\r\n",
            "id {stale}"
        );
    }

    assert_eq!(
        reply(exec(&server, &store, &["XADD", "s", "2-0"]).await),
        "$3\r\n2-0\r\n"
    );
}

#[tokio::test]
async fn test_xadd_auto_sequence() {
    let (server, store) = master();
    exec(&server, &store, &["XADD", "s", "5-1"]).await.unwrap();
    assert_eq!(
        reply(exec(&server, &store, &["XADD", "s", "5-*"]).await),
        "$3\r\n5-2\r\n"
    );
}

#[tokio::test]
async fn test_del_counts_removed_keys() {
    let (server, store) = master();
    exec(&server, &store, &["SET", "a", "1"]).await.unwrap();
    exec(&server, &store, &["SET", "b", "2"]).await.unwrap();

    assert_eq!(
        reply(exec(&server, &store, &["DEL", "a", "b", "missing"]).await),
        ":2\r\n"
    );
    assert_eq!(reply(exec(&server, &store, &["GET", "a"]).await), "$-1\r\n");
}

#[tokio::test]
async fn test_incr_counts_and_rejects_text() {
    let (server, store) = master();
    assert_eq!(
        reply(exec(&server, &store, &["INCR", "counter"]).await),
        ":1\r\n"
    );
    assert_eq!(
        reply(exec(&server, &store, &["INCR", "counter"]).await),
        ":2\r\n"
    );

    exec(&server, &store, &["SET", "text", "mango"])
        .await
        .unwrap();
    let error = exec(&server, &store, &["INCR", "text"]).await.unwrap_err();
    assert_eq!(error, CommandError::NotAnInteger);
    assert!(error.warrants_reply());
}

#[tokio::test]
async fn test_keys_matches_glob_patterns() {
    let (server, store) = master();
    exec(&server, &store, &["SET", "user:1", "a"]).await.unwrap();
    exec(&server, &store, &["SET", "user:2", "b"]).await.unwrap();
    exec(&server, &store, &["SET", "other", "c"]).await.unwrap();

    let bytes = reply(exec(&server, &store, &["KEYS", "user:*"]).await);
    let (frame, _) = RespValue::decode(&bytes).expect("invalid reply");
    let RespValue::Array(mut items) = frame else {
        panic!("expected an array reply");
    };
    items.sort_by_key(|item| format!("{item:?}"));
    assert_eq!(
        items,
        vec![RespValue::bulk("user:1"), RespValue::bulk("user:2")]
    );
}

#[tokio::test]
async fn test_config_get_serves_launch_flags() {
    let (server, store) = server_with_args(&["--dir", "/tmp/data"]);
    assert_eq!(
        reply(exec(&server, &store, &["CONFIG", "GET", "dir"]).await),
        "*2\r\n$3\r\ndir\r\n$9\r\n/tmp/data\r\n"
    );
    assert_eq!(
        reply(exec(&server, &store, &["CONFIG", "GET", "unknown"]).await),
        "$-1\r\n"
    );
}

#[tokio::test]
async fn test_info_replication_on_a_master() {
    let (server, store) = master();
    let bytes = reply(exec(&server, &store, &["INFO", "replication"]).await);
    let (frame, _) = RespValue::decode(&bytes).expect("invalid reply");
    let RespValue::BulkString(body) = frame else {
        panic!("expected a bulk string reply");
    };
    let body = std::str::from_utf8(&body).expect("invalid utf-8");

    assert!(body.contains("role:master\n"), "body was {body:?}");
    assert!(body.contains("master_repl_offset:0\n"), "body was {body:?}");
    let id_line = body
        .lines()
        .find_map(|line| line.strip_prefix("master_replid:"))
        .expect("missing master_replid");
    assert_eq!(id_line.len(), 40);
}

#[tokio::test]
async fn test_info_replication_on_a_replica() {
    let (server, store) = replica();
    let bytes = reply(exec(&server, &store, &["INFO", "replication"]).await);
    let (frame, _) = RespValue::decode(&bytes).expect("invalid reply");
    assert_eq!(frame, RespValue::bulk("role:slave\n"));
}

#[tokio::test]
async fn test_info_without_a_known_section_answers_null() {
    let (server, store) = master();
    assert_eq!(reply(exec(&server, &store, &["INFO"]).await), "$-1\r\n");
}

#[tokio::test]
async fn test_replconf_handshake_steps_answer_ok() {
    let (server, store) = master();
    assert_eq!(
        reply(exec(&server, &store, &["REPLCONF", "listening-port", "6380"]).await),
        "+OK\r\n"
    );
    assert_eq!(
        reply(exec(&server, &store, &["REPLCONF", "capa", "psync2"]).await),
        "+OK\r\n"
    );
}

#[tokio::test]
async fn test_replconf_getack_reports_the_offset() {
    let (server, store) = replica();
    server.write().await.repl_offset = 154;

    assert_eq!(
        reply(exec_from_master(&server, &store, &["REPLCONF", "GETACK", "*"]).await),
        "*3\r\n$8\r\nREPLCONF\r\n$3\r\nACK\r\n$3\r\n154\r\n"
    );
}

#[tokio::test]
async fn test_wait_answers_the_replica_count_without_blocking() {
    let (server, store) = master();
    assert_eq!(
        reply(exec(&server, &store, &["WAIT", "3", "1000"]).await),
        ":0\r\n"
    );
}

#[tokio::test]
async fn test_psync_produces_header_and_snapshot() {
    let (server, store) = master();
    let (header, snapshot) = match exec(&server, &store, &["PSYNC", "?", "-1"]).await.unwrap() {
        CommandResult::FullResync { header, snapshot } => (header, snapshot),
        other => panic!("expected a full resync, got {other:?}"),
    };

    let repl_id = server.read().await.repl_id.clone().unwrap();
    assert_eq!(
        header,
        RespValue::SimpleString(format!("FULLRESYNC {repl_id} 0")).encode()
    );
    assert_eq!(&snapshot[..5], b"$88\r\n");
    assert_eq!(snapshot.len(), 5 + 88);
}

#[tokio::test]
async fn test_replicas_reject_client_writes_but_apply_replicated_ones() {
    let (server, store) = replica();

    let error = exec(&server, &store, &["SET", "k", "v"]).await.unwrap_err();
    assert_eq!(error, CommandError::ReplicaReadOnly);
    assert!(error.warrants_reply());

    exec_from_master(&server, &store, &["SET", "k", "v"])
        .await
        .unwrap();
    assert_eq!(
        reply(exec(&server, &store, &["GET", "k"]).await),
        "$1\r\nv\r\n"
    );
}

#[tokio::test]
async fn test_getack_detection() {
    let getack = Command::from_frame(RespValue::command(&["REPLCONF", "GETACK", "*"])).unwrap();
    assert!(getack.is_getack());

    let other = Command::from_frame(RespValue::command(&["REPLCONF", "capa", "psync2"])).unwrap();
    assert!(!other.is_getack());
}
