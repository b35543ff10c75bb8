//! Master/replica replication: the replica-side handshake and the
//! master-side fanout of write commands.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionError};
use crate::resp::RespValue;
use crate::server::{RedisServer, Replica};

/// An empty-database RDB v11 snapshot; the only persistence artifact this
/// server ever produces, sent verbatim to every replica that completes a
/// PSYNC.
pub const EMPTY_RDB_HEX: &str = "524544495330303131fa0972656469732d76657205372e322e30fa0a72656469732d62697473c040fa056374696d65c26d08bc65fa08757365642d6d656dc2b0c41000fa08616f662d62617365c000fff06e3bfec0ff5aa2";

pub fn empty_rdb() -> Bytes {
    Bytes::from(hex::decode(EMPTY_RDB_HEX).expect("embedded snapshot constant is valid hex"))
}

/// Drives the replica side of the replication handshake:
///
/// 1. `PING`, expect `+PONG`
/// 2. `REPLCONF listening-port <port>`, expect `+OK`
/// 3. `REPLCONF capa psync2`, expect `+OK`
/// 4. `PSYNC ? -1`
///
/// The `+FULLRESYNC` reply and the snapshot that follow are consumed by the
/// connection handler, which then keeps applying the replicated stream.
pub async fn handshake(
    connection: &mut Connection,
    listening_port: u16,
) -> Result<(), ConnectionError> {
    let reply = exchange(connection, &["PING"]).await?;
    expect_simple(&reply, "PONG")?;

    let port = listening_port.to_string();
    let reply = exchange(connection, &["REPLCONF", "listening-port", &port]).await?;
    expect_simple(&reply, "OK")?;

    let reply = exchange(connection, &["REPLCONF", "capa", "psync2"]).await?;
    expect_simple(&reply, "OK")?;

    connection
        .write_all(&RespValue::command(&["PSYNC", "?", "-1"]).encode())
        .await?;

    Ok(())
}

async fn exchange(
    connection: &mut Connection,
    parts: &[&str],
) -> Result<RespValue, ConnectionError> {
    connection
        .write_all(&RespValue::command(parts).encode())
        .await?;
    match connection.read_frame().await? {
        Some((frame, _)) => Ok(frame),
        None => Err(ConnectionError::UnexpectedEof),
    }
}

fn expect_simple(frame: &RespValue, expected: &str) -> Result<(), ConnectionError> {
    match frame {
        RespValue::SimpleString(text) if text == expected => Ok(()),
        other => Err(ConnectionError::UnexpectedSyncReply(format!("{other:?}"))),
    }
}

/// Adds a freshly synchronized replica to the node record. Only a completed
/// PSYNC ever calls this.
pub async fn register_replica(
    server: &Arc<RwLock<RedisServer>>,
    address: String,
    writer: Arc<Mutex<OwnedWriteHalf>>,
) {
    info!(replica = %address, "replica synchronized");
    server
        .write()
        .await
        .replicas
        .push(Replica { address, writer });
}

pub async fn remove_replica(server: &Arc<RwLock<RedisServer>>, address: &str) {
    let mut server = server.write().await;
    server.replicas.retain(|replica| replica.address != address);
    debug!(replica = %address, "replica deregistered");
}

/// Re-sends a write command to every connected replica, best-effort.
///
/// The replica list is snapshotted under the node lock and the socket writes
/// happen outside it, so one slow replica cannot stall the node record. A
/// replica whose socket write fails is dropped from the list; that lazy
/// detection is the only health check.
pub async fn propagate(server: &Arc<RwLock<RedisServer>>, frame: &RespValue) {
    let targets: Vec<(String, Arc<Mutex<OwnedWriteHalf>>)> = {
        let server = server.read().await;
        server
            .replicas
            .iter()
            .map(|replica| (replica.address.clone(), Arc::clone(&replica.writer)))
            .collect()
    };
    if targets.is_empty() {
        return;
    }

    let bytes = frame.encode();
    let mut failed = Vec::new();
    for (address, writer) in targets {
        let mut writer = writer.lock().await;
        let written = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;
        if let Err(error) = written {
            warn!(replica = %address, %error, "dropping replica after failed write");
            failed.push(address);
        }
    }

    if !failed.is_empty() {
        let mut server = server.write().await;
        server
            .replicas
            .retain(|replica| !failed.contains(&replica.address));
    }
}
