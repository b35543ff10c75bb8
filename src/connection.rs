//! Per-connection read-decode-dispatch-write loop.
//!
//! One handler task runs per accepted socket, plus one on the outbound
//! socket a replica keeps to its master. The `from_master` flag makes that
//! link asymmetric: replicated commands are applied silently, and only a
//! `REPLCONF GETACK` probe is ever answered back to the master.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::commands::{self, Command, CommandResult};
use crate::replication;
use crate::resp::{self, RespError, RespValue};
use crate::server::RedisServer;
use crate::store::Store;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed mid-frame")]
    UnexpectedEof,
    #[error("unexpected reply during replication sync: {0}")]
    UnexpectedSyncReply(String),
}

/// A framed TCP connection.
///
/// The write half is behind a shared handle so that a master can keep
/// writing to a socket it promoted to a replica while the read loop stays in
/// place.
pub struct Connection {
    reader: OwnedReadHalf,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    buffer: BytesMut,
    peer: String,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|address| address.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (reader, writer) = stream.into_split();
        Connection {
            reader,
            writer: Arc::new(Mutex::new(writer)),
            buffer: BytesMut::with_capacity(4096),
            peer,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn writer_handle(&self) -> Arc<Mutex<OwnedWriteHalf>> {
        Arc::clone(&self.writer)
    }

    /// Reads the next complete frame, retaining any unconsumed suffix for
    /// the following call. Returns `None` on a clean EOF.
    ///
    /// A malformed buffer is logged and discarded wholesale; the connection
    /// stays open and parsing resumes with the next read.
    pub async fn read_frame(&mut self) -> Result<Option<(RespValue, usize)>, ConnectionError> {
        loop {
            match RespValue::decode(&self.buffer) {
                Ok((frame, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(Some((frame, consumed)));
                }
                Err(RespError::Incomplete) => {}
                Err(error) => {
                    warn!(peer = %self.peer, %error, "discarding unparseable input");
                    self.buffer.clear();
                }
            }

            if self.fill().await? == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::UnexpectedEof)
                };
            }
        }
    }

    /// Reads the inline RDB snapshot frame (`$<len>\r\n<bytes>`, no trailing
    /// CRLF) that a master sends right after FULLRESYNC.
    pub async fn read_snapshot(&mut self) -> Result<Option<(bytes::Bytes, usize)>, ConnectionError> {
        loop {
            match resp::decode_rdb(&self.buffer) {
                Ok((content, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(Some((content, consumed)));
                }
                Err(RespError::Incomplete) => {}
                Err(error) => {
                    warn!(peer = %self.peer, %error, "discarding unparseable snapshot bytes");
                    self.buffer.clear();
                }
            }

            if self.fill().await? == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::UnexpectedEof)
                };
            }
        }
    }

    pub async fn write_all(&self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn fill(&mut self) -> std::io::Result<usize> {
        self.reader.read_buf(&mut self.buffer).await
    }
}

/// Drives one connection until EOF or an unrecoverable socket error.
pub async fn handle_connection(
    mut connection: Connection,
    server: Arc<RwLock<RedisServer>>,
    store: Arc<Store>,
    from_master: bool,
) {
    let peer = connection.peer().to_string();

    if from_master {
        if let Err(error) = await_full_resync(&mut connection).await {
            warn!(peer = %peer, %error, "lost master link during sync");
            return;
        }
    }

    let mut registered_replica = false;

    loop {
        let (frame, consumed) = match connection.read_frame().await {
            Ok(Some(next)) => next,
            Ok(None) => {
                debug!(peer = %peer, "connection closed");
                break;
            }
            Err(error) => {
                warn!(peer = %peer, %error, "connection failed");
                break;
            }
        };

        let command = match Command::from_frame(frame) {
            Ok(command) => command,
            Err(error) => {
                debug!(peer = %peer, %error, "ignoring invalid command frame");
                if from_master {
                    advance_offset(&server, consumed).await;
                }
                continue;
            }
        };

        // The one command a replica must answer on its master link.
        let must_answer_master = command.is_getack();

        match commands::dispatch(command, &server, &store, from_master).await {
            Ok(CommandResult::Response(reply)) => {
                if !from_master || must_answer_master {
                    if let Err(error) = connection.write_all(&reply).await {
                        warn!(peer = %peer, %error, "failed to write reply");
                        break;
                    }
                }
            }
            Ok(CommandResult::NoResponse) => {}
            Ok(CommandResult::FullResync { header, snapshot }) => {
                let sent = async {
                    connection.write_all(&header).await?;
                    connection.write_all(&snapshot).await
                }
                .await;
                match sent {
                    Ok(()) => {
                        replication::register_replica(
                            &server,
                            peer.clone(),
                            connection.writer_handle(),
                        )
                        .await;
                        registered_replica = true;
                    }
                    Err(error) => {
                        warn!(peer = %peer, %error, "failed to stream snapshot");
                        break;
                    }
                }
            }
            Err(error) if error.warrants_reply() && !from_master => {
                let reply = error.to_frame().encode();
                if let Err(error) = connection.write_all(&reply).await {
                    warn!(peer = %peer, %error, "failed to write error reply");
                    break;
                }
            }
            Err(error) => {
                debug!(peer = %peer, %error, "command produced no reply");
            }
        }

        // The offset a GETACK just reported must not include the GETACK
        // frame itself, so accounting happens after the reply.
        if from_master {
            advance_offset(&server, consumed).await;
        }
    }

    if registered_replica {
        replication::remove_replica(&server, &peer).await;
    }
}

/// Consumes the `+FULLRESYNC <id> <offset>` reply and the RDB snapshot frame
/// that follow the handshake's PSYNC, leaving the link at the start of the
/// replicated command stream.
async fn await_full_resync(connection: &mut Connection) -> Result<(), ConnectionError> {
    match connection.read_frame().await? {
        Some((RespValue::SimpleString(reply), _)) if reply.starts_with("FULLRESYNC") => {
            debug!(reply = %reply, "full resync started");
        }
        Some((frame, _)) => {
            return Err(ConnectionError::UnexpectedSyncReply(format!("{frame:?}")));
        }
        None => return Err(ConnectionError::UnexpectedEof),
    }

    match connection.read_snapshot().await? {
        Some((content, _)) => {
            info!(bytes = content.len(), "snapshot received");
            Ok(())
        }
        None => Err(ConnectionError::UnexpectedEof),
    }
}

async fn advance_offset(server: &Arc<RwLock<RedisServer>>, consumed: usize) {
    server.write().await.repl_offset += consumed as u64;
}
