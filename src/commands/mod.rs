//! Command parsing and name-based dispatch.
//!
//! Every client command arrives as a RESP array of bulk strings; the first
//! element, case-folded to upper, names the command. Handlers produce
//! RESP-encoded reply bytes; whether those bytes are actually written is the
//! connection handler's decision (replicas stay silent on the master link).

mod config;
mod del;
mod echo;
mod error;
mod get;
mod incr;
mod info;
mod keys;
mod ping;
mod psync;
mod replconf;
mod set;
mod type_command;
mod wait;
mod xadd;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

pub use error::CommandError;

use crate::replication;
use crate::resp::RespValue;
use crate::server::{RedisRole, RedisServer};
use crate::store::Store;

/// Commands that mutate the store; these are fanned out to replicas and
/// rejected on replicas when they arrive from ordinary clients.
pub const WRITE_COMMANDS: &[&str] = &["SET", "DEL", "INCR", "XADD"];

/// What a handler asks the connection to do with its outcome.
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Write these reply bytes (subject to the master-link gating).
    Response(Bytes),
    /// Write nothing.
    NoResponse,
    /// Write the FULLRESYNC header and the snapshot, then promote the
    /// connection to a replica.
    FullResync { header: Bytes, snapshot: Bytes },
}

impl CommandResult {
    fn reply(frame: RespValue) -> Self {
        CommandResult::Response(frame.encode())
    }
}

/// A parsed command: its upper-cased name, its textual arguments, and the
/// original frame (kept for verbatim re-encoding during fanout).
#[derive(Debug, PartialEq, Clone)]
pub struct Command {
    pub name: String,
    pub arguments: Vec<String>,
    frame: RespValue,
}

impl Command {
    pub fn from_frame(frame: RespValue) -> Result<Self, CommandError> {
        let RespValue::Array(elements) = &frame else {
            return Err(CommandError::NotAnArray);
        };
        if elements.is_empty() {
            return Err(CommandError::EmptyCommand);
        }

        let mut parts = Vec::with_capacity(elements.len());
        for element in elements {
            let RespValue::BulkString(bytes) = element else {
                return Err(CommandError::InvalidArgument);
            };
            let text = std::str::from_utf8(bytes).map_err(|_| CommandError::InvalidArgument)?;
            parts.push(text.to_string());
        }

        let mut arguments = parts;
        let name = arguments.remove(0).to_uppercase();
        Ok(Command {
            name,
            arguments,
            frame,
        })
    }

    /// The original wire frame this command was parsed from.
    pub fn frame(&self) -> &RespValue {
        &self.frame
    }

    pub fn is_write(&self) -> bool {
        WRITE_COMMANDS.contains(&self.name.as_str())
    }

    /// `REPLCONF GETACK` is the only command a replica answers on the socket
    /// it keeps to its master.
    pub fn is_getack(&self) -> bool {
        self.name == "REPLCONF"
            && self
                .arguments
                .first()
                .is_some_and(|sub| sub.eq_ignore_ascii_case("GETACK"))
    }
}

/// Routes a command to its handler and, for write commands handled by a
/// master, fans the original frame out to the connected replicas.
///
/// `from_master` marks commands replayed over the replication link; those
/// bypass the replica's read-only guard.
pub async fn dispatch(
    command: Command,
    server: &Arc<RwLock<RedisServer>>,
    store: &Arc<Store>,
    from_master: bool,
) -> Result<CommandResult, CommandError> {
    if command.is_write() && !from_master {
        let server = server.read().await;
        if matches!(server.role, RedisRole::Replica { .. }) {
            return Err(CommandError::ReplicaReadOnly);
        }
    }

    let result = match command.name.as_str() {
        "PING" => ping::ping(&command.arguments),
        "ECHO" => echo::echo(&command.arguments),
        "GET" => get::get(store, &command.arguments).await,
        "SET" => set::set(store, &command.arguments).await,
        "DEL" => del::del(store, &command.arguments).await,
        "INCR" => incr::incr(store, &command.arguments).await,
        "KEYS" => keys::keys(store, &command.arguments).await,
        "TYPE" => type_command::type_of(store, &command.arguments).await,
        "XADD" => xadd::xadd(store, &command.arguments).await,
        "CONFIG" => config::config(server, &command.arguments).await,
        "INFO" => info::info(server, &command.arguments).await,
        "REPLCONF" => replconf::replconf(server, &command.arguments).await,
        "PSYNC" => psync::psync(server, &command.arguments).await,
        "WAIT" => wait::wait(server, &command.arguments).await,
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }?;

    if command.is_write() {
        let is_master = matches!(server.read().await.role, RedisRole::Master);
        if is_master {
            replication::propagate(server, command.frame()).await;
        }
    }

    Ok(result)
}
