//! REPLCONF: replication configuration exchanged during and after the
//! handshake.
//!
//! `listening-port` and `capa` are acknowledged with `+OK`. `GETACK *` is
//! answered with the node's current offset; the connection handler makes
//! sure that answer goes out even when the probe arrives over the master
//! link, where every other reply is suppressed.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::server::RedisServer;

pub async fn replconf(
    server: &Arc<RwLock<RedisServer>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let Some(subcommand) = arguments.first() else {
        return Err(CommandError::WrongArity("replconf"));
    };

    match subcommand.to_lowercase().as_str() {
        "listening-port" | "capa" => Ok(CommandResult::reply(RespValue::SimpleString(
            "OK".to_string(),
        ))),
        "getack" => {
            let offset = server.read().await.repl_offset;
            Ok(CommandResult::reply(RespValue::Array(vec![
                RespValue::bulk("REPLCONF"),
                RespValue::bulk("ACK"),
                RespValue::bulk(offset.to_string()),
            ])))
        }
        _ => Ok(CommandResult::NoResponse),
    }
}
