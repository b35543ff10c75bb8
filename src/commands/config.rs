use std::sync::Arc;

use tokio::sync::RwLock;

use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::server::RedisServer;

/// `CONFIG GET name` answers `[name, value]` from the launch-flag config
/// map, or the null bulk string for an unknown name. Other CONFIG
/// subcommands are not supported and also answer null.
pub async fn config(
    server: &Arc<RwLock<RedisServer>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    if arguments.len() < 2 {
        return Err(CommandError::WrongArity("config"));
    }
    if !arguments[0].eq_ignore_ascii_case("GET") {
        return Ok(CommandResult::reply(RespValue::NullBulkString));
    }

    let name = &arguments[1];
    let server = server.read().await;
    let reply = match server.config.get(name) {
        Some(value) => RespValue::Array(vec![RespValue::bulk(name), RespValue::bulk(value)]),
        None => RespValue::NullBulkString,
    };

    Ok(CommandResult::reply(reply))
}
