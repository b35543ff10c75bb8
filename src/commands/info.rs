use std::sync::Arc;

use tokio::sync::RwLock;

use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::server::{RedisRole, RedisServer};

/// `INFO replication` reports the role line, and for masters the
/// replication id and offset. Any other section answers the null bulk
/// string.
pub async fn info(
    server: &Arc<RwLock<RedisServer>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    if arguments.first().map(String::as_str) != Some("replication") {
        return Ok(CommandResult::reply(RespValue::NullBulkString));
    }

    let server = server.read().await;
    let mut body = format!("role:{}\n", server.role.as_str());
    if server.role == RedisRole::Master {
        let repl_id = server.repl_id.as_deref().unwrap_or_default();
        body.push_str(&format!(
            "master_replid:{}\nmaster_repl_offset:{}\n",
            repl_id, server.repl_offset
        ));
    }

    Ok(CommandResult::reply(RespValue::bulk(body)))
}
