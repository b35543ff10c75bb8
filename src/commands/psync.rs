//! PSYNC: the synchronization request that turns an inbound connection into
//! a replica.
//!
//! The reply is `+FULLRESYNC <replid> <offset>` followed by the empty-RDB
//! snapshot frame. The connection handler writes both and then registers the
//! socket in the node's replica list.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::commands::{CommandError, CommandResult};
use crate::replication;
use crate::resp::{self, RespValue};
use crate::server::RedisServer;

pub struct PsyncArguments {
    repl_id: String,
    #[allow(dead_code)]
    offset: i64,
}

impl PsyncArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        let [repl_id, offset] = arguments else {
            return Err(CommandError::WrongArity("psync"));
        };
        let offset = offset
            .parse::<i64>()
            .map_err(|_| CommandError::InvalidOffset)?;

        Ok(PsyncArguments {
            repl_id: repl_id.clone(),
            offset,
        })
    }
}

pub async fn psync(
    server: &Arc<RwLock<RedisServer>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let args = PsyncArguments::parse(arguments)?;

    let server = server.read().await;
    let Some(repl_id) = server.repl_id.as_deref() else {
        return Err(CommandError::NotAMaster);
    };
    if args.repl_id != "?" && args.repl_id != repl_id {
        return Err(CommandError::InvalidReplicationId);
    }

    let header = RespValue::SimpleString(format!("FULLRESYNC {} {}", repl_id, server.repl_offset));
    Ok(CommandResult::FullResync {
        header: header.encode(),
        snapshot: resp::encode_rdb(&replication::empty_rdb()),
    })
}
