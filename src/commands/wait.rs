use std::sync::Arc;

use tokio::sync::RwLock;

use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::server::RedisServer;

pub struct WaitArguments {
    #[allow(dead_code)]
    numreplicas: usize,
    #[allow(dead_code)]
    timeout_ms: u64,
}

impl WaitArguments {
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        let [numreplicas, timeout_ms] = arguments else {
            return Err(CommandError::WrongArity("wait"));
        };

        Ok(WaitArguments {
            numreplicas: numreplicas
                .parse::<usize>()
                .map_err(|_| CommandError::NotAnInteger)?,
            timeout_ms: timeout_ms
                .parse::<u64>()
                .map_err(|_| CommandError::NotAnInteger)?,
        })
    }
}

/// WAIT answers the current replica count immediately; it never blocks for
/// acknowledgements.
pub async fn wait(
    server: &Arc<RwLock<RedisServer>>,
    arguments: &[String],
) -> Result<CommandResult, CommandError> {
    let _ = WaitArguments::parse(arguments)?;

    let count = server.read().await.replicas.len();
    Ok(CommandResult::reply(RespValue::Integer(count as i64)))
}
