use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;

pub fn ping(arguments: &[String]) -> Result<CommandResult, CommandError> {
    if !arguments.is_empty() {
        return Err(CommandError::WrongArity("ping"));
    }

    Ok(CommandResult::reply(RespValue::SimpleString(
        "PONG".to_string(),
    )))
}
