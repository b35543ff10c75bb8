use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::store::Store;

pub async fn incr(store: &Store, arguments: &[String]) -> Result<CommandResult, CommandError> {
    let [key] = arguments else {
        return Err(CommandError::WrongArity("incr"));
    };

    let value = store.incr(key).await?;
    Ok(CommandResult::reply(RespValue::Integer(value)))
}
