use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::store::Store;

pub async fn type_of(store: &Store, arguments: &[String]) -> Result<CommandResult, CommandError> {
    let [key] = arguments else {
        return Err(CommandError::WrongArity("type"));
    };

    let kind = store.type_of(key).await;
    Ok(CommandResult::reply(RespValue::SimpleString(
        kind.to_string(),
    )))
}
