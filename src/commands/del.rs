use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::store::Store;

pub async fn del(store: &Store, arguments: &[String]) -> Result<CommandResult, CommandError> {
    if arguments.is_empty() {
        return Err(CommandError::WrongArity("del"));
    }

    let mut removed = 0;
    for key in arguments {
        if store.delete(key).await {
            removed += 1;
        }
    }

    Ok(CommandResult::reply(RespValue::Integer(removed)))
}
