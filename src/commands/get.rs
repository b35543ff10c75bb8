use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::store::{DataType, Store};

pub async fn get(store: &Store, arguments: &[String]) -> Result<CommandResult, CommandError> {
    let [key] = arguments else {
        return Err(CommandError::WrongArity("get"));
    };

    let reply = match store.get(key).await {
        None => RespValue::NullBulkString,
        Some(entry) => match entry.data {
            DataType::String(value) => RespValue::bulk(value),
            DataType::Stream(_) => return Err(CommandError::WrongType),
        },
    };

    Ok(CommandResult::reply(reply))
}
