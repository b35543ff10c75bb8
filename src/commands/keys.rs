use globset::Glob;

use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::store::Store;

pub async fn keys(store: &Store, arguments: &[String]) -> Result<CommandResult, CommandError> {
    let [pattern] = arguments else {
        return Err(CommandError::WrongArity("keys"));
    };

    let matcher = Glob::new(pattern)
        .map_err(|error| CommandError::InvalidGlobPattern(error.to_string()))?
        .compile_matcher();

    let matched = store
        .keys(&matcher)
        .await
        .into_iter()
        .map(RespValue::bulk)
        .collect();

    Ok(CommandResult::reply(RespValue::Array(matched)))
}
