use std::time::Duration;

use tokio::time::Instant;

use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::store::{DataType, Store};

pub struct SetArguments {
    key: String,
    value: String,
    expiration: Option<Instant>,
}

impl SetArguments {
    /// Accepts `SET key value` and `SET key value PX <milliseconds>`. The
    /// deadline is captured here, at parse time.
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() != 2 && arguments.len() != 4 {
            return Err(CommandError::WrongArity("set"));
        }

        let mut expiration = None;
        if arguments.len() == 4 {
            if !arguments[2].eq_ignore_ascii_case("px") {
                return Err(CommandError::UnsupportedOption(arguments[2].clone()));
            }
            let milliseconds = arguments[3]
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidExpiration)?;
            expiration = Some(Instant::now() + Duration::from_millis(milliseconds));
        }

        Ok(SetArguments {
            key: arguments[0].clone(),
            value: arguments[1].clone(),
            expiration,
        })
    }
}

pub async fn set(store: &Store, arguments: &[String]) -> Result<CommandResult, CommandError> {
    let args = SetArguments::parse(arguments)?;
    store
        .set(args.key, DataType::String(args.value), args.expiration)
        .await;

    Ok(CommandResult::reply(RespValue::SimpleString(
        "OK".to_string(),
    )))
}
