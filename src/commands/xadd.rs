//! XADD: append an entry to a stream.

use crate::commands::{CommandError, CommandResult};
use crate::resp::RespValue;
use crate::store::Store;
use crate::stream::IdSpec;

pub struct XaddArguments {
    key: String,
    id: IdSpec,
    fields: Vec<(String, String)>,
}

impl XaddArguments {
    /// `XADD key id [field value ...]` — the id may be fully explicit
    /// (`ms-seq`), auto-sequenced (`ms-*`), or fully auto (`*`); field/value
    /// arguments must come in pairs.
    pub fn parse(arguments: &[String]) -> Result<Self, CommandError> {
        if arguments.len() < 2 || arguments.len() % 2 != 0 {
            return Err(CommandError::WrongArity("xadd"));
        }

        let id = IdSpec::parse(&arguments[1])
            .map_err(|error| CommandError::InvalidStreamId(error.to_string()))?;
        let fields = arguments[2..]
            .chunks(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();

        Ok(XaddArguments {
            key: arguments[0].clone(),
            id,
            fields,
        })
    }
}

pub async fn xadd(store: &Store, arguments: &[String]) -> Result<CommandResult, CommandError> {
    let args = XaddArguments::parse(arguments)?;

    let id = store.append_stream(&args.key, args.id, args.fields).await?;
    Ok(CommandResult::reply(RespValue::bulk(id.to_string())))
}
