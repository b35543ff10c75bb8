use thiserror::Error;

use crate::resp::RespValue;
use crate::store::StoreError;

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("client input must be an array of bulk strings")]
    NotAnArray,
    #[error("empty command array")]
    EmptyCommand,
    #[error("command arguments must be bulk strings")]
    InvalidArgument,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),
    #[error("invalid expire time in 'set' command")]
    InvalidExpiration,
    #[error("unsupported option '{0}' in 'set' command")]
    UnsupportedOption(String),
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("{0}")]
    InvalidStreamId(String),
    #[error("invalid glob pattern: {0}")]
    InvalidGlobPattern(String),
    #[error("write commands are not allowed against a replica")]
    ReplicaReadOnly,
    #[error("PSYNC can only be served by a master")]
    NotAMaster,
    #[error("Invalid PSYNC replication ID")]
    InvalidReplicationId,
    #[error("Invalid PSYNC offset")]
    InvalidOffset,
}

impl CommandError {
    /// Whether this error goes back to the client as a RESP error frame.
    /// Unknown commands and malformed argument lists are logged and
    /// suppressed instead.
    pub fn warrants_reply(&self) -> bool {
        matches!(
            self,
            CommandError::NotAnInteger
                | CommandError::WrongType
                | CommandError::InvalidStreamId(_)
                | CommandError::InvalidGlobPattern(_)
                | CommandError::ReplicaReadOnly
                | CommandError::NotAMaster
                | CommandError::InvalidReplicationId
                | CommandError::InvalidOffset
        )
    }

    pub fn to_frame(&self) -> RespValue {
        let prefix = match self {
            CommandError::WrongType => "WRONGTYPE",
            _ => "ERR",
        };
        RespValue::Error(format!("{prefix} {self}"))
    }
}

impl From<StoreError> for CommandError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::WrongType => CommandError::WrongType,
            StoreError::NotAnInteger => CommandError::NotAnInteger,
            StoreError::Stream(inner) => CommandError::InvalidStreamId(inner.to_string()),
        }
    }
}
