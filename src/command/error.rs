use thiserror::Error;

/// Every command-level failure, rendered as a RESP error frame. Messages
/// follow the `CODE message` convention (`ERR`, `WRONGTYPE`, ...) so clients
/// written against real Redis error prefixes keep working.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR invalid expire time")]
    InvalidExpireTime,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR auth is not correct")]
    AuthFailed,

    #[error("ERR Client sent AUTH, but no password is set")]
    AuthNotSet,

    #[error("ERR unknown INFO section '{0}'")]
    UnknownSection(String),
}

impl From<ReplyError> for crate::resp::Value {
    fn from(error: ReplyError) -> Self {
        crate::resp::Value::error(error.to_string())
    }
}
