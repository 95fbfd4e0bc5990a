use thiserror::Error;

/// A malformed frame on the wire. Always fatal to the connection it was read
/// from — the caller sends a best-effort error reply and closes the socket.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown frame prefix {0:#x}")]
    UnknownPrefix(u8),

    #[error("invalid length line")]
    InvalidLength,

    #[error("bulk or array length out of range")]
    LengthOutOfRange,

    #[error("expected CRLF terminator")]
    MissingTerminator,

    #[error("unbalanced inline quotes")]
    UnbalancedQuotes,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
