use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by the buffer, stream, packet, and connection layers.
///
/// `Buffer*` variants are recoverable at the call site (a failed read
/// leaves the buffer's position unchanged); everything else is either
/// fatal to the connection (`PacketRead`, `Eof`, `Io`) or reflects a
/// problem the caller must fix (`Login`, `Command`, `Programming`).
#[derive(Debug, Error)]
pub enum Error {
    #[error("buffer overflow: {requested} bytes requested, {available} available")]
    BufferOverflow { requested: usize, available: usize },

    #[error("buffer underflow: {requested} bytes requested, {available} available")]
    BufferUnderflow { requested: usize, available: usize },

    #[error("invalid buffer argument: {0}")]
    BufferInvalidArgument(String),

    #[error("packet read error: {0}")]
    PacketRead(String),

    #[error("peer closed the connection")]
    Eof,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("login failed: {0}")]
    Login(String),

    #[error("{message} (error {code}, state {sql_state})")]
    Command {
        code: u16,
        sql_state: String,
        message: String,
    },

    #[error("programming error: {0}")]
    Programming(String),
}

impl Error {
    pub fn programming(msg: impl Into<String>) -> Self {
        Self::Programming(msg.into())
    }
}
