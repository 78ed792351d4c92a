//! Error types.
//!
//! Protocol outcomes are delivered once through result callbacks as
//! [`CommandError`] or [`TransferError`]. [`LinkError`] covers fallible setup.

/// Errors raised while setting up a link or engine.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Encode error: {0}")]
    Encode(String),
}

/// Terminal failure of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("connection error")]
    ConnectionError,

    #[error("command denied")]
    Denied,

    #[error("command unsupported")]
    Unsupported,

    #[error("command timed out")]
    Timeout,

    #[error("blocking call from the callback thread would deadlock")]
    WouldDeadlock,
}

/// Terminal failure of a mission transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("connection error")]
    ConnectionError,

    #[error("denied")]
    Denied,

    #[error("too many mission items")]
    TooManyMissionItems,

    #[error("timeout")]
    Timeout,

    #[error("unsupported")]
    Unsupported,

    #[error("unsupported frame")]
    UnsupportedFrame,

    #[error("no mission available")]
    NoMissionAvailable,

    #[error("cancelled")]
    Cancelled,

    #[error("mission type not consistent")]
    MissionTypeNotConsistent,

    #[error("invalid sequence")]
    InvalidSequence,

    #[error("current item invalid")]
    CurrentInvalid,

    #[error("protocol error")]
    ProtocolError,

    #[error("invalid param")]
    InvalidParam,

    #[error("busy")]
    Busy,
}

/// Result delivered to mission transfer callbacks.
pub type TransferResult<T> = Result<T, TransferError>;
