use privsep_wire::{TypeError, WireError};

/// Errors that can occur while moving messages across a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A frame failed to encode or decode.
    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    /// The underlying stream failed.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A handler asked a received argument for a type it does not hold.
    #[error("bad argument: {0}")]
    BadArgument(#[from] TypeError),

    /// A handler stopped the receive loop with a failure code.
    #[error("dispatch failed with code {code}")]
    Dispatch { code: u32 },
}

pub type Result<T> = std::result::Result<T, ChannelError>;
