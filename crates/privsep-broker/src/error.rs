use std::path::PathBuf;

use privsep_channel::ChannelError;
use privsep_transport::TransportError;
use privsep_wire::TypeError;

/// Errors that can occur while running a broker/worker session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("failed to spawn worker {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// The worker command line carries no `--ipc=<path>` argument.
    #[error("no --ipc=<path> argument in command line")]
    MissingIpcArg,

    /// The peer answered with a different message id than the request expects.
    #[error("unexpected reply: wanted message {wanted}, got {got}")]
    UnexpectedReply { wanted: u32, got: u32 },

    /// A reply carried the wrong number of arguments.
    #[error("reply to message {msg_id} has {got} arguments, expected {expected}")]
    ReplyArity {
        msg_id: u32,
        expected: usize,
        got: usize,
    },

    /// A reply argument does not hold the type the protocol promises.
    #[error("malformed reply: {0}")]
    BadReply(#[from] TypeError),

    /// A reply field that must carry a value was null.
    #[error("reply to message {msg_id} carries a null field")]
    NullReplyField { msg_id: u32 },
}

pub type Result<T> = std::result::Result<T, SessionError>;
