use std::path::PathBuf;

/// Errors that can occur at the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the listening endpoint.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the listening endpoint.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the connected stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The endpoint path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The hello preamble's literal tag did not match.
    #[error("bad hello preamble tag {found:02x?} (expected {expected:02x?})")]
    BadHello { found: [u8; 4], expected: [u8; 4] },

    /// The stream closed before the full hello preamble arrived.
    #[error("connection closed during hello preamble")]
    HelloClosed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
