//! Blocking byte-stream transport for broker/worker IPC.
//!
//! This is the lowest layer of privsep. A [`PipeStream`] is a connected,
//! reliable, ordered byte stream backed by a Unix domain socket. Everything
//! above it (framing, channels, dispatch) only ever sees `Read + Write`.
//!
//! Connection setup includes a fixed 8-byte hello preamble (see [`hello`])
//! that carries the peer's process id before any framed message flows.

pub mod error;
pub mod hello;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use hello::{recv_hello, send_hello, HELLO_LEN, HELLO_TAG};
pub use stream::PipeStream;

#[cfg(unix)]
pub use uds::PipeListener;
