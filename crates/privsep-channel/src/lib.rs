//! Blocking message channel over any byte stream, plus typed dispatch.
//!
//! A [`Channel`] owns one transport stream and moves whole messages across
//! it: `send` encodes and writes one frame, `receive` blocks until one
//! complete frame has arrived and hands the decoded message to a
//! [`Handler`]. Handlers may send on the same channel while handling, which
//! is how request/reply exchanges nest.
//!
//! [`MsgIn`] and [`DispatchTable`] recover typed arguments before any
//! handler logic runs, so a mistyped or miscounted argument list is caught
//! at the boundary.

pub mod channel;
pub mod dispatch;
pub mod error;

pub use channel::Channel;
pub use dispatch::{DispatchTable, Disposition, ErrorPolicy, Handler, MsgIn};
pub use error::{ChannelError, Result};
