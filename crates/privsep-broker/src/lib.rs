//! Privilege-separated broker/worker sessions.
//!
//! The broker is the high-privilege side: it binds the listening socket,
//! launches the worker with `--ipc=<path>` appended to its command line,
//! and services each accepted connection on its own thread. The worker is
//! the low-privilege side: everything privileged it wants done travels as a
//! typed message, and the broker checks its [`policy::PolicyTable`] before
//! acting. Denials come back as statuses, not dropped connections.

pub mod broker;
pub mod error;
pub mod messages;
pub mod policy;
pub mod worker;

pub use broker::Broker;
pub use error::{Result, SessionError};
pub use policy::{Capability, PolicyTable};
pub use worker::{ipc_path_from_args, Worker};
