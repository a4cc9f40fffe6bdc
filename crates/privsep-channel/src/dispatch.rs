//! Typed message dispatch.
//!
//! Incoming messages reach handler logic only after two checks: the
//! argument count must match what the handler registered, and every typed
//! getter must find the tag it asks for. Either failure is routed through
//! an overridable hook instead of reaching the handler body, so malformed
//! input from a peer can be rejected or ignored by policy.

use std::io::{Read, Write};
use std::marker::PhantomData;

use privsep_wire::{Message, TypeError, WireValue};

use crate::channel::Channel;
use crate::error::{ChannelError, Result};

/// What the receive loop should do after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep receiving.
    Continue,
    /// Stop receiving; the exchange reached its goal.
    Ready,
    /// Stop receiving with a failure code.
    Fail(u32),
}

/// How a dispatcher treats a message whose arguments do not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Route the error through the handler hooks, which fail by default.
    #[default]
    Fatal,
    /// Log and keep receiving, as if the message had not arrived.
    Ignore,
}

/// Receives decoded messages from a channel.
///
/// `on_message` gets the channel back so replies can be sent from inside
/// the handler. The error hooks have logging defaults that stop the loop;
/// override them to tolerate a misbehaving peer.
pub trait Handler<T: Read + Write> {
    fn on_message(&mut self, channel: &mut Channel<T>, msg: &Message) -> Result<Disposition>;

    /// Called for a message id nothing is registered for.
    fn on_bad_message(&mut self, msg_id: u32) -> Disposition {
        tracing::warn!(msg_id, "message has no handler");
        Disposition::Fail(msg_id)
    }

    /// Called when a message carries the wrong number of arguments.
    fn on_arg_count_error(&mut self, msg_id: u32, expected: usize, got: usize) -> Disposition {
        tracing::warn!(msg_id, expected, got, "argument count mismatch");
        Disposition::Fail(msg_id)
    }

    /// Called when an argument does not hold the type the handler asked for.
    fn on_arg_convert_error(&mut self, msg_id: u32, err: TypeError) -> Disposition {
        tracing::warn!(msg_id, %err, "argument type mismatch");
        Disposition::Fail(msg_id)
    }
}

/// A handler for exactly one message id with a fixed argument count.
///
/// The body sees the argument list only after the count check passed; a
/// `TypeError` surfacing from the body (via `?` on a `recover_*` getter)
/// is routed to the convert-error hook rather than propagated raw.
pub struct MsgIn<T, F> {
    msg_id: u32,
    arity: usize,
    policy: ErrorPolicy,
    body: F,
    _stream: PhantomData<fn(&mut Channel<T>)>,
}

impl<T, F> MsgIn<T, F>
where
    T: Read + Write,
    F: FnMut(&mut Channel<T>, &[WireValue]) -> Result<Disposition>,
{
    pub fn new(msg_id: u32, arity: usize, body: F) -> Self {
        Self {
            msg_id,
            arity,
            policy: ErrorPolicy::Fatal,
            body,
            _stream: PhantomData,
        }
    }

    pub fn with_policy(msg_id: u32, arity: usize, policy: ErrorPolicy, body: F) -> Self {
        Self {
            msg_id,
            arity,
            policy,
            body,
            _stream: PhantomData,
        }
    }
}

impl<T, F> Handler<T> for MsgIn<T, F>
where
    T: Read + Write,
    F: FnMut(&mut Channel<T>, &[WireValue]) -> Result<Disposition>,
{
    fn on_message(&mut self, channel: &mut Channel<T>, msg: &Message) -> Result<Disposition> {
        if msg.msg_id != self.msg_id {
            return Ok(self.on_bad_message(msg.msg_id));
        }
        let (arity, policy) = (self.arity, self.policy);
        if msg.args.len() != arity {
            return Ok(match policy {
                ErrorPolicy::Fatal => self.on_arg_count_error(msg.msg_id, arity, msg.args.len()),
                ErrorPolicy::Ignore => {
                    tracing::debug!(
                        msg_id = msg.msg_id,
                        expected = arity,
                        got = msg.args.len(),
                        "ignoring argument count mismatch"
                    );
                    Disposition::Continue
                }
            });
        }
        match (self.body)(channel, &msg.args) {
            Err(ChannelError::BadArgument(err)) => Ok(match policy {
                ErrorPolicy::Fatal => self.on_arg_convert_error(msg.msg_id, err),
                ErrorPolicy::Ignore => {
                    tracing::debug!(msg_id = msg.msg_id, %err, "ignoring argument type mismatch");
                    Disposition::Continue
                }
            }),
            other => other,
        }
    }
}

type BoxedBody<T> = Box<dyn FnMut(&mut Channel<T>, &[WireValue]) -> Result<Disposition>>;

struct Entry<T> {
    msg_id: u32,
    arity: usize,
    policy: ErrorPolicy,
    body: BoxedBody<T>,
}

/// Routes messages to per-id handlers, with a catch-all for the rest.
///
/// Registration order does not matter; message ids must be unique per
/// table, and registering a second handler for an id panics. Without an
/// explicit catch-all an unregistered id goes through
/// [`Handler::on_bad_message`] and stops the loop.
pub struct DispatchTable<T> {
    entries: Vec<Entry<T>>,
    catch_all: Option<Box<dyn FnMut(u32) -> Disposition>>,
}

impl<T: Read + Write> DispatchTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            catch_all: None,
        }
    }

    /// Register a handler body for one message id; argument errors are fatal.
    pub fn register<F>(&mut self, msg_id: u32, arity: usize, body: F) -> &mut Self
    where
        F: FnMut(&mut Channel<T>, &[WireValue]) -> Result<Disposition> + 'static,
    {
        self.register_with_policy(msg_id, arity, ErrorPolicy::Fatal, body)
    }

    pub fn register_with_policy<F>(
        &mut self,
        msg_id: u32,
        arity: usize,
        policy: ErrorPolicy,
        body: F,
    ) -> &mut Self
    where
        F: FnMut(&mut Channel<T>, &[WireValue]) -> Result<Disposition> + 'static,
    {
        assert!(
            self.entries.iter().all(|e| e.msg_id != msg_id),
            "duplicate handler for message {msg_id}"
        );
        self.entries.push(Entry {
            msg_id,
            arity,
            policy,
            body: Box::new(body),
        });
        self
    }

    /// Replace the default bad-message behavior.
    pub fn catch_all<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(u32) -> Disposition + 'static,
    {
        self.catch_all = Some(Box::new(f));
        self
    }
}

impl<T: Read + Write> Default for DispatchTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Read + Write> Handler<T> for DispatchTable<T> {
    fn on_message(&mut self, channel: &mut Channel<T>, msg: &Message) -> Result<Disposition> {
        let Some(index) = self.entries.iter().position(|e| e.msg_id == msg.msg_id) else {
            return Ok(match &mut self.catch_all {
                Some(f) => f(msg.msg_id),
                None => self.on_bad_message(msg.msg_id),
            });
        };

        let (arity, policy) = {
            let entry = &self.entries[index];
            (entry.arity, entry.policy)
        };
        if msg.args.len() != arity {
            return Ok(match policy {
                ErrorPolicy::Fatal => self.on_arg_count_error(msg.msg_id, arity, msg.args.len()),
                ErrorPolicy::Ignore => {
                    tracing::debug!(
                        msg_id = msg.msg_id,
                        expected = arity,
                        got = msg.args.len(),
                        "ignoring argument count mismatch"
                    );
                    Disposition::Continue
                }
            });
        }
        match (self.entries[index].body)(channel, &msg.args) {
            Err(ChannelError::BadArgument(err)) => Ok(match policy {
                ErrorPolicy::Fatal => self.on_arg_convert_error(msg.msg_id, err),
                ErrorPolicy::Ignore => {
                    tracing::debug!(msg_id = msg.msg_id, %err, "ignoring argument type mismatch");
                    Disposition::Continue
                }
            }),
            other => other,
        }
    }
}
