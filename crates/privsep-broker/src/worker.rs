use std::path::{Path, PathBuf};

use privsep_channel::Channel;
use privsep_transport::{send_hello, PipeListener, PipeStream};
use privsep_wire::Message;
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::messages::{
    send_clipboard_get, send_clipboard_set, send_open_session, send_write_file, CLIPBOARD_ACK,
    CLIPBOARD_TEXT, SESSION_READY, WRITE_FILE_ACK,
};

/// Extract the socket path from a `--ipc=<path>` command-line argument.
pub fn ipc_path_from_args<I, S>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .find_map(|arg| arg.as_ref().strip_prefix("--ipc=").map(PathBuf::from))
}

/// The low-privilege side of a session.
///
/// Connects to the path the broker handed down, sends the hello preamble,
/// and turns each privileged operation into a typed request/reply exchange.
/// Policy denials come back in the status, not as errors: only transport
/// and protocol failures are `Err`.
pub struct Worker {
    channel: Channel<PipeStream>,
}

impl Worker {
    /// Connect using the `--ipc=<path>` argument from this process's
    /// command line (or any iterator of arguments).
    pub fn connect_from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = ipc_path_from_args(args).ok_or(SessionError::MissingIpcArg)?;
        Self::connect(path)
    }

    /// Connect to the broker's socket and send the hello preamble.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let mut stream = PipeListener::connect(path.as_ref())?;
        send_hello(&mut stream)?;
        info!(path = ?path.as_ref(), "connected to broker");
        Ok(Self {
            channel: Channel::new(stream),
        })
    }

    /// Ask the broker to write a file under its root.
    /// Returns the reply status and the number of bytes written.
    pub fn write_file(&mut self, name: &str, contents: &[u8]) -> Result<(i32, u32)> {
        send_write_file(&mut self.channel, name, contents)?;
        let reply = self.expect_reply(WRITE_FILE_ACK, 2)?;
        Ok((
            reply.args[0].recover_int32()?,
            reply.args[1].recover_uint32()?,
        ))
    }

    /// Ask the broker to replace the clipboard text; `None` clears it.
    pub fn clipboard_set(&mut self, text: Option<&str>) -> Result<i32> {
        send_clipboard_set(&mut self.channel, text)?;
        let reply = self.expect_reply(CLIPBOARD_ACK, 1)?;
        Ok(reply.args[0].recover_int32()?)
    }

    /// Ask the broker for the clipboard text. The text is `None` when the
    /// clipboard is unset or the request was denied.
    pub fn clipboard_get(&mut self) -> Result<(i32, Option<String>)> {
        send_clipboard_get(&mut self.channel)?;
        let reply = self.expect_reply(CLIPBOARD_TEXT, 2)?;
        let status = reply.args[0].recover_int32()?;
        let text = reply.args[1].recover_string16()?.map(str::to_owned);
        Ok((status, text))
    }

    /// Ask the broker for a fresh transport and connect to it, yielding a
    /// second independent session next to this one.
    pub fn open_session(&mut self) -> Result<Worker> {
        send_open_session(&mut self.channel)?;
        let reply = self.expect_reply(SESSION_READY, 1)?;
        let path = reply.args[0]
            .recover_string8()?
            .ok_or(SessionError::NullReplyField {
                msg_id: SESSION_READY,
            })?;
        debug!(path, "opening second session");
        Self::connect(path)
    }

    fn expect_reply(&mut self, wanted: u32, arity: usize) -> Result<Message> {
        let msg = self.channel.receive_message()?;
        if msg.msg_id != wanted {
            return Err(SessionError::UnexpectedReply {
                wanted,
                got: msg.msg_id,
            });
        }
        if msg.args.len() != arity {
            return Err(SessionError::ReplyArity {
                msg_id: wanted,
                expected: arity,
                got: msg.args.len(),
            });
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_ipc_argument_anywhere_in_the_line() {
        let args = ["worker", "--verbose", "--ipc=/run/privsep/b.sock"];
        assert_eq!(
            ipc_path_from_args(args),
            Some(PathBuf::from("/run/privsep/b.sock"))
        );
    }

    #[test]
    fn missing_ipc_argument_is_none() {
        assert_eq!(ipc_path_from_args(["worker", "--verbose"]), None);
        assert_eq!(ipc_path_from_args(["--ipc"]), None);
    }

    #[test]
    fn first_ipc_argument_wins() {
        let args = ["--ipc=/run/a.sock", "--ipc=/run/b.sock"];
        assert_eq!(ipc_path_from_args(args), Some(PathBuf::from("/run/a.sock")));
    }
}
