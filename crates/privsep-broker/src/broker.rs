use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use privsep_channel::{Channel, ChannelError, DispatchTable, Disposition};
use privsep_transport::{recv_hello, PipeListener, PipeStream};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::messages::{
    send_clipboard_ack, send_clipboard_text, send_session_ready, send_write_file_ack,
    CLIPBOARD_GET, CLIPBOARD_SET, OPEN_SESSION, STATUS_DENIED, STATUS_INVALID_PATH,
    STATUS_IO_ERROR, STATUS_OK, WRITE_FILE,
};
use crate::policy::{Capability, PolicyTable};

/// The high-privilege side of a session.
///
/// Owns the policy table, the audit counters, and the resources workers ask
/// about: a root directory for file writes and a shared clipboard slot. One
/// broker serves any number of connections; each runs on its own thread
/// against the same shared state, so a policy change is visible to every
/// worker on its next request.
pub struct Broker {
    policy: PolicyTable,
    files_root: PathBuf,
    sessions_dir: PathBuf,
    clipboard: Mutex<Option<String>>,
    next_session: AtomicU32,
}

impl Broker {
    /// `files_root` confines worker file writes; `sessions_dir` is where
    /// fan-out sockets get bound.
    pub fn new(files_root: impl Into<PathBuf>, sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy: PolicyTable::new(),
            files_root: files_root.into(),
            sessions_dir: sessions_dir.into(),
            clipboard: Mutex::new(None),
            next_session: AtomicU32::new(0),
        }
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Launch the worker executable with `--ipc=<path>` appended to its
    /// arguments, pointing it at this broker's socket.
    pub fn spawn_worker(
        &self,
        program: &Path,
        args: &[String],
        socket_path: &Path,
    ) -> Result<Child> {
        let child = Command::new(program)
            .args(args)
            .arg(format!("--ipc={}", socket_path.display()))
            .spawn()
            .map_err(|source| SessionError::Spawn {
                program: program.to_path_buf(),
                source,
            })?;
        info!(pid = child.id(), ?socket_path, "worker spawned");
        Ok(child)
    }

    /// Accept connections forever, one service thread per worker.
    pub fn run(self: &Arc<Self>, listener: &PipeListener) -> Result<()> {
        loop {
            let stream = listener.accept()?;
            let broker = Arc::clone(self);
            thread::spawn(move || {
                if let Err(err) = broker.serve_connection(stream) {
                    warn!(%err, "service thread failed");
                }
            });
        }
    }

    /// Validate the hello preamble, then serve requests until the worker
    /// hangs up.
    ///
    /// Where the transport exposes OS-level peer credentials, the pid
    /// claimed in the preamble is audited against the socket peer's real
    /// pid. A mismatch is logged, not fatal: the preamble pid is a claim,
    /// the OS identity is the record.
    pub fn serve_connection(self: &Arc<Self>, stream: PipeStream) -> Result<()> {
        let mut stream = stream;
        let creds = stream.peer_credentials();
        let peer_pid = recv_hello(&mut stream)?;
        match creds {
            Some((uid, gid, os_pid)) if os_pid != peer_pid => {
                warn!(peer_pid, os_pid, uid, gid, "hello pid disagrees with socket peer");
            }
            Some((uid, gid, _)) => info!(peer_pid, uid, gid, "worker connected"),
            None => info!(peer_pid, "worker connected"),
        }

        let mut channel = Channel::new(stream);
        let mut table = self.dispatch_table();
        match channel.serve(&mut table) {
            Err(ChannelError::ConnectionClosed) => {
                info!(peer_pid, "worker disconnected");
                Ok(())
            }
            other => Ok(other?),
        }
    }

    fn dispatch_table(self: &Arc<Self>) -> DispatchTable<PipeStream> {
        let mut table = DispatchTable::new();

        let broker = Arc::clone(self);
        table.register(WRITE_FILE, 2, move |ch, args| {
            let name = args[0].recover_string16()?;
            let contents = args[1].recover_bytes()?.unwrap_or(&[]);
            let (status, written) = broker.write_file(name, contents);
            send_write_file_ack(ch, status, written)?;
            Ok(Disposition::Continue)
        });

        let broker = Arc::clone(self);
        table.register(CLIPBOARD_SET, 1, move |ch, args| {
            let text = args[0].recover_string16()?;
            let status = broker.clipboard_set(text);
            send_clipboard_ack(ch, status)?;
            Ok(Disposition::Continue)
        });

        let broker = Arc::clone(self);
        table.register(CLIPBOARD_GET, 0, move |ch, _args| {
            let (status, text) = broker.clipboard_get();
            send_clipboard_text(ch, status, text.as_deref())?;
            Ok(Disposition::Continue)
        });

        let broker = Arc::clone(self);
        table.register(OPEN_SESSION, 0, move |ch, _args| {
            let path = broker.open_session().map_err(transport_to_channel)?;
            send_session_ready(ch, &path.to_string_lossy())?;
            Ok(Disposition::Continue)
        });

        table
    }

    fn write_file(&self, name: Option<&str>, contents: &[u8]) -> (i32, u32) {
        if !self.policy.query(Capability::FileWrite) {
            warn!("file write denied by policy");
            return (STATUS_DENIED, 0);
        }
        let Some(name) = name else {
            return (STATUS_INVALID_PATH, 0);
        };
        let Some(path) = self.resolve_in_root(name) else {
            warn!(name, "file write refused: path escapes root");
            return (STATUS_INVALID_PATH, 0);
        };
        match std::fs::write(&path, contents) {
            Ok(()) => {
                self.policy.log_call(Capability::FileWrite);
                debug!(?path, bytes = contents.len(), "file written");
                (STATUS_OK, contents.len() as u32)
            }
            Err(err) => {
                warn!(?path, %err, "file write failed");
                (STATUS_IO_ERROR, 0)
            }
        }
    }

    /// Join `name` under the files root, refusing anything that could step
    /// outside it: absolute paths, `..`, or other non-plain components.
    fn resolve_in_root(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        if relative.as_os_str().is_empty() || relative.is_absolute() {
            return None;
        }
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.files_root.join(relative))
    }

    fn clipboard_set(&self, text: Option<&str>) -> i32 {
        if !self.policy.query(Capability::Clipboard) {
            warn!("clipboard write denied by policy");
            return STATUS_DENIED;
        }
        let mut slot = self
            .clipboard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = text.map(str::to_owned);
        self.policy.log_call(Capability::Clipboard);
        STATUS_OK
    }

    fn clipboard_get(&self) -> (i32, Option<String>) {
        if !self.policy.query(Capability::Clipboard) {
            warn!("clipboard read denied by policy");
            return (STATUS_DENIED, None);
        }
        let slot = self
            .clipboard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.policy.log_call(Capability::Clipboard);
        (STATUS_OK, slot.clone())
    }

    /// Bind a fresh transport and serve its first connection on a new
    /// thread. Returns the path the worker should connect to.
    fn open_session(self: &Arc<Self>) -> privsep_transport::Result<PathBuf> {
        let n = self.next_session.fetch_add(1, Ordering::Relaxed);
        let path = self
            .sessions_dir
            .join(format!("session-{}-{n}.sock", std::process::id()));
        let listener = PipeListener::bind(&path)?;
        info!(?path, "session transport bound");

        let broker = Arc::clone(self);
        thread::spawn(move || match listener.accept() {
            Ok(stream) => {
                if let Err(err) = broker.serve_connection(stream) {
                    warn!(%err, "session thread failed");
                }
            }
            Err(err) => warn!(%err, "session accept failed"),
        });
        Ok(path)
    }
}

fn transport_to_channel(err: privsep_transport::TransportError) -> ChannelError {
    match err {
        privsep_transport::TransportError::Io(io)
        | privsep_transport::TransportError::Accept(io) => ChannelError::Io(io),
        privsep_transport::TransportError::Bind { source, .. }
        | privsep_transport::TransportError::Connect { source, .. } => ChannelError::Io(source),
        other => ChannelError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> Broker {
        Broker::new("/srv/files", "/run/privsep")
    }

    #[test]
    fn plain_relative_names_resolve_under_root() {
        let b = broker();
        assert_eq!(
            b.resolve_in_root("file_one.txt"),
            Some(PathBuf::from("/srv/files/file_one.txt"))
        );
        assert_eq!(
            b.resolve_in_root("nested/name.txt"),
            Some(PathBuf::from("/srv/files/nested/name.txt"))
        );
    }

    #[test]
    fn escaping_names_are_refused() {
        let b = broker();
        assert_eq!(b.resolve_in_root("../evil.txt"), None);
        assert_eq!(b.resolve_in_root("a/../../evil.txt"), None);
        assert_eq!(b.resolve_in_root("/etc/passwd"), None);
        assert_eq!(b.resolve_in_root(""), None);
    }

    #[test]
    fn denied_write_leaves_counter_alone() {
        let b = broker();
        let (status, written) = b.write_file(Some("file_one.txt"), b"data");
        assert_eq!(status, STATUS_DENIED);
        assert_eq!(written, 0);
        assert_eq!(b.policy().calls(Capability::FileWrite), 0);
    }

    #[test]
    fn null_name_is_invalid_even_when_allowed() {
        let b = broker();
        b.policy().set(Capability::FileWrite, true);
        let (status, _) = b.write_file(None, b"data");
        assert_eq!(status, STATUS_INVALID_PATH);
        assert_eq!(b.policy().calls(Capability::FileWrite), 0);
    }

    #[test]
    fn clipboard_set_get_and_clear() {
        let b = broker();
        assert_eq!(b.clipboard_set(Some("hello")), STATUS_DENIED);

        b.policy().set(Capability::Clipboard, true);
        assert_eq!(b.clipboard_set(Some("hello")), STATUS_OK);
        assert_eq!(b.clipboard_get(), (STATUS_OK, Some("hello".to_string())));

        assert_eq!(b.clipboard_set(None), STATUS_OK);
        assert_eq!(b.clipboard_get(), (STATUS_OK, None));
        assert_eq!(b.policy().calls(Capability::Clipboard), 4);
    }
}
