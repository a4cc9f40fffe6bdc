use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use privsep_broker::Capability;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod broker;
pub mod version;
pub mod worker;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the high-privilege broker.
    Broker(BrokerArgs),
    /// Run the low-privilege worker.
    Worker(WorkerArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Broker(args) => broker::run(args, format),
        Command::Worker(args) => worker::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum CapabilityArg {
    FileWrite,
    Clipboard,
}

impl From<CapabilityArg> for Capability {
    fn from(arg: CapabilityArg) -> Self {
        match arg {
            CapabilityArg::FileWrite => Capability::FileWrite,
            CapabilityArg::Clipboard => Capability::Clipboard,
        }
    }
}

#[derive(Args, Debug)]
pub struct BrokerArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Directory worker file writes are confined to.
    #[arg(long, value_name = "DIR")]
    pub files_root: PathBuf,
    /// Directory for fan-out session sockets. Default: the socket's directory.
    #[arg(long, value_name = "DIR")]
    pub sessions_dir: Option<PathBuf>,
    /// Capability areas to allow (comma-separated). Everything else is denied.
    #[arg(long, value_delimiter = ',', value_name = "CAP")]
    pub allow: Vec<CapabilityArg>,
    /// Worker executable to launch against this socket.
    #[arg(long, value_name = "PROG")]
    pub worker: Option<PathBuf>,
    /// Extra argument for the launched worker (repeatable).
    #[arg(long = "worker-arg", value_name = "ARG", requires = "worker")]
    pub worker_args: Vec<String>,
    /// Exit after serving N connections. Default: serve until Ctrl-C.
    #[arg(long, value_name = "N")]
    pub accept: Option<usize>,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Socket path handed down by the broker.
    #[arg(long, value_name = "PATH")]
    pub ipc: PathBuf,
    /// Ask the broker to write a file with this name under its root.
    #[arg(long, value_name = "NAME")]
    pub write: Option<String>,
    /// Contents for --write.
    #[arg(long, value_name = "TEXT", default_value = "hello file", requires = "write")]
    pub data: String,
    /// Ask the broker to replace the clipboard text.
    #[arg(long, value_name = "TEXT", conflicts_with = "clear_clipboard")]
    pub set_clipboard: Option<String>,
    /// Ask the broker to clear the clipboard.
    #[arg(long)]
    pub clear_clipboard: bool,
    /// Ask the broker for the clipboard text.
    #[arg(long)]
    pub get_clipboard: bool,
    /// Open a second transport mid-session and repeat --write over it.
    #[arg(long, requires = "write")]
    pub fan_out: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}
