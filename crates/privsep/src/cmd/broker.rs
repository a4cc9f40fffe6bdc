use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use privsep_broker::Broker;
use privsep_transport::PipeListener;
use tracing::warn;

use crate::cmd::BrokerArgs;
use crate::exit::{io_error, session_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_audit, OutputFormat};

pub fn run(args: BrokerArgs, format: OutputFormat) -> CliResult<i32> {
    std::fs::create_dir_all(&args.files_root)
        .map_err(|err| io_error("create files root", err))?;
    let sessions_dir = args.sessions_dir.unwrap_or_else(|| {
        args.path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    std::fs::create_dir_all(&sessions_dir)
        .map_err(|err| io_error("create sessions dir", err))?;

    let listener =
        PipeListener::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    let broker = Arc::new(Broker::new(&args.files_root, &sessions_dir));
    for capability in &args.allow {
        broker.policy().set((*capability).into(), true);
    }

    let mut child = match &args.worker {
        Some(program) => Some(
            broker
                .spawn_worker(program, &args.worker_args, listener.path())
                .map_err(|err| session_error("spawn worker", err))?,
        ),
        None => None,
    };

    install_ctrlc_handler(Arc::clone(&broker), format)?;

    let mut handles = Vec::new();
    let mut served = 0usize;
    while args.accept.is_none_or(|limit| served < limit) {
        let stream = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        served += 1;
        let broker = Arc::clone(&broker);
        handles.push(thread::spawn(move || {
            if let Err(err) = broker.serve_connection(stream) {
                warn!(%err, "service thread failed");
            }
        }));
    }

    for handle in handles {
        let _ = handle.join();
    }
    if let Some(child) = child.as_mut() {
        let _ = child.wait();
    }

    print_audit(&broker, format);
    Ok(SUCCESS)
}

fn install_ctrlc_handler(broker: Arc<Broker>, format: OutputFormat) -> CliResult<()> {
    ctrlc::set_handler(move || {
        print_audit(&broker, format);
        std::process::exit(SUCCESS);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
