use privsep_broker::Worker;

use crate::cmd::WorkerArgs;
use crate::exit::{session_error, status_code, CliResult, SUCCESS};
use crate::output::{print_reports, OpReport, OutputFormat};

pub fn run(args: WorkerArgs, format: OutputFormat) -> CliResult<i32> {
    let mut worker =
        Worker::connect(&args.ipc).map_err(|err| session_error("connect failed", err))?;

    let mut reports = Vec::new();
    let mut code = SUCCESS;
    let mut track = |status: i32| {
        if code == SUCCESS {
            code = status_code(status);
        }
        status
    };

    if let Some(name) = &args.write {
        let (status, written) = worker
            .write_file(name, args.data.as_bytes())
            .map_err(|err| session_error("write-file failed", err))?;
        reports.push(OpReport {
            op: format!("write-file {name}"),
            status: track(status),
            detail: Some(format!("{written} bytes")),
        });

        if args.fan_out {
            let mut second = worker
                .open_session()
                .map_err(|err| session_error("open-session failed", err))?;
            let second_name = format!("{name}.2");
            let (status, written) = second
                .write_file(&second_name, args.data.as_bytes())
                .map_err(|err| session_error("second-session write failed", err))?;
            reports.push(OpReport {
                op: format!("write-file {second_name} (second transport)"),
                status: track(status),
                detail: Some(format!("{written} bytes")),
            });
        }
    }

    if let Some(text) = &args.set_clipboard {
        let status = worker
            .clipboard_set(Some(text))
            .map_err(|err| session_error("clipboard-set failed", err))?;
        reports.push(OpReport {
            op: "clipboard-set".to_string(),
            status: track(status),
            detail: None,
        });
    }

    if args.clear_clipboard {
        let status = worker
            .clipboard_set(None)
            .map_err(|err| session_error("clipboard-clear failed", err))?;
        reports.push(OpReport {
            op: "clipboard-clear".to_string(),
            status: track(status),
            detail: None,
        });
    }

    if args.get_clipboard {
        let (status, text) = worker
            .clipboard_get()
            .map_err(|err| session_error("clipboard-get failed", err))?;
        reports.push(OpReport {
            op: "clipboard-get".to_string(),
            status: track(status),
            detail: Some(text.unwrap_or_else(|| "<null>".to_string())),
        });
    }

    print_reports(&reports, format);
    Ok(code)
}
