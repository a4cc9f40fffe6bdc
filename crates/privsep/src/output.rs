use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use privsep_broker::{Broker, Capability};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One worker operation and what the broker answered.
#[derive(Serialize)]
pub struct OpReport {
    pub op: String,
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub fn print_reports(reports: &[OpReport], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for report in reports {
                println!(
                    "{}",
                    serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OPERATION", "STATUS", "DETAIL"]);
            for report in reports {
                table.add_row(vec![
                    report.op.clone(),
                    status_name(report.status).to_string(),
                    report.detail.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for report in reports {
                match &report.detail {
                    Some(detail) => println!(
                        "{}: {} ({detail})",
                        report.op,
                        status_name(report.status)
                    ),
                    None => println!("{}: {}", report.op, status_name(report.status)),
                }
            }
        }
    }
}

#[derive(Serialize)]
struct AuditRow {
    capability: &'static str,
    allowed: bool,
    calls: u64,
}

/// Print the broker's per-capability audit counters.
pub fn print_audit(broker: &Broker, format: OutputFormat) {
    let rows: Vec<AuditRow> = Capability::ALL
        .iter()
        .map(|&capability| AuditRow {
            capability: capability.name(),
            allowed: broker.policy().query(capability),
            calls: broker.policy().calls(capability),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            for row in &rows {
                println!(
                    "{}",
                    serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CAPABILITY", "ALLOWED", "CALLS"]);
            for row in &rows {
                table.add_row(vec![
                    row.capability.to_string(),
                    row.allowed.to_string(),
                    row.calls.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!(
                    "{}: allowed={} calls={}",
                    row.capability, row.allowed, row.calls
                );
            }
        }
    }
}

pub fn status_name(status: i32) -> &'static str {
    match status {
        privsep_broker::messages::STATUS_OK => "ok",
        privsep_broker::messages::STATUS_DENIED => "denied",
        privsep_broker::messages::STATUS_INVALID_PATH => "invalid-path",
        privsep_broker::messages::STATUS_IO_ERROR => "io-error",
        _ => "unknown",
    }
}
