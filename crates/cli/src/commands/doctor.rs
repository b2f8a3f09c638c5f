use serde::Serialize;

use reimburse_core::config::{AppConfig, LoadOptions};
use reimburse_core::Directory;
use reimburse_db::open_store;

use crate::commands::{init_logging, CommandResult};

const COMMAND: &str = "doctor";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            init_logging(&config.logging);
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_directory(&config));
            checks.push(check_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["directory", "store_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        format!("{COMMAND}: all readiness checks passed")
    } else {
        format!("{COMMAND}: one or more readiness checks failed")
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_directory(config: &AppConfig) -> DoctorCheck {
    match Directory::from_config(&config.directory) {
        Ok(directory) => DoctorCheck {
            name: "directory",
            status: CheckStatus::Pass,
            details: format!(
                "{} requester(s), {} approver(s)",
                directory.requesters().count(),
                directory.approvers().count()
            ),
        },
        Err(error) => {
            DoctorCheck { name: "directory", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

/// Opens the store and reads the configured worksheet, so a header or status
/// problem in the sheet shows up here rather than on the first submission.
fn check_store(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "store_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let worksheet = config.store.worksheet.as_str();
    let result = runtime.block_on(async {
        let store = open_store(&config.store)
            .await
            .map_err(|error| format!("failed to open record store: {error}"))?;
        let snapshot = store.read_table(worksheet).await.map_err(|error| error.to_string())?;
        Ok::<usize, String>(snapshot.rows.len())
    });

    match result {
        Ok(rows) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Pass,
            details: format!("read {rows} row(s) from `{worksheet}` at `{}`", config.store.url),
        },
        Err(error) => {
            DoctorCheck { name: "store_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
