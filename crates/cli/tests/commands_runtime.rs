use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use rust_decimal::Decimal;
use serde_json::Value;

use reimburse_cli::commands::resolve::ResolveArgs;
use reimburse_cli::commands::submit::SubmitArgs;
use reimburse_cli::commands::{
    assigned, config, directory, doctor, history, migrate, resolve, submit,
};
use reimburse_core::config::{ConfigOverrides, LoadOptions};
use reimburse_core::Decision;

#[test]
fn migrate_returns_success_for_sqlite_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(dir.path());
    with_env(&[("REIMBURSE_STORE_URL", url.as_str())], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(dir.path().join("expenses.db").exists());
    });
}

#[test]
fn migrate_is_a_noop_for_csv_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&[], || {
        let result = migrate::run(&store_options(&csv_url(dir.path())));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or_default().contains("no schema"));
    });
}

#[test]
fn invalid_env_override_is_a_config_failure() {
    with_env(&[("REIMBURSE_STORE_MAX_WRITE_ATTEMPTS", "0")], || {
        let result = history::run(&LoadOptions::default(), "ejiro@mainlandgroup.org");
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "history");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn request_lifecycle_runs_across_separate_commands() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(dir.path());
    with_env(&[("REIMBURSE_STORE_URL", url.as_str())], || {
        let options = LoadOptions::default();

        let submitted = submit::run(&options, draft_args("Ejiro@MainlandGroup.org", "jide"));
        assert_eq!(submitted.exit_code, 0, "submit failed: {}", submitted.output);
        let payload = parse_payload(&submitted.output);
        assert_eq!(payload["data"]["request"]["approver_name"], "Jide Olateju");
        assert_eq!(payload["data"]["request"]["status"], "Pending");
        assert_eq!(payload["data"]["request"]["receipt_reference"], "No File");
        let row = payload["data"]["row"].as_u64().expect("row number") as usize;

        let queue = assigned::run(&options, "Jide", true);
        let payload = parse_payload(&queue.output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"].as_array().map(Vec::len), Some(1));

        let other = assigned::run(&options, "esumo", false);
        let payload = parse_payload(&other.output);
        assert_eq!(payload["data"]["all"].as_array().map(Vec::len), Some(0));

        let approved = resolve::run(&options, resolve_args("jide", row, Decision::Approve, "ok"));
        assert_eq!(approved.exit_code, 0, "resolve failed: {}", approved.output);
        assert_eq!(parse_payload(&approved.output)["data"]["request"]["status"], "Approved");

        let again = resolve::run(&options, resolve_args("jide", row, Decision::Decline, "no"));
        assert_eq!(again.exit_code, 8, "second resolution must conflict");
        let payload = parse_payload(&again.output);
        assert_eq!(payload["error_class"], "conflict");

        let history = history::run(&options, "ejiro@mainlandgroup.org");
        let payload = parse_payload(&history.output);
        assert_eq!(payload["data"][0]["request"]["status"], "Approved");
        assert_eq!(payload["data"][0]["request"]["admin_comment"], "ok");

        let stranger = history::run(&options, "adekola@mainlandgroup.org");
        assert_eq!(parse_payload(&stranger.output)["data"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn rejected_operations_report_user_facing_classes() {
    let dir = tempfile::tempdir().expect("tempdir");
    with_env(&[], || {
        let options = store_options(&csv_url(dir.path()));

        let unknown = history::run(&options, "nobody@mainlandgroup.org");
        assert_eq!(unknown.exit_code, 6);
        let payload = parse_payload(&unknown.output);
        assert_eq!(payload["error_class"], "bad_request");
        assert_eq!(payload["data"]["correlation_id"], "anonymous");

        let mut zero = draft_args("ejiro@mainlandgroup.org", "Esumo Esumo");
        zero.amount = Decimal::ZERO;
        let invalid = submit::run(&options, zero);
        assert_eq!(invalid.exit_code, 6);
        let payload = parse_payload(&invalid.output);
        assert!(payload["data"]["detail"].as_str().unwrap_or_default().contains("amount"));

        let submitted = submit::run(&options, draft_args("ejiro@mainlandgroup.org", "Esumo"));
        assert_eq!(submitted.exit_code, 0, "submit failed: {}", submitted.output);
        let row = parse_payload(&submitted.output)["data"]["row"].as_u64().expect("row") as usize;

        let foreign = resolve::run(&options, resolve_args("stephen", row, Decision::Approve, ""));
        assert_eq!(foreign.exit_code, 7);
        assert_eq!(parse_payload(&foreign.output)["error_class"], "forbidden");
        assert!(dir.path().join("Expense Tracker.csv").exists());
    });
}

#[test]
fn unreadable_store_is_reported_as_unavailable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let not_a_directory = dir.path().join("sheet.txt");
    std::fs::write(&not_a_directory, "plain file").expect("seed file");

    with_env(&[], || {
        let result =
            history::run(&store_options(&csv_url(&not_a_directory)), "ejiro@mainlandgroup.org");
        assert_eq!(result.exit_code, 4, "expected store failure: {}", result.output);
        assert_eq!(parse_payload(&result.output)["error_class"], "store_unavailable");
    });
}

#[test]
fn directory_lists_sign_in_names() {
    with_env(&[], || {
        let result = directory::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let logins: Vec<_> = payload["data"]["approvers"]
            .as_array()
            .expect("approvers")
            .iter()
            .filter_map(|approver| approver["login"].as_str())
            .collect();
        assert_eq!(logins, vec!["jide", "stephen", "esumo"]);
        assert_eq!(payload["data"]["requesters"].as_array().map(Vec::len), Some(2));
    });
}

#[test]
fn config_reports_value_sources() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("reimburse.toml");
    std::fs::write(&config_path, "[store]\nworksheet = \"Q3 Claims\"\n").expect("config file");

    with_env(&[("REIMBURSE_LOG_LEVEL", "debug")], || {
        let options = LoadOptions {
            config_path: Some(config_path.clone()),
            require_file: true,
            overrides: ConfigOverrides {
                store_url: Some(csv_url(dir.path())),
                ..ConfigOverrides::default()
            },
        };
        let result = config::run(&options);
        assert_eq!(result.exit_code, 0, "config failed: {}", result.output);

        let payload = parse_payload(&result.output);
        let source = |key: &str| {
            payload["data"]
                .as_array()
                .and_then(|entries| entries.iter().find(|entry| entry["key"] == key))
                .and_then(|entry| entry["source"].as_str())
                .map(str::to_string)
                .unwrap_or_default()
        };
        assert_eq!(source("store.url"), "override (command line)");
        assert!(source("store.worksheet").starts_with("file ("));
        assert_eq!(source("logging.level"), "env (REIMBURSE_LOG_LEVEL)");
        assert_eq!(source("store.timeout_secs"), "default");
    });
}

#[test]
fn doctor_json_passes_with_reachable_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = csv_url(dir.path());
    with_env(&[("REIMBURSE_STORE_URL", url.as_str())], || {
        let result = doctor::run(&LoadOptions::default(), true);
        assert_eq!(result.exit_code, 0, "doctor failed: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["checks"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn doctor_fails_when_config_invalid() {
    with_env(&[("REIMBURSE_STORE_URL", "ftp://nowhere")], || {
        let result = doctor::run(&LoadOptions::default(), true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

fn draft_args(requester: &str, approver: &str) -> SubmitArgs {
    SubmitArgs {
        requester: requester.to_string(),
        amount: Decimal::new(25_000, 0),
        amount_in_words: "twenty-five thousand naira".to_string(),
        beneficiary_name: "Halima Bello".to_string(),
        beneficiary_bank: "First Bank".to_string(),
        beneficiary_account: "3012345678".to_string(),
        reason: "Client visit transport".to_string(),
        receipt: None,
        approver: approver.to_string(),
        date: None,
    }
}

fn resolve_args(approver: &str, row: usize, decision: Decision, comment: &str) -> ResolveArgs {
    ResolveArgs { approver: approver.to_string(), row, decision, comment: comment.to_string() }
}

fn sqlite_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("expenses.db").display())
}

fn csv_url(dir: &Path) -> String {
    format!("csv://{}", dir.display())
}

fn store_options(url: &str) -> LoadOptions {
    LoadOptions {
        overrides: ConfigOverrides { store_url: Some(url.to_string()), ..ConfigOverrides::default() },
        ..LoadOptions::default()
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "REIMBURSE_STORE_URL",
        "REIMBURSE_STORE_WORKSHEET",
        "REIMBURSE_STORE_MAX_CONNECTIONS",
        "REIMBURSE_STORE_TIMEOUT_SECS",
        "REIMBURSE_STORE_MAX_WRITE_ATTEMPTS",
        "REIMBURSE_LOGGING_LEVEL",
        "REIMBURSE_LOGGING_FORMAT",
        "REIMBURSE_LOG_LEVEL",
        "REIMBURSE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
