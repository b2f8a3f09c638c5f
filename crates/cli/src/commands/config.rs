use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use toml::Value;

use reimburse_core::config::{AppConfig, LoadOptions};

use crate::commands::{CommandResult, EXIT_CONFIG};

const COMMAND: &str = "config";

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

struct SourceLookup {
    file_path: Option<PathBuf>,
    file_doc: Option<Value>,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let file_path = detect_config_path(options.config_path.as_deref());
    let lookup = SourceLookup {
        file_doc: load_config_file_doc(file_path.as_deref()),
        file_path,
    };

    let requesters = config
        .directory
        .requesters
        .iter()
        .map(|entry| format!("{} ({})", entry.email, entry.name))
        .collect::<Vec<_>>()
        .join(", ");

    let entries = vec![
        lookup.entry(
            "store.url",
            config.store.url.clone(),
            &["REIMBURSE_STORE_URL"],
            options.overrides.store_url.is_some(),
        ),
        lookup.entry(
            "store.worksheet",
            config.store.worksheet.clone(),
            &["REIMBURSE_STORE_WORKSHEET"],
            options.overrides.worksheet.is_some(),
        ),
        lookup.entry(
            "store.max_connections",
            config.store.max_connections.to_string(),
            &["REIMBURSE_STORE_MAX_CONNECTIONS"],
            false,
        ),
        lookup.entry(
            "store.timeout_secs",
            config.store.timeout_secs.to_string(),
            &["REIMBURSE_STORE_TIMEOUT_SECS"],
            false,
        ),
        lookup.entry(
            "store.max_write_attempts",
            config.store.max_write_attempts.to_string(),
            &["REIMBURSE_STORE_MAX_WRITE_ATTEMPTS"],
            false,
        ),
        lookup.entry("directory.requesters", requesters, &[], false),
        lookup.entry("directory.approvers", config.directory.approvers.join(", "), &[], false),
        lookup.entry(
            "logging.level",
            config.logging.level.clone(),
            &["REIMBURSE_LOGGING_LEVEL", "REIMBURSE_LOG_LEVEL"],
            options.overrides.log_level.is_some(),
        ),
        lookup.entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["REIMBURSE_LOGGING_FORMAT", "REIMBURSE_LOG_FORMAT"],
            false,
        ),
    ];

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];
    lines.extend(entries.iter().map(render_line));

    CommandResult::success_with(COMMAND, lines.join("\n"), Some(entries))
}

impl SourceLookup {
    fn entry(
        &self,
        key: &'static str,
        value: String,
        env_keys: &[&str],
        overridden: bool,
    ) -> ConfigEntry {
        ConfigEntry { key, value, source: self.source(key, env_keys, overridden) }
    }

    fn source(&self, key_path: &str, env_keys: &[&str], overridden: bool) -> String {
        if overridden {
            return "override (command line)".to_string();
        }

        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("reimburse.toml"), PathBuf::from("config/reimburse.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(entry: &ConfigEntry) -> String {
    format!("- {} = {} (source: {})", entry.key, entry.value, entry.source)
}
