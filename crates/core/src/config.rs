use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directory::Directory;

pub const DEFAULT_WORKSHEET: &str = "Expense Tracker";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub directory: DirectoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: String,
    pub worksheet: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    pub max_write_attempts: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub requesters: Vec<RequesterEntry>,
    #[serde(default)]
    pub approvers: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterEntry {
    pub email: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Where the worksheet lives, derived from `store.url`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite { url: String },
    Csv { directory: PathBuf },
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub store_url: Option<String>,
    pub worksheet: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                url: "sqlite://reimburse.db".to_string(),
                worksheet: DEFAULT_WORKSHEET.to_string(),
                max_connections: 5,
                timeout_secs: 30,
                max_write_attempts: 3,
            },
            directory: DirectoryConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            requesters: vec![
                RequesterEntry {
                    email: "adekola@mainlandgroup.org".to_string(),
                    name: "Adeleke Adekola".to_string(),
                },
                RequesterEntry {
                    email: "ejiro@mainlandgroup.org".to_string(),
                    name: "Ejiro".to_string(),
                },
            ],
            approvers: vec![
                "Jide Olateju".to_string(),
                "Stephen Olabinjo".to_string(),
                "Esumo Esumo".to_string(),
            ],
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl StoreConfig {
    pub fn backend(&self) -> Result<StoreBackend, ConfigError> {
        let url = self.url.trim();
        if url.starts_with("sqlite:") || url == ":memory:" {
            let url = if url == ":memory:" { "sqlite::memory:" } else { url };
            return Ok(StoreBackend::Sqlite { url: url.to_string() });
        }

        if let Some(directory) = url.strip_prefix("csv://") {
            if directory.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "store.url `csv://` needs a directory path (`csv://./sheets`)".to_string(),
                ));
            }
            return Ok(StoreBackend::Csv { directory: PathBuf::from(directory) });
        }

        Err(ConfigError::Validation(
            "store.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, `:memory:`) or a csv directory (`csv://...`)"
                .to_string(),
        ))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("reimburse.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(store) = patch.store {
            if let Some(url) = store.url {
                self.store.url = url;
            }
            if let Some(worksheet) = store.worksheet {
                self.store.worksheet = worksheet;
            }
            if let Some(max_connections) = store.max_connections {
                self.store.max_connections = max_connections;
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
            if let Some(max_write_attempts) = store.max_write_attempts {
                self.store.max_write_attempts = max_write_attempts;
            }
        }

        if let Some(directory) = patch.directory {
            if let Some(requesters) = directory.requesters {
                self.directory.requesters = requesters;
            }
            if let Some(approvers) = directory.approvers {
                self.directory.approvers = approvers;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("REIMBURSE_STORE_URL") {
            self.store.url = value;
        }
        if let Some(value) = read_env("REIMBURSE_STORE_WORKSHEET") {
            self.store.worksheet = value;
        }
        if let Some(value) = read_env("REIMBURSE_STORE_MAX_CONNECTIONS") {
            self.store.max_connections = parse_u32("REIMBURSE_STORE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REIMBURSE_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("REIMBURSE_STORE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("REIMBURSE_STORE_MAX_WRITE_ATTEMPTS") {
            self.store.max_write_attempts =
                parse_u32("REIMBURSE_STORE_MAX_WRITE_ATTEMPTS", &value)?;
        }

        let log_level =
            read_env("REIMBURSE_LOGGING_LEVEL").or_else(|| read_env("REIMBURSE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REIMBURSE_LOGGING_FORMAT").or_else(|| read_env("REIMBURSE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(store_url) = overrides.store_url {
            self.store.url = store_url;
        }
        if let Some(worksheet) = overrides.worksheet {
            self.store.worksheet = worksheet;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_directory(&self.directory)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("reimburse.toml"), PathBuf::from("config/reimburse.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    store.backend()?;

    let worksheet = store.worksheet.trim();
    if worksheet.is_empty() {
        return Err(ConfigError::Validation("store.worksheet must not be empty".to_string()));
    }
    if worksheet.contains(['/', '\\']) {
        return Err(ConfigError::Validation(
            "store.worksheet must not contain path separators".to_string(),
        ));
    }

    if store.max_connections == 0 {
        return Err(ConfigError::Validation(
            "store.max_connections must be greater than zero".to_string(),
        ));
    }

    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation("store.timeout_secs must be in range 1..=300".to_string()));
    }

    if store.max_write_attempts == 0 || store.max_write_attempts > 10 {
        return Err(ConfigError::Validation(
            "store.max_write_attempts must be in range 1..=10".to_string(),
        ));
    }

    Ok(())
}

fn validate_directory(directory: &DirectoryConfig) -> Result<(), ConfigError> {
    Directory::from_config(directory)
        .map(|_| ())
        .map_err(|error| ConfigError::Validation(format!("directory: {error}")))
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    store: Option<StorePatch>,
    directory: Option<DirectoryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    url: Option<String>,
    worksheet: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    max_write_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryPatch {
    requesters: Option<Vec<RequesterEntry>>,
    approvers: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, StoreBackend};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| format!("default config invalid: {err}"))?;
        ensure(config.store.worksheet == "Expense Tracker", "default worksheet name")?;
        ensure(config.directory.approvers.len() == 3, "default directory has three approvers")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_REIMBURSE_SHEETS_DIR", "/srv/sheets");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("reimburse.toml");
            fs::write(
                &path,
                r#"
[store]
url = "csv://${TEST_REIMBURSE_SHEETS_DIR}"
worksheet = "Q3 Claims"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.store.url == "csv:///srv/sheets", "store url should be interpolated")?;
            ensure(config.store.worksheet == "Q3 Claims", "worksheet should come from file")?;
            ensure(
                config.store.backend().ok()
                    == Some(StoreBackend::Csv { directory: PathBuf::from("/srv/sheets") }),
                "csv backend should be selected",
            )
        })();

        clear_vars(&["TEST_REIMBURSE_SHEETS_DIR"]);
        result
    }

    #[test]
    fn directory_is_replaced_by_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("reimburse.toml");
        fs::write(
            &path,
            r#"
[directory]
approvers = ["Funmi Bello"]

[[directory.requesters]]
email = "tobi@example.org"
name = "Tobi Ade"
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.directory.approvers == vec!["Funmi Bello"], "approvers from file")?;
        ensure(config.directory.requesters.len() == 1, "requesters from file")?;
        ensure(config.directory.requesters[0].email == "tobi@example.org", "requester email")
    }

    #[test]
    fn ambiguous_approvers_fail_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("reimburse.toml");
        fs::write(&path, "[directory]\napprovers = [\"Jide Olateju\", \"Jide Bello\"]\n")
            .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..Default::default() }) {
                Ok(_) => return Err("ambiguous approvers should not load".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("share the login name `jide`")),
            "validation failure should name the shared login",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REIMBURSE_LOG_LEVEL", "warn");
        env::set_var("REIMBURSE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["REIMBURSE_LOG_LEVEL", "REIMBURSE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REIMBURSE_STORE_URL", "sqlite://from-env.db");
        env::set_var("REIMBURSE_STORE_MAX_WRITE_ATTEMPTS", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("reimburse.toml");
            fs::write(
                &path,
                r#"
[store]
url = "sqlite://from-file.db"
worksheet = "From File"
max_write_attempts = 2

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    store_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.store.url == "sqlite://from-override.db", "override store url wins")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.store.max_write_attempts == 5, "env write attempts win over file")?;
            ensure(config.store.worksheet == "From File", "file worksheet wins over default")
        })();

        clear_vars(&["REIMBURSE_STORE_URL", "REIMBURSE_STORE_MAX_WRITE_ATTEMPTS"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REIMBURSE_STORE_TIMEOUT_SECS", "soon");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override failure".to_string()),
            Err(error) => ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. } if key == "REIMBURSE_STORE_TIMEOUT_SECS"
                ),
                "error should name the offending variable",
            ),
        };

        clear_vars(&["REIMBURSE_STORE_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REIMBURSE_STORE_URL", "postgres://db/expenses");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("store.url")
            );
            ensure(has_message, "validation failure should mention store.url")
        })();

        clear_vars(&["REIMBURSE_STORE_URL"]);
        result
    }

    #[test]
    fn memory_alias_selects_sqlite_memory() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.store.url = ":memory:".to_string();

        ensure(
            config.store.backend().ok()
                == Some(StoreBackend::Sqlite { url: "sqlite::memory:".to_string() }),
            ":memory: should map to an in-memory sqlite url",
        )
    }
}
