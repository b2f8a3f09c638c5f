pub mod assigned;
pub mod config;
pub mod directory;
pub mod doctor;
pub mod history;
pub mod migrate;
pub mod resolve;
pub mod submit;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use reimburse_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use reimburse_core::{
    ApplicationError, Directory, LifecycleEngine, LifecycleSettings, Portal, Role,
};
use reimburse_db::open_store;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_STORE: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_BAD_REQUEST: u8 = 6;
pub const EXIT_FORBIDDEN: u8 = 7;
pub const EXIT_CONFLICT: u8 = 8;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None::<Value>)
    }

    pub fn success_with(
        command: &str,
        message: impl Into<String>,
        data: Option<impl Serialize>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: data.and_then(|data| serde_json::to_value(data).ok()),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with(command, error_class, message, exit_code, None)
    }

    fn failure_with(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Maps a lifecycle error to its user-facing class and message. The raw
    /// error text and the session id go into `data` for operators.
    pub fn rejected(command: &str, error: ApplicationError, portal: &Portal) -> Self {
        let correlation_id = portal
            .session()
            .map(|session| session.id.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        let interface = error.into_interface(correlation_id.clone());
        let exit_code = match interface.error_class() {
            "bad_request" => EXIT_BAD_REQUEST,
            "forbidden" => EXIT_FORBIDDEN,
            "conflict" => EXIT_CONFLICT,
            _ => EXIT_STORE,
        };

        tracing::warn!(
            event_name = "cli.command.rejected",
            command,
            correlation_id = %correlation_id,
            error_class = interface.error_class(),
            detail = interface.message(),
            "command rejected"
        );

        Self::failure_with(
            command,
            interface.error_class(),
            interface.user_message(),
            exit_code,
            Some(serde_json::json!({
                "detail": interface.message(),
                "correlation_id": correlation_id,
            })),
        )
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\",\"data\":null}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Loaded configuration plus the runtime a single command executes on.
pub struct CommandContext {
    command: &'static str,
    pub config: AppConfig,
    runtime: tokio::runtime::Runtime,
}

impl CommandContext {
    pub fn load(command: &'static str, options: &LoadOptions) -> Result<Self, CommandResult> {
        let config = AppConfig::load(options.clone()).map_err(|error| {
            CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            )
        })?;
        init_logging(&config.logging);

        let runtime =
            tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
                CommandResult::failure(
                    command,
                    "runtime_init",
                    format!("failed to initialize async runtime: {error}"),
                    EXIT_RUNTIME,
                )
            })?;

        Ok(Self { command, config, runtime })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Opens the configured store and returns a portal with no session yet.
    pub async fn portal(&self) -> Result<Portal, CommandResult> {
        let directory = Directory::from_config(&self.config.directory).map_err(|error| {
            CommandResult::failure(
                self.command,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            )
        })?;

        let store = open_store(&self.config.store).await.map_err(|error| {
            CommandResult::failure(
                self.command,
                "store_unavailable",
                format!("failed to open record store: {error}"),
                EXIT_STORE,
            )
        })?;

        let engine = LifecycleEngine::new(
            store,
            Arc::new(directory),
            LifecycleSettings::from(&self.config.store),
        );
        Ok(Portal::new(Arc::new(engine)))
    }
}

/// Signs the portal in, turning a rejected credential into a command failure.
pub fn sign_in(
    command: &str,
    portal: &mut Portal,
    role: Role,
    credential: &str,
) -> Result<(), CommandResult> {
    let login = portal.login(role, credential).map(|_| ());
    let portal: &Portal = portal;
    login.map_err(|error| CommandResult::rejected(command, error, portal))
}

pub fn settle(result: Result<CommandResult, CommandResult>) -> CommandResult {
    result.unwrap_or_else(|failure| failure)
}

/// Installs the stderr subscriber once per process; later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
