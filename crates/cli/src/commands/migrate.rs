use reimburse_core::config::{LoadOptions, StoreBackend};
use reimburse_db::{connect_with_settings, migrations};

use crate::commands::{
    CommandContext, CommandResult, EXIT_CONFIG, EXIT_MIGRATION, EXIT_STORE,
};

const COMMAND: &str = "migrate";

pub fn run(options: &LoadOptions) -> CommandResult {
    let context = match CommandContext::load(COMMAND, options) {
        Ok(context) => context,
        Err(failure) => return failure,
    };
    let store = &context.config.store;

    let url = match store.backend() {
        Ok(StoreBackend::Sqlite { url }) => url,
        Ok(StoreBackend::Csv { directory }) => {
            return CommandResult::success(
                COMMAND,
                format!(
                    "csv worksheet store at `{}` has no schema to migrate",
                    directory.display()
                ),
            );
        }
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let result = context.block_on(async {
        let pool = connect_with_settings(&url, store.max_connections, store.timeout_secs)
            .await
            .map_err(|error| ("store_unavailable", error.to_string(), EXIT_STORE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => {
            tracing::info!(event_name = "cli.migrate.applied", url = %url, "migrations applied");
            CommandResult::success(COMMAND, "applied pending migrations")
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(COMMAND, error_class, message, exit_code)
        }
    }
}
