use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use reimburse_core::config::{ConfigError, StoreBackend, StoreConfig};
use reimburse_core::domain::request::RequestStatus;
use reimburse_core::store::{RecordStore, StoreError};

use crate::{connect_with_settings, migrations};

pub mod csv_file;
pub mod sql;

pub use csv_file::CsvRecordStore;
pub use sql::SqlRecordStore;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("worksheet `{worksheet}` row {row}: {detail}")]
    Decode { worksheet: String, row: usize, detail: String },
    #[error("worksheet `{worksheet}` header: {detail}")]
    Header { worksheet: String, detail: String },
    #[error("worksheet `{worksheet}` is locked by another writer (lock file `{lock}`)")]
    Locked { worksheet: String, lock: String },
}

impl From<SheetError> for StoreError {
    fn from(value: SheetError) -> Self {
        match value {
            SheetError::Decode { ref worksheet, .. } | SheetError::Header { ref worksheet, .. } => {
                StoreError::SchemaMismatch {
                    worksheet: worksheet.clone(),
                    detail: value.to_string(),
                }
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Opens the record store named by `store.url`. SQLite stores have pending
/// migrations applied before they are returned.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, SheetError> {
    match config.backend()? {
        StoreBackend::Sqlite { url } => {
            let pool = connect_with_settings(&url, config.max_connections, config.timeout_secs)
                .await?;
            migrations::run_pending(&pool).await?;
            info!(event_name = "store.opened", backend = "sqlite", url = %url, "record store ready");
            Ok(Arc::new(SqlRecordStore::new(pool)))
        }
        StoreBackend::Csv { directory } => {
            info!(
                event_name = "store.opened",
                backend = "csv",
                directory = %directory.display(),
                "record store ready"
            );
            Ok(Arc::new(
                CsvRecordStore::new(directory)
                    .with_lock_timeout(Duration::from_secs(config.timeout_secs)),
            ))
        }
    }
}

pub(crate) struct CellDecoder<'a> {
    pub worksheet: &'a str,
    pub row: usize,
}

impl CellDecoder<'_> {
    fn error(&self, detail: String) -> SheetError {
        SheetError::Decode { worksheet: self.worksheet.to_string(), row: self.row, detail }
    }

    pub fn date(&self, column: &str, raw: &str) -> Result<NaiveDate, SheetError> {
        let raw = raw.trim();
        // Spreadsheet exports sometimes carry a time component.
        let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
        NaiveDate::parse_from_str(date_part, DATE_FORMAT)
            .map_err(|_| self.error(format!("{column} `{raw}` is not a YYYY-MM-DD date")))
    }

    pub fn amount(&self, column: &str, raw: &str) -> Result<Decimal, SheetError> {
        let raw = raw.trim();
        let amount = Decimal::from_str(raw)
            .map_err(|_| self.error(format!("{column} `{raw}` is not a decimal amount")))?;
        if amount.is_sign_negative() {
            return Err(self.error(format!("{column} `{raw}` must not be negative")));
        }
        Ok(amount)
    }

    pub fn status(&self, column: &str, raw: &str) -> Result<RequestStatus, SheetError> {
        raw.trim().parse::<RequestStatus>().map_err(|reason| self.error(format!("{column}: {reason}")))
    }
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use reimburse_core::domain::request::RequestStatus;
    use reimburse_core::store::StoreError;

    use super::{CellDecoder, SheetError};

    fn decoder() -> CellDecoder<'static> {
        CellDecoder { worksheet: "Expense Tracker", row: 2 }
    }

    #[test]
    fn decodes_spreadsheet_cells() {
        let decoder = decoder();

        assert_eq!(
            decoder.date("Request Date", "2026-02-01 00:00:00").expect("date"),
            NaiveDate::from_ymd_opt(2026, 2, 1).expect("valid date")
        );
        assert_eq!(decoder.amount("Amount", " 1500.50 ").expect("amount"), Decimal::new(150_050, 2));
        assert_eq!(decoder.status("Status", "Pending").expect("status"), RequestStatus::Pending);
    }

    #[test]
    fn bad_cells_become_schema_mismatches() {
        let decoder = decoder();

        let error = decoder.amount("Amount", "-5").expect_err("negative");
        assert!(error.to_string().contains("row 2"));
        assert!(matches!(StoreError::from(error), StoreError::SchemaMismatch { .. }));

        let error = decoder.status("Status", "Escalated").expect_err("unknown status");
        assert!(matches!(error, SheetError::Decode { row: 2, .. }));
        assert!(decoder.date("Request Date", "14/03/2026").is_err());
    }
}
