use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use reimburse_core::domain::request::{ExpenseRequest, WORKSHEET_COLUMNS};
use reimburse_core::store::{RecordStore, Revision, StoreError, TableSnapshot};

use super::{format_date, CellDecoder, SheetError};

/// Worksheets kept as `<directory>/<worksheet>.csv`, one header row followed
/// by one row per request. The revision of a worksheet is the SHA-256 of the
/// file contents, so edits made outside the process are detected as well.
///
/// Writers in any process serialize on `<worksheet>.csv.lock`, held from the
/// revision check until the new contents have been renamed into place.
pub struct CsvRecordStore {
    directory: PathBuf,
    write_lock: Mutex<()>,
    lock_timeout: Duration,
}

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(15);

impl CsvRecordStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            write_lock: Mutex::new(()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// How long a write waits for another writer's lock file before giving up.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn worksheet_path(&self, worksheet: &str) -> Result<PathBuf, SheetError> {
        if worksheet.trim().is_empty() || worksheet.contains(['/', '\\']) || worksheet == ".." {
            return Err(SheetError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("`{worksheet}` is not a usable worksheet file name"),
            )));
        }
        Ok(self.directory.join(format!("{worksheet}.csv")))
    }

    async fn current_bytes(path: &Path) -> Result<Vec<u8>, SheetError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(error.into()),
        }
    }

    async fn load(&self, worksheet: &str) -> Result<TableSnapshot, SheetError> {
        let path = self.worksheet_path(worksheet)?;
        let bytes = Self::current_bytes(&path).await?;
        let rows = decode_rows(worksheet, &bytes)?;
        Ok(TableSnapshot { rows, revision: digest(&bytes) })
    }

    async fn store(
        &self,
        worksheet: &str,
        rows: &[ExpenseRequest],
        expected: &Revision,
    ) -> Result<Result<Revision, StoreError>, SheetError> {
        let path = self.worksheet_path(worksheet)?;
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.directory).await?;
        let _lock = WorksheetLock::acquire(worksheet, &path, self.lock_timeout).await?;

        let actual = digest(&Self::current_bytes(&path).await?);
        if &actual != expected {
            return Ok(Err(StoreError::Conflict {
                worksheet: worksheet.to_string(),
                expected: expected.clone(),
                actual,
            }));
        }

        let bytes = encode_rows(rows)?;
        let mut staging = NamedTempFile::new_in(&self.directory)?;
        staging.write_all(&bytes)?;
        staging.as_file().sync_all()?;
        staging.persist(&path).map_err(|error| SheetError::Io(error.error))?;

        debug!(worksheet, rows = rows.len(), path = %path.display(), "worksheet rewritten");
        Ok(Ok(digest(&bytes)))
    }
}

/// Exclusive lock file next to the worksheet. Removed again on drop; a lock left
/// behind by a killed process has to be deleted by hand.
struct WorksheetLock {
    path: PathBuf,
}

impl WorksheetLock {
    async fn acquire(
        worksheet: &str,
        worksheet_path: &Path,
        timeout: Duration,
    ) -> Result<Self, SheetError> {
        let path = worksheet_path.with_extension("csv.lock");
        let deadline = Instant::now() + timeout;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        warn!(worksheet, lock = %path.display(), "worksheet lock wait timed out");
                        return Err(SheetError::Locked {
                            worksheet: worksheet.to_string(),
                            lock: path.display().to_string(),
                        });
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

impl Drop for WorksheetLock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %error, "failed to release worksheet lock");
        }
    }
}

fn digest(bytes: &[u8]) -> Revision {
    let hash = Sha256::digest(bytes);
    Revision(hash.iter().map(|byte| format!("{byte:02x}")).collect())
}

fn decode_rows(worksheet: &str, bytes: &[u8]) -> Result<Vec<ExpenseRequest>, SheetError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(bytes);

    let header_positions: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(position, name)| (name.trim().to_ascii_lowercase(), position))
        .collect();

    let mut columns = [0usize; WORKSHEET_COLUMNS.len()];
    let mut missing = Vec::new();
    for (slot, name) in columns.iter_mut().zip(WORKSHEET_COLUMNS) {
        match header_positions.get(&name.to_ascii_lowercase()) {
            Some(position) => *slot = *position,
            None => missing.push(name),
        }
    }
    if !missing.is_empty() {
        return Err(SheetError::Header {
            worksheet: worksheet.to_string(),
            detail: format!("missing column(s): {}", missing.join(", ")),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let decoder = CellDecoder { worksheet, row: rows.len() };
        let raw = |column: usize| record.get(columns[column]).unwrap_or("");
        let cell = |column: usize| raw(column).to_string();

        rows.push(ExpenseRequest {
            request_date: decoder.date(WORKSHEET_COLUMNS[0], raw(0))?,
            requester_name: cell(1),
            requester_email: cell(2),
            amount: decoder.amount(WORKSHEET_COLUMNS[3], raw(3))?,
            amount_in_words: cell(4),
            beneficiary_name: cell(5),
            beneficiary_bank: cell(6),
            beneficiary_account: cell(7),
            reason: cell(8),
            receipt_reference: cell(9),
            approver_name: cell(10),
            status: decoder.status(WORKSHEET_COLUMNS[11], raw(11))?,
            admin_comment: cell(12),
        });
    }

    Ok(rows)
}

fn encode_rows(rows: &[ExpenseRequest]) -> Result<Vec<u8>, SheetError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(WORKSHEET_COLUMNS)?;

    for request in rows {
        let date = format_date(request.request_date);
        let amount = request.amount.to_string();
        writer.write_record([
            date.as_str(),
            request.requester_name.as_str(),
            request.requester_email.as_str(),
            amount.as_str(),
            request.amount_in_words.as_str(),
            request.beneficiary_name.as_str(),
            request.beneficiary_bank.as_str(),
            request.beneficiary_account.as_str(),
            request.reason.as_str(),
            request.receipt_reference.as_str(),
            request.approver_name.as_str(),
            request.status.as_str(),
            request.admin_comment.as_str(),
        ])?;
    }

    writer.into_inner().map_err(|error| SheetError::Io(error.into_error()))
}

#[async_trait]
impl RecordStore for CsvRecordStore {
    async fn read_table(&self, worksheet: &str) -> Result<TableSnapshot, StoreError> {
        Ok(self.load(worksheet).await?)
    }

    async fn write_table(
        &self,
        worksheet: &str,
        rows: &[ExpenseRequest],
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        self.store(worksheet, rows, expected).await?
    }
}
