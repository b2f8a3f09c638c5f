use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::request::ExpenseRequest;

/// Opaque token naming the worksheet contents a snapshot was read at.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision(pub String);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableSnapshot {
    pub rows: Vec<ExpenseRequest>,
    pub revision: Revision,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("worksheet `{worksheet}` does not match the expected schema: {detail}")]
    SchemaMismatch { worksheet: String, detail: String },
    #[error("worksheet `{worksheet}` changed since it was read (expected revision {expected}, found {actual})")]
    Conflict { worksheet: String, expected: Revision, actual: Revision },
}

/// Tabular persistence addressed by worksheet name. Reads return the whole
/// table; writes replace it and only succeed against the revision they were
/// computed from.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read_table(&self, worksheet: &str) -> Result<TableSnapshot, StoreError>;

    async fn write_table(
        &self,
        worksheet: &str,
        rows: &[ExpenseRequest],
        expected: &Revision,
    ) -> Result<Revision, StoreError>;
}

#[derive(Debug, Default)]
struct Worksheet {
    rows: Vec<ExpenseRequest>,
    revision: u64,
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    worksheets: RwLock<HashMap<String, Worksheet>>,
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn read_table(&self, worksheet: &str) -> Result<TableSnapshot, StoreError> {
        let worksheets = self.worksheets.read().await;
        Ok(worksheets
            .get(worksheet)
            .map(|sheet| TableSnapshot {
                rows: sheet.rows.clone(),
                revision: Revision(sheet.revision.to_string()),
            })
            .unwrap_or_else(|| TableSnapshot { rows: Vec::new(), revision: Revision("0".into()) }))
    }

    async fn write_table(
        &self,
        worksheet: &str,
        rows: &[ExpenseRequest],
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        let mut worksheets = self.worksheets.write().await;
        let sheet = worksheets.entry(worksheet.to_string()).or_default();

        let actual = Revision(sheet.revision.to_string());
        if &actual != expected {
            return Err(StoreError::Conflict {
                worksheet: worksheet.to_string(),
                expected: expected.clone(),
                actual,
            });
        }

        sheet.rows = rows.to_vec();
        sheet.revision += 1;
        Ok(Revision(sheet.revision.to_string()))
    }
}
