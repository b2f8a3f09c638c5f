use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

use reimburse_core::domain::request::ExpenseRequest;
use reimburse_core::store::{RecordStore, Revision, StoreError, TableSnapshot};

use super::{format_date, CellDecoder, SheetError};
use crate::DbPool;

/// Worksheets kept in SQLite. Each worksheet carries an integer revision that
/// every successful rewrite advances by one.
pub struct SqlRecordStore {
    pool: DbPool,
}

impl SqlRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn load(&self, worksheet: &str) -> Result<TableSnapshot, SheetError> {
        let mut tx = self.pool.begin().await?;

        let revision: i64 = sqlx::query("SELECT revision FROM worksheet WHERE name = ?")
            .bind(worksheet)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.try_get::<i64, _>("revision"))
            .transpose()?
            .unwrap_or(0);

        let records = sqlx::query(
            "SELECT position, request_date, staff_name, email, amount, amount_in_words,
                    beneficiary_name, beneficiary_bank, account_no, reason, receipt_link,
                    approver_name, status, admin_comment
             FROM worksheet_row WHERE worksheet = ? ORDER BY position",
        )
        .bind(worksheet)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| row_to_request(worksheet, index, record))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TableSnapshot { rows, revision: Revision(revision.to_string()) })
    }

    async fn store(
        &self,
        worksheet: &str,
        rows: &[ExpenseRequest],
        expected: &Revision,
    ) -> Result<Result<Revision, StoreError>, SheetError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO worksheet (name, revision) VALUES (?, 0)")
            .bind(worksheet)
            .execute(&mut *tx)
            .await?;

        // A revision token this store never issued cannot match.
        let updated = match expected.0.parse::<i64>() {
            Ok(expected_revision) => {
                sqlx::query(
                    "UPDATE worksheet SET revision = revision + 1
                     WHERE name = ? AND revision = ?",
                )
                .bind(worksheet)
                .bind(expected_revision)
                .execute(&mut *tx)
                .await?
                .rows_affected()
            }
            Err(_) => 0,
        };

        if updated == 0 {
            let actual: i64 = sqlx::query("SELECT revision FROM worksheet WHERE name = ?")
                .bind(worksheet)
                .fetch_one(&mut *tx)
                .await?
                .try_get("revision")?;
            tx.rollback().await?;
            return Ok(Err(StoreError::Conflict {
                worksheet: worksheet.to_string(),
                expected: expected.clone(),
                actual: Revision(actual.to_string()),
            }));
        }

        sqlx::query("DELETE FROM worksheet_row WHERE worksheet = ?")
            .bind(worksheet)
            .execute(&mut *tx)
            .await?;

        for (position, request) in rows.iter().enumerate() {
            sqlx::query(
                "INSERT INTO worksheet_row (worksheet, position, request_date, staff_name, email,
                                            amount, amount_in_words, beneficiary_name,
                                            beneficiary_bank, account_no, reason, receipt_link,
                                            approver_name, status, admin_comment)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(worksheet)
            .bind(position as i64)
            .bind(format_date(request.request_date))
            .bind(&request.requester_name)
            .bind(&request.requester_email)
            .bind(request.amount.to_string())
            .bind(&request.amount_in_words)
            .bind(&request.beneficiary_name)
            .bind(&request.beneficiary_bank)
            .bind(&request.beneficiary_account)
            .bind(&request.reason)
            .bind(&request.receipt_reference)
            .bind(&request.approver_name)
            .bind(request.status.as_str())
            .bind(&request.admin_comment)
            .execute(&mut *tx)
            .await?;
        }

        let revision: i64 = sqlx::query("SELECT revision FROM worksheet WHERE name = ?")
            .bind(worksheet)
            .fetch_one(&mut *tx)
            .await?
            .try_get("revision")?;
        tx.commit().await?;

        debug!(worksheet, rows = rows.len(), revision, "worksheet rewritten");
        Ok(Ok(Revision(revision.to_string())))
    }
}

fn row_to_request(
    worksheet: &str,
    index: usize,
    record: &sqlx::sqlite::SqliteRow,
) -> Result<ExpenseRequest, SheetError> {
    let decoder = CellDecoder { worksheet, row: index };
    let text = |column: &str| -> Result<String, SheetError> {
        record.try_get::<String, _>(column).map_err(|e| SheetError::Decode {
            worksheet: worksheet.to_string(),
            row: index,
            detail: format!("{column}: {e}"),
        })
    };

    Ok(ExpenseRequest {
        request_date: decoder.date("request_date", &text("request_date")?)?,
        requester_name: text("staff_name")?,
        requester_email: text("email")?,
        amount: decoder.amount("amount", &text("amount")?)?,
        amount_in_words: text("amount_in_words")?,
        beneficiary_name: text("beneficiary_name")?,
        beneficiary_bank: text("beneficiary_bank")?,
        beneficiary_account: text("account_no")?,
        reason: text("reason")?,
        receipt_reference: text("receipt_link")?,
        approver_name: text("approver_name")?,
        status: decoder.status("status", &text("status")?)?,
        admin_comment: text("admin_comment")?,
    })
}

#[async_trait]
impl RecordStore for SqlRecordStore {
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
