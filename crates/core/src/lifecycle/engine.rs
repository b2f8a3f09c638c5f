use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::config::StoreConfig;
use crate::directory::Directory;
use crate::domain::identity::Role;
use crate::domain::request::{
    AssignedRequests, Decision, ExpenseDraft, ExpenseRequest, RowId, StoredRequest,
};
use crate::errors::ApplicationError;
use crate::session::Session;
use crate::store::{RecordStore, StoreError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub worksheet: String,
    /// Read-modify-write cycles attempted before a revision conflict is
    /// reported to the caller.
    pub max_write_attempts: u32,
}

impl From<&StoreConfig> for LifecycleSettings {
    fn from(config: &StoreConfig) -> Self {
        Self { worksheet: config.worksheet.clone(), max_write_attempts: config.max_write_attempts }
    }
}

pub struct LifecycleEngine {
    store: Arc<dyn RecordStore>,
    directory: Arc<Directory>,
    settings: LifecycleSettings,
    audit: Arc<dyn AuditSink>,
    today: fn() -> NaiveDate,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: Arc<Directory>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            directory,
            settings,
            audit: Arc::new(TracingAuditSink),
            today: || Local::now().date_naive(),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn worksheet(&self) -> &str {
        &self.settings.worksheet
    }

    pub fn login(&self, role: Role, credential: &str) -> Result<Session, ApplicationError> {
        match self.directory.resolve(role, credential) {
            Ok(identity) => {
                let session = Session::new(identity);
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        session.id.clone(),
                        "session.login",
                        AuditCategory::Session,
                        session.identity.display_name.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("role", role.as_str()),
                );
                Ok(session)
            }
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        "anonymous",
                        "session.login_rejected",
                        AuditCategory::Session,
                        credential.trim().to_lowercase(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("role", role.as_str()),
                );
                Err(error)
            }
        }
    }

    pub fn logout(&self, session: Session) {
        self.audit.emit(AuditEvent::new(
            None,
            session.id,
            "session.logout",
            AuditCategory::Session,
            session.identity.display_name,
            AuditOutcome::Success,
        ));
    }

    pub async fn submit(
        &self,
        session: &Session,
        draft: ExpenseDraft,
    ) -> Result<StoredRequest, ApplicationError> {
        session.require(Role::Requester)?;

        let approver = self.directory.find_approver(&draft.approver_name).map(str::to_owned);
        if let Err(error) = draft.validate(approver.is_some()) {
            self.emit(
                session,
                None,
                "request.submit_rejected",
                AuditCategory::Submission,
                AuditOutcome::Rejected,
                |event| event.with_metadata("error", error.to_string()),
            );
            return Err(error.into());
        }

        let request = ExpenseRequest::submitted(
            &session.identity,
            draft,
            approver.unwrap_or_default(),
            (self.today)(),
        );

        let result = self
            .read_modify_write(session, |rows| {
                rows.push(request.clone());
                Ok(StoredRequest { row: RowId(rows.len() - 1), request: request.clone() })
            })
            .await;

        match &result {
            Ok(stored) => self.emit(
                session,
                Some(stored.row),
                "request.submitted",
                AuditCategory::Submission,
                AuditOutcome::Success,
                |event| {
                    event
                        .with_metadata("amount", stored.request.amount.to_string())
                        .with_metadata("approver", stored.request.approver_name.clone())
                },
            ),
            Err(error) => self.emit_failure(session, None, "request.submit_failed", error),
        }
        result
    }

    /// The session requester's rows, most recent first.
    pub async fn list_own(&self, session: &Session) -> Result<Vec<StoredRequest>, ApplicationError> {
        session.require(Role::Requester)?;

        let mut own = self.visible_rows(session).await?;
        own.reverse();
        Ok(own)
    }

    pub async fn list_assigned(
        &self,
        session: &Session,
    ) -> Result<AssignedRequests, ApplicationError> {
        session.require(Role::Approver)?;

        let assigned = self.visible_rows(session).await?;
        let pending = assigned.iter().filter(|stored| stored.request.is_pending()).cloned().collect();
        let mut all = assigned;
        all.reverse();
        Ok(AssignedRequests { pending, all })
    }

    pub async fn resolve(
        &self,
        session: &Session,
        row: RowId,
        decision: Decision,
        comment: &str,
    ) -> Result<StoredRequest, ApplicationError> {
        session.require(Role::Approver)?;

        let result = self
            .read_modify_write(session, |rows| {
                let Some(request) = rows.get_mut(row.0) else {
                    return Err(ApplicationError::NotPending { row, status: None });
                };
                if !request.is_visible_to(&session.identity) {
                    return Err(ApplicationError::NotAssigned {
                        row,
                        approver: session.identity.display_name.clone(),
                    });
                }
                if !request.is_pending() {
                    return Err(ApplicationError::NotPending { row, status: Some(request.status) });
                }

                request.resolve(decision, comment)?;
                Ok(StoredRequest { row, request: request.clone() })
            })
            .await;

        match &result {
            Ok(stored) => self.emit(
                session,
                Some(row),
                "request.resolved",
                AuditCategory::Resolution,
                AuditOutcome::Success,
                |event| {
                    event
                        .with_metadata("status", stored.request.status.as_str())
                        .with_metadata("comment", stored.request.admin_comment.clone())
                },
            ),
            Err(error) => self.emit_failure(session, Some(row), "request.resolve_rejected", error),
        }
        result
    }

    async fn visible_rows(&self, session: &Session) -> Result<Vec<StoredRequest>, ApplicationError> {
        let snapshot = self.store.read_table(&self.settings.worksheet).await.map_err(|error| {
            warn!(
                event_name = "store.read_failed",
                correlation_id = %session.id,
                worksheet = %self.settings.worksheet,
                error = %error,
                "could not read worksheet"
            );
            error
        })?;
        debug!(
            event_name = "store.read",
            correlation_id = %session.id,
            worksheet = %self.settings.worksheet,
            rows = snapshot.rows.len(),
            revision = %snapshot.revision,
            "worksheet snapshot loaded"
        );

        Ok(snapshot
            .rows
            .into_iter()
            .enumerate()
            .filter(|(_, request)| request.is_visible_to(&session.identity))
            .map(|(index, request)| StoredRequest { row: RowId(index), request })
            .collect())
    }

    /// Reads the whole worksheet, applies `apply` to the rows, and writes them
    /// back against the revision that was read. A revision conflict restarts
    /// the cycle from a fresh read so `apply` re-checks the current rows.
    async fn read_modify_write<T, F>(
        &self,
        session: &Session,
        mut apply: F,
    ) -> Result<T, ApplicationError>
    where
        F: FnMut(&mut Vec<ExpenseRequest>) -> Result<T, ApplicationError>,
    {
        let worksheet = self.settings.worksheet.as_str();
        let max_attempts = self.settings.max_write_attempts.max(1);
        let mut attempt = 1;

        loop {
            let snapshot = self.store.read_table(worksheet).await?;
            let mut rows = snapshot.rows;
            let outcome = apply(&mut rows)?;

            match self.store.write_table(worksheet, &rows, &snapshot.revision).await {
                Ok(revision) => {
                    debug!(
                        event_name = "store.write",
                        correlation_id = %session.id,
                        worksheet = %worksheet,
                        rows = rows.len(),
                        revision = %revision,
                        "worksheet rewritten"
                    );
                    return Ok(outcome);
                }
                Err(StoreError::Conflict { expected, actual, .. }) if attempt < max_attempts => {
                    warn!(
                        event_name = "store.write_conflict",
                        correlation_id = %session.id,
                        worksheet = %worksheet,
                        attempt,
                        expected = %expected,
                        actual = %actual,
                        "worksheet changed during update, re-reading"
                    );
                    attempt += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn emit(
        &self,
        session: &Session,
        row: Option<RowId>,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        decorate: impl FnOnce(AuditEvent) -> AuditEvent,
    ) {
        self.audit.emit(decorate(AuditEvent::new(
            row,
            session.id.clone(),
            event_type,
            category,
            session.identity.display_name.clone(),
            outcome,
        )));
    }

    fn emit_failure(
        &self,
        session: &Session,
        row: Option<RowId>,
        event_type: &str,
        error: &ApplicationError,
    ) {
        let (category, outcome) = match error {
            ApplicationError::Store(_) => (AuditCategory::Persistence, AuditOutcome::Failed),
            ApplicationError::NotPending { .. } | ApplicationError::NotAssigned { .. } => {
                (AuditCategory::Resolution, AuditOutcome::Rejected)
            }
            _ => (AuditCategory::Submission, AuditOutcome::Rejected),
        };
        self.audit.emit(
            AuditEvent::new(
                row,
                session.id.clone(),
                event_type,
                category,
                session.identity.display_name.clone(),
                outcome,
            )
            .with_metadata("error", error.to_string()),
        );
    }
}
