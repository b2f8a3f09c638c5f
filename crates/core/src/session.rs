use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::identity::{Identity, Role};
use crate::domain::request::{AssignedRequests, Decision, ExpenseDraft, RowId, StoredRequest};
use crate::errors::ApplicationError;
use crate::lifecycle::LifecycleEngine;

/// An authenticated caller. Passed explicitly to every lifecycle operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub identity: Identity,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: Identity) -> Self {
        Self { id: Uuid::new_v4().to_string(), identity, started_at: Utc::now() }
    }

    pub fn role(&self) -> Role {
        self.identity.role
    }

    pub fn require(&self, required: Role) -> Result<(), ApplicationError> {
        if self.identity.role == required {
            Ok(())
        } else {
            Err(ApplicationError::RoleMismatch { required, actual: self.identity.role })
        }
    }
}

/// One caller's view of the portal: holds at most one session between
/// `login` and `logout`.
pub struct Portal {
    engine: Arc<LifecycleEngine>,
    session: Option<Session>,
}

impl Portal {
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        Self { engine, session: None }
    }

    /// A failed login leaves any existing session in place.
    pub fn login(&mut self, role: Role, credential: &str) -> Result<&Identity, ApplicationError> {
        let session = self.engine.login(role, credential)?;
        if let Some(previous) = self.session.replace(session) {
            self.engine.logout(previous);
        }
        Ok(&self.active()?.identity)
    }

    pub fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            self.engine.logout(session);
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub async fn submit_request(
        &self,
        draft: ExpenseDraft,
    ) -> Result<StoredRequest, ApplicationError> {
        self.engine.submit(self.active()?, draft).await
    }

    pub async fn list_history(&self) -> Result<Vec<StoredRequest>, ApplicationError> {
        self.engine.list_own(self.active()?).await
    }

    pub async fn list_assigned(&self) -> Result<AssignedRequests, ApplicationError> {
        self.engine.list_assigned(self.active()?).await
    }

    pub async fn resolve(
        &self,
        row: RowId,
        decision: Decision,
        comment: &str,
    ) -> Result<StoredRequest, ApplicationError> {
        self.engine.resolve(self.active()?, row, decision, comment).await
    }

    fn active(&self) -> Result<&Session, ApplicationError> {
        self.session.as_ref().ok_or(ApplicationError::NotLoggedIn)
    }
}
