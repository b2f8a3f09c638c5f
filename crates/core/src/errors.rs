use std::fmt;

use thiserror::Error;

use crate::domain::identity::Role;
use crate::domain::request::{RequestStatus, RowId};
use crate::store::StoreError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: &'static str,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid expense request: {}", render_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

fn render_issues(issues: &[FieldIssue]) -> String {
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid request transition from {from} to {to}")]
    InvalidStatusTransition { from: RequestStatus, to: RequestStatus },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("no requester is registered for `{credential}`")]
    UnknownUser { credential: String },
    #[error("no approver is registered for `{credential}`")]
    UnknownApprover { credential: String },
    #[error("no active session")]
    NotLoggedIn,
    #[error("operation requires the {required} role but the session is a {actual}")]
    RoleMismatch { required: Role, actual: Role },
    #[error("request {row} is not assigned to `{approver}`")]
    NotAssigned { row: RowId, approver: String },
    #[error("request {row} is no longer pending (status: {})", describe_status(.status))]
    NotPending { row: RowId, status: Option<RequestStatus> },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn describe_status(status: &Option<RequestStatus>) -> &'static str {
    status.as_ref().map(RequestStatus::as_str).unwrap_or("missing")
}

impl From<ValidationError> for ApplicationError {
    fn from(value: ValidationError) -> Self {
        Self::Domain(DomainError::Validation(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::Conflict { .. } => {
                "This request was already processed. Refresh to see its current status."
            }
            Self::ServiceUnavailable { .. } => {
                "Could not reach the expense worksheet. Check the store connection and retry."
            }
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::Forbidden { .. } => "forbidden",
            Self::Conflict { .. } => "conflict",
            Self::ServiceUnavailable { .. } => "store_unavailable",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::UnknownUser { .. }
            | ApplicationError::UnknownApprover { .. }
            | ApplicationError::Domain(DomainError::Validation(_)) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::NotLoggedIn
            | ApplicationError::RoleMismatch { .. }
            | ApplicationError::NotAssigned { .. } => Self::Forbidden { message, correlation_id },
            ApplicationError::NotPending { .. }
            | ApplicationError::Domain(DomainError::InvalidStatusTransition { .. })
            | ApplicationError::Store(StoreError::Conflict { .. }) => {
                Self::Conflict { message, correlation_id }
            }
            ApplicationError::Store(_) => Self::ServiceUnavailable { message, correlation_id },
        }
    }
}
