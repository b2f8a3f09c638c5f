use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::DirectoryConfig;
use crate::domain::identity::{Identity, Role};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("requester email `{email}` is invalid: {reason}")]
    InvalidRequester { email: String, reason: String },
    #[error("requester email `{email}` is configured more than once")]
    DuplicateRequester { email: String },
    #[error("approver names must not be empty")]
    EmptyApproverName,
    #[error("approver `{name}` is configured more than once")]
    DuplicateApprover { name: String },
    #[error("approvers `{first}` and `{second}` share the login name `{login}`")]
    AmbiguousApprover { login: String, first: String, second: String },
    #[error("at least one approver must be configured")]
    NoApprovers,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ApproverEntry {
    login: String,
    display_name: String,
}

/// Static login table. Requesters sign in with their email, approvers with
/// the first word of their display name; both lookups are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directory {
    requesters: BTreeMap<String, String>,
    approvers: Vec<ApproverEntry>,
}

impl Directory {
    pub fn from_config(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let mut requesters = BTreeMap::new();
        for entry in &config.requesters {
            let email = normalize_key(&entry.email);
            if email.is_empty() || !email.contains('@') {
                return Err(DirectoryError::InvalidRequester {
                    email: entry.email.clone(),
                    reason: "expected an email address".to_string(),
                });
            }
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(DirectoryError::InvalidRequester {
                    email: entry.email.clone(),
                    reason: "display name must not be empty".to_string(),
                });
            }
            if requesters.insert(email.clone(), name.to_string()).is_some() {
                return Err(DirectoryError::DuplicateRequester { email });
            }
        }

        let mut approvers: Vec<ApproverEntry> = Vec::with_capacity(config.approvers.len());
        for raw in &config.approvers {
            let display_name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            let Some(login) = display_name.split_whitespace().next().map(normalize_key) else {
                return Err(DirectoryError::EmptyApproverName);
            };

            if let Some(existing) = approvers.iter().find(|entry| entry.login == login) {
                if normalize_key(&existing.display_name) == normalize_key(&display_name) {
                    return Err(DirectoryError::DuplicateApprover { name: display_name });
                }
                return Err(DirectoryError::AmbiguousApprover {
                    login,
                    first: existing.display_name.clone(),
                    second: display_name,
                });
            }

            approvers.push(ApproverEntry { login, display_name });
        }

        if approvers.is_empty() {
            return Err(DirectoryError::NoApprovers);
        }

        Ok(Self { requesters, approvers })
    }

    pub fn resolve(&self, role: Role, raw_credential: &str) -> Result<Identity, ApplicationError> {
        let credential = normalize_key(raw_credential);
        match role {
            Role::Requester => self
                .requesters
                .get(&credential)
                .map(|name| Identity::requester(credential.clone(), name.clone()))
                .ok_or(ApplicationError::UnknownUser { credential }),
            Role::Approver => self
                .approvers
                .iter()
                .find(|entry| entry.login == credential)
                .map(|entry| Identity::approver(entry.login.clone(), entry.display_name.clone()))
                .ok_or(ApplicationError::UnknownApprover { credential }),
        }
    }

    /// Canonical display name for an approver given either the full display
    /// name or the login name, in any case.
    pub fn find_approver(&self, name: &str) -> Option<&str> {
        let key = normalize_key(&name.split_whitespace().collect::<Vec<_>>().join(" "));
        self.approvers
            .iter()
            .find(|entry| normalize_key(&entry.display_name) == key || entry.login == key)
            .map(|entry| entry.display_name.as_str())
    }

    pub fn approver_names(&self) -> impl Iterator<Item = &str> {
        self.approvers.iter().map(|entry| entry.display_name.as_str())
    }

    /// `(login, display name)` pairs in configuration order.
    pub fn approvers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.approvers.iter().map(|entry| (entry.login.as_str(), entry.display_name.as_str()))
    }

    pub fn requesters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.requesters.iter().map(|(email, name)| (email.as_str(), name.as_str()))
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}
