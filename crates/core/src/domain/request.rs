use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::identity::{Identity, Role};
use crate::errors::{DomainError, FieldIssue, ValidationError};

/// Receipt reference recorded when a request is submitted without a receipt.
pub const NO_RECEIPT: &str = "No File";

/// Worksheet header, in column order.
pub const WORKSHEET_COLUMNS: [&str; 13] = [
    "Request Date",
    "Staff Name",
    "Email",
    "Amount",
    "Amount in Words",
    "Beneficiary Name",
    "Beneficiary Bank",
    "Account No",
    "Reason",
    "Receipt Link",
    "Approver Name",
    "Status",
    "Admin Comment",
];

/// Zero-based position of a request in its worksheet at read time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub usize);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Declined,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Declined => "Declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "declined" => Ok(Self::Declined),
            other => Err(format!("unknown request status `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Decline,
}

impl Decision {
    pub fn target_status(&self) -> RequestStatus {
        match self {
            Self::Approve => RequestStatus::Approved,
            Self::Decline => RequestStatus::Declined,
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(Self::Approve),
            "decline" | "declined" => Ok(Self::Decline),
            other => Err(format!("unknown decision `{other}` (expected approve|decline)")),
        }
    }
}

/// Fields a requester fills in. Identity, status and comment are not part of
/// the draft; they are fixed by the lifecycle engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub request_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub amount_in_words: String,
    pub beneficiary_name: String,
    pub beneficiary_bank: String,
    pub beneficiary_account: String,
    pub reason: String,
    pub receipt: Option<String>,
    pub approver_name: String,
}

impl ExpenseDraft {
    /// Checks every required field and reports all failures at once.
    /// `approver_known` tells whether `approver_name` names a configured approver.
    pub fn validate(&self, approver_known: bool) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.amount <= Decimal::ZERO {
            issues.push(FieldIssue::new("amount", "must be greater than zero"));
        } else if self.amount != self.amount.round_dp(2) {
            issues.push(FieldIssue::new("amount", "must have at most two decimal places"));
        }
        if self.beneficiary_name.trim().is_empty() {
            issues.push(FieldIssue::new("beneficiary_name", "is required"));
        }
        if self.beneficiary_account.trim().is_empty() {
            issues.push(FieldIssue::new("beneficiary_account", "is required"));
        }
        if !approver_known {
            issues.push(FieldIssue::new(
                "approver_name",
                format!("`{}` is not a configured approver", self.approver_name.trim()),
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

/// One worksheet row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRequest {
    pub request_date: NaiveDate,
    pub requester_name: String,
    pub requester_email: String,
    pub amount: Decimal,
    pub amount_in_words: String,
    pub beneficiary_name: String,
    pub beneficiary_bank: String,
    pub beneficiary_account: String,
    pub reason: String,
    pub receipt_reference: String,
    pub approver_name: String,
    pub status: RequestStatus,
    pub admin_comment: String,
}

impl ExpenseRequest {
    /// Builds a fresh Pending row from a validated draft. `approver_name` is the
    /// approver's canonical display name.
    pub fn submitted(
        requester: &Identity,
        draft: ExpenseDraft,
        approver_name: impl Into<String>,
        today: NaiveDate,
    ) -> Self {
        let receipt_reference = draft
            .receipt
            .map(|receipt| receipt.trim().to_string())
            .filter(|receipt| !receipt.is_empty())
            .unwrap_or_else(|| NO_RECEIPT.to_string());

        Self {
            request_date: draft.request_date.unwrap_or(today),
            requester_name: requester.display_name.clone(),
            requester_email: requester.credential.clone(),
            amount: draft.amount,
            amount_in_words: draft.amount_in_words.trim().to_string(),
            beneficiary_name: draft.beneficiary_name.trim().to_string(),
            beneficiary_bank: draft.beneficiary_bank.trim().to_string(),
            beneficiary_account: draft.beneficiary_account.trim().to_string(),
            reason: draft.reason.trim().to_string(),
            receipt_reference,
            approver_name: approver_name.into(),
            status: RequestStatus::Pending,
            admin_comment: String::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn is_visible_to(&self, identity: &Identity) -> bool {
        match identity.role {
            Role::Requester => self.requester_email == identity.credential,
            Role::Approver => self.approver_name == identity.display_name,
        }
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self.status, next),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Declined)
        )
    }

    pub fn resolve(
        &mut self,
        decision: Decision,
        comment: impl Into<String>,
    ) -> Result<(), DomainError> {
        let next = decision.target_status();
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition { from: self.status, to: next });
        }

        self.status = next;
        self.admin_comment = comment.into();
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRequest {
    pub row: RowId,
    pub request: ExpenseRequest,
}

/// An approver's view: pending rows in submission order, and every assigned
/// row most recent first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedRequests {
    pub pending: Vec<StoredRequest>,
    pub all: Vec<StoredRequest>,
}
