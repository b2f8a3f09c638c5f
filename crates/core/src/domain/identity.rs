use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requester,
    Approver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Approver => "approver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    /// Accepts the portal's historical labels (`user`, `admin`) as aliases.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "requester" | "user" => Ok(Self::Requester),
            "approver" | "admin" => Ok(Self::Approver),
            other => Err(format!("unknown role `{other}` (expected requester|approver)")),
        }
    }
}

/// A resolved login. `credential` is already normalized: the lowercased email
/// for requesters, the lowercased first name for approvers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub credential: String,
    pub display_name: String,
    pub role: Role,
}

impl Identity {
    pub fn requester(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self { credential: email.into(), display_name: display_name.into(), role: Role::Requester }
    }

    pub fn approver(first_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            credential: first_name.into(),
            display_name: display_name.into(),
            role: Role::Approver,
        }
    }
}
