//! Append-only audit steps recording every action taken on a transaction
use super::transaction::{Role, TimeStamp};
use chrono::Utc;
use std::fmt;
use std::str::FromStr;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum AuditAction {
    #[n(0)]
    Created,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Processing,
    #[n(4)]
    Completed,
    #[n(5)]
    Failed,
}

/// One immutable record in a transaction's approval chain. Steps are only
/// ever appended, never edited or removed; a correction is a new step.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct AuditStep {
    #[n(0)]
    role: Role,
    #[n(1)]
    user_id: String,
    #[n(2)]
    user_name: String,
    #[n(3)]
    action: AuditAction,
    #[n(4)]
    timestamp: TimeStamp<Utc>,
    #[n(5)]
    comment: Option<String>,
}

impl AuditStep {
    /// The timestamp is taken at the moment of recording, never supplied by
    /// the caller, so steps cannot be backdated.
    pub(crate) fn record(
        role: Role,
        user_id: &str,
        user_name: &str,
        action: AuditAction,
        comment: Option<String>,
    ) -> Self {
        Self {
            role,
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            action,
            timestamp: TimeStamp::new(),
            comment,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
    pub fn user_name(&self) -> &str {
        &self.user_name
    }
    pub fn action(&self) -> AuditAction {
        self.action
    }
    pub fn timestamp(&self) -> &TimeStamp<Utc> {
        &self.timestamp
    }
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::Created => write!(f, "created"),
            AuditAction::Approved => write!(f, "approved"),
            AuditAction::Rejected => write!(f, "rejected"),
            AuditAction::Processing => write!(f, "processing"),
            AuditAction::Completed => write!(f, "completed"),
            AuditAction::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(AuditAction::Created),
            "approved" => Ok(AuditAction::Approved),
            "rejected" => Ok(AuditAction::Rejected),
            "processing" => Ok(AuditAction::Processing),
            "completed" => Ok(AuditAction::Completed),
            "failed" => Ok(AuditAction::Failed),
            _ => Err(format!("Invalid audit action: {}", s)),
        }
    }
}
