use chrono::NaiveDate;
use thiserror::Error;

use crate::contract::model::{OrgId, UserId};

/// Domain-specific errors using thiserror
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("User not found: {id}")]
    UserNotFound { id: UserId },

    #[error("Organization not found: {id}")]
    OrganizationNotFound { id: OrgId },

    #[error("Invalid date range {start}..={end}: {reason}")]
    InvalidRange {
        start: NaiveDate,
        end: NaiveDate,
        reason: String,
    },

    #[error("Database error: {message}")]
    Database { message: String },
}

impl DomainError {
    pub fn user_not_found(id: UserId) -> Self {
        Self::UserNotFound { id }
    }

    pub fn organization_not_found(id: OrgId) -> Self {
        Self::OrganizationNotFound { id }
    }

    pub fn invalid_range(start: NaiveDate, end: NaiveDate, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            start,
            end,
            reason: reason.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for DomainError {
    fn from(e: anyhow::Error) -> Self {
        // `{:#}` keeps the repository context chain in one line.
        Self::database(format!("{e:#}"))
    }
}
