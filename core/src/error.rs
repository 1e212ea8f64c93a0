use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PmsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("No active plan share configuration for category '{category}' (branch '{branch_code}')")]
    ConfigurationMissing { category: String, branch_code: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Staff '{actor_id}' is not allowed to {action}")]
    Authorization { actor_id: String, action: String },

    #[error("No staff plan found for staff '{staff_id}' in period '{period}'")]
    NoPlanFound { staff_id: String, period: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PmsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(actor_id: &str, action: impl Into<String>) -> Self {
        Self::Authorization {
            actor_id: actor_id.to_string(),
            action: action.into(),
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::ConfigurationMissing { .. } => "configuration_missing",
            Self::Conflict(_) => "conflict",
            Self::Authorization { .. } => "authorization_error",
            Self::NoPlanFound { .. } => "no_plan_found",
            Self::Database(_)
            | Self::Serialization(_)
            | Self::Csv(_)
            | Self::Io(_)
            | Self::Other(_) => "internal_error",
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Structured failure handed to whatever sits in front of the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: &'static str,
    pub message: String,
}

pub type PmsResult<T> = Result<T, PmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(PmsError::validation("x").kind(), "validation_error");
        assert_eq!(PmsError::not_found("plan", "p1").kind(), "not_found");
        let err = PmsError::NoPlanFound {
            staff_id: "s1".into(),
            period: "2025".into(),
        };
        assert_eq!(err.kind(), "no_plan_found");
        assert_eq!(
            err.to_failure().message,
            "No staff plan found for staff 's1' in period '2025'"
        );
    }
}
