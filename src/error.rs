use sled::transaction::TransactionError;

#[derive(thiserror::Error, Debug)]
pub enum LeaveError {
    /// Bad input caught before any write, shown to the user as-is
    #[error("{0}")]
    Validation(String),
    /// Wrong role or state for the requested action
    #[error("{0}")]
    Unauthorized(String),
    /// Read-then-check conflicts (overlaps, duplicate names, taken roles)
    #[error("{0}")]
    Conflict(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode or decode record: {0}")]
    Encoding(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl LeaveError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<minicbor::decode::Error> for LeaveError {
    fn from(value: minicbor::decode::Error) -> Self {
        Self::Encoding(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for LeaveError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        Self::Encoding(value.to_string())
    }
}

impl From<TransactionError<LeaveError>> for LeaveError {
    fn from(value: TransactionError<LeaveError>) -> Self {
        match value {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => Self::Storage(e),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum NotificationError {
    #[error("notifications are disabled")]
    Disabled,
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("email API returned HTTP {0}")]
    HttpStatus(u16),
    #[error("email API rejected the message: {0}")]
    Rejected(String),
    #[error("notification send timed out")]
    TimedOut,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

pub type Result<T, E = LeaveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_display_verbatim() {
        let err = LeaveError::unauthorized("Team lead cannot approve their own request.");
        assert_eq!(err.to_string(), "Team lead cannot approve their own request.");

        let err = LeaveError::conflict("This request overlaps with an existing leave request.");
        assert_eq!(
            err.to_string(),
            "This request overlaps with an existing leave request."
        );
    }

    #[test]
    fn transaction_abort_unwraps_to_inner_error() {
        let err: LeaveError =
            TransactionError::Abort(LeaveError::validation("Reason is required.")).into();
        assert!(matches!(err, LeaveError::Validation(msg) if msg == "Reason is required."));
    }
}
