use thiserror::Error;

/// Input rejected before any state is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Timer duration must be positive, got {0}ms")]
    NonPositiveDuration(i64),

    #[error("Warning threshold {warning_ms}ms exceeds timer duration {duration_ms}ms")]
    WarningExceedsDuration { warning_ms: u64, duration_ms: u64 },

    #[error("{0}")]
    Invalid(String),
}
