use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskPayError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Daily task quota exhausted")]
    QuotaExhausted,

    #[error("{count} required question(s) still unanswered")]
    MissingAnswers { count: usize },

    #[error("Withdrawal eligibility not met: {0}")]
    Eligibility(String),

    #[error("Payment failed: {0}")]
    Payment(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TaskPayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaskPayError>;
