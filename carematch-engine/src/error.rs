//! Error types for the matching engine

use crate::scoring::EligibilityIssue;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Error type for engine operations
///
/// Every variant carries a stable machine-readable code via
/// [`EngineError::code`]; user messages are never load-bearing.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Input failed schema or domain rules
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity absent
    #[error("{entity} {id} not found")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    /// Optimistic-concurrency mismatch or illegal state transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The domain rejected an action on eligibility grounds
    #[error("Eligibility check failed: {}", issue_summary(.issues))]
    Eligibility { issues: Vec<EligibilityIssue> },

    /// Caller lacks the required permission
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Store or inference call failed for I/O reasons; retryable
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Invariant violated; the operation cannot be recovered
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::Conflict(_) => "CONFLICT",
            EngineError::Eligibility { .. } => "NOT_ELIGIBLE",
            EngineError::Unauthorized(_) => "UNAUTHORIZED",
            EngineError::Transient(_) => "TRANSIENT",
            EngineError::Fatal(_) => "FATAL",
        }
    }

    /// Whether the caller may retry the operation as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    /// Conflict from an optimistic version check
    pub fn stale_version(entity: &'static str, expected: u64, found: u64) -> Self {
        EngineError::Conflict(format!(
            "{} version mismatch: expected {}, found {}",
            entity, expected, found
        ))
    }

    /// Conflict from an illegal state transition
    pub fn invalid_transition(entity: &'static str, from: &str, to: &str) -> Self {
        EngineError::Conflict(format!(
            "invalid {} transition from {} to {}",
            entity, from, to
        ))
    }

    /// Shorthand for a missing entity
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Retry an I/O-bound operation on transient failures
///
/// Bounded exponential backoff: base 100 ms, factor 2, cap 1 s, at
/// most 3 attempts. Non-transient errors pass through untouched.
pub async fn with_retries<T, F, Fut>(op_name: &'static str, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = EngineResult<T>>,
{
    let mut delay = std::time::Duration::from_millis(100);
    let mut attempt = 1u32;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < 3 => {
                tracing::warn!(op = op_name, attempt, error = %e, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(std::time::Duration::from_secs(1));
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn issue_summary(issues: &[EligibilityIssue]) -> String {
    issues
        .iter()
        .map(|i| i.kind.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
