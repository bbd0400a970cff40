use thiserror::Error;

use crate::page::PageError;

/// Errors surfaced by the form automation engine. Field-level failures
/// (`ElementNotFound`, `FillValidation`) are recovered by skipping the field;
/// job-level failures (`NavigationFailed`, `LoginWall` declined) mark the job
/// failed in the ledger and the batch moves on.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no element matched '{0}' after exhausting all resolver strategies")]
    ElementNotFound(String),

    #[error("fill verification failed for '{field}': expected '{expected}', got '{actual}'")]
    FillValidation {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("could not reach the application form: {0}")]
    NavigationFailed(String),

    #[error("login wall detected ({0}); human assistance declined or unavailable")]
    LoginWall(String),

    #[error(transparent)]
    Page(#[from] PageError),
}

/// Soft failures from the AI backend. These never leave the decision engine;
/// every variant degrades to the heuristic selector.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI backend not configured or unreachable: {0}")]
    Unavailable(String),

    #[error("AI request timed out after {0}s")]
    Timeout(u64),

    #[error("AI API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("AI returned empty content")]
    Empty,
}
