//! Producer contract.
//!
//! A producer is any agent that, given the user input, returns one
//! [`Finding`]. Built-in producers live in [`crate::producers`]; callers can
//! supply their own by implementing [`Producer`].

use std::time::Duration;

use crate::BoxFuture;
use crate::model::Finding;

/// An agent that contributes one finding per query.
///
/// Object safe, so producers can be shared as `Arc<dyn Producer>` and run on
/// separate tasks.
pub trait Producer: Send + Sync {
    /// Unique id. Every finding this producer returns must carry it.
    fn id(&self) -> &str;

    /// A short description of what this producer looks at.
    fn description(&self) -> &str;

    /// Do the work for `input` and export a finding.
    fn run(&self, input: &str) -> BoxFuture<'_, Result<Finding, ProducerError>>;
}

/// Errors from producer execution.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("producer execution failed: {0}")]
    Execution(String),

    #[error("producer timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("finding carries producer id '{actual}', expected '{expected}'")]
    IdMismatch { expected: String, actual: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("producer task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for ProducerError {
    fn from(e: reqwest::Error) -> Self {
        ProducerError::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProducerError::IdMismatch {
            expected: "pricing".to_string(),
            actual: "product".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "finding carries producer id 'product', expected 'pricing'"
        );

        let err = ProducerError::Timeout {
            after: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "producer timed out after 2s");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ProducerError = io.into();
        assert!(matches!(err, ProducerError::Io(_)));
    }
}
