use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("Maximum retries ({0}) exceeded: {1}")]
    MaxRetriesExceeded(u32, String),

    #[error("Non-retryable failure: {0}")]
    NonRetryable(String),

    #[error("Retry interrupted by shutdown signal")]
    Interrupted,
}

impl RetryError {
    pub fn is_max_retries(&self) -> bool {
        matches!(self, RetryError::MaxRetriesExceeded(_, _))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, RetryError::Interrupted)
    }

    /// Description of the last failure, if the operation ran at all
    pub fn reason(&self) -> String {
        match self {
            RetryError::MaxRetriesExceeded(attempts, msg) => {
                format!("gave up after {} attempts: {}", attempts, msg)
            }
            RetryError::NonRetryable(msg) => msg.clone(),
            RetryError::Interrupted => "interrupted by shutdown".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_describes_last_failure() {
        let reason = RetryError::MaxRetriesExceeded(3, "throttled".to_string()).reason();
        assert!(reason.contains("3 attempts"));
        assert!(reason.contains("throttled"));
        assert_eq!(RetryError::Interrupted.reason(), "interrupted by shutdown");
    }

    #[test]
    fn test_predicates() {
        assert!(RetryError::MaxRetriesExceeded(1, String::new()).is_max_retries());
        assert!(RetryError::Interrupted.is_interrupted());
        assert!(!RetryError::NonRetryable("denied".into()).is_max_retries());
        assert_eq!(RetryError::NonRetryable("denied".into()).reason(), "denied");
    }
}
