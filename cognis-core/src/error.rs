#[derive(Debug, thiserror::Error)]
pub enum CognisError {
    /// `append_event` saw a version mismatch on the conditional UPDATE.
    /// Recoverable by the engine itself up to `max_retries`; otherwise surfaced.
    #[error("concurrency conflict on session {session_id}: expected version {expected}")]
    ConcurrencyConflict { session_id: String, expected: i64 },

    /// get/delete against an unknown session, memory, fact, or job id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed id, bad scope prefix, bad JSON payload. Programmer error.
    #[error("validation error: {0}")]
    Validation(String),

    /// Database connection failed or timed out. Caller may retry.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// LM or parsing failure inside a consolidation job.
    #[error("consolidation failed: {0}")]
    Consolidation(String),

    /// A subscription consumer dropped or the matching run ended.
    #[error("subscription terminated: {0}")]
    SubscriptionTerminated(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CognisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CognisError::NotFound("session abc".into());
        assert_eq!(err.to_string(), "not found: session abc");
    }

    #[test]
    fn test_concurrency_conflict_display() {
        let err = CognisError::ConcurrencyConflict { session_id: "s1".into(), expected: 2 };
        assert!(err.to_string().contains("s1"));
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CognisError = io_err.into();
        assert!(matches!(err, CognisError::Io(_)));
    }
}
