use thiserror::Error;

/// Every failure the bank can report.
///
/// The first four variants are business outcomes: they are detected before
/// any state changes and are returned to the caller as ordinary responses.
/// The rest are faults that the dispatcher turns into a generic error reply.
#[derive(Error, Debug)]
pub enum BankError {
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("authentication error")]
    AuthError,
    #[error("insufficient funds")]
    InsufficientFundsError,
    #[error("{0}")]
    ProtocolError(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl BankError {
    /// True when a business rule rejected the request, as opposed to the
    /// request being malformed or the service failing.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotFoundError(_) | Self::AuthError | Self::InsufficientFundsError
        )
    }

    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::InternalError(_) | Self::IoError(_) | Self::JsonError(_)
        )
    }

    pub(crate) fn timed_out(what: &str) -> Self {
        Self::IoError(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{what} timed out"),
        ))
    }
}

pub type Result<T> = std::result::Result<T, BankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_business_outcomes() {
        assert!(BankError::AuthError.is_rejection());
        assert!(BankError::InsufficientFundsError.is_rejection());
        assert!(BankError::NotFoundError("account not found".into()).is_rejection());
        assert!(!BankError::ValidationError("bad".into()).is_rejection());
        assert!(!BankError::ProtocolError("Unknown action".into()).is_rejection());
    }

    #[test]
    fn test_timeout_is_internal() {
        let err = BankError::timed_out("read");
        assert!(err.is_internal());
        assert_eq!(err.to_string(), "IO error: read timed out");
    }
}
