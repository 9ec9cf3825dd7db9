use thiserror::Error;

/// Failures surfaced by every wty component.
///
/// Payloads are plain strings so an outcome can be shared between
/// concurrent waiters of the same request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("No codes selected")]
    NoSelection,

    #[error("Network error: {0}")]
    Network(String),

    #[error("{message}")]
    Backend { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(String),
}

/// Coarse classification used to decide how a failure is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Terminal; shown to the user, never retried.
    NotFound,
    /// Routes back to the matching login step.
    Unauthorized,
    /// Shown inline next to the control that caused it.
    Validation,
    /// Generic retry-safe message.
    Network,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Validation(_) | Self::NoSelection | Self::Backend { .. } => ErrorKind::Validation,
            Self::Network(_) | Self::Io(_) => ErrorKind::Network,
        }
    }

    /// Message suitable for a banner. Backend messages pass through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Network error. Please try again.".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Network
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_message_is_verbatim() {
        let err = Error::Backend {
            status: 500,
            message: "Shop SHOP-9 is inactive".to_string(),
        };
        assert_eq!(err.user_message(), "Shop SHOP-9 is inactive");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_network_message_is_generic() {
        let err = Error::Network("connection reset by peer".to_string());
        assert_eq!(err.user_message(), "Network error. Please try again.");
        assert!(err.is_retryable());
        assert!(!Error::NotFound("QR code not found".into()).is_retryable());
    }

    #[test]
    fn test_no_selection_is_validation() {
        assert_eq!(Error::NoSelection.kind(), ErrorKind::Validation);
    }
}
