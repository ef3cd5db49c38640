//! High-level error types

pub use punchwire_core::ErrorKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] punchwire_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] punchwire_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] punchwire_types::Error),

    #[error("Store error: {0}")]
    Store(Box<dyn std::error::Error + Send + Sync>),

    #[error("Device clock reading is not a valid timestamp: {0}")]
    InvalidClock(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Wrap a persistence failure
    pub fn store(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Store(err.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) => e.kind(),
            Self::Transport(_) => ErrorKind::Transport,
            Self::Types(_) => ErrorKind::Validation,
            Self::Store(_) => ErrorKind::Store,
            Self::InvalidClock(_) => ErrorKind::Protocol,
            Self::NotSupported(_) => ErrorKind::Unsupported,
        }
    }

    /// Check if a retry of the whole operation might succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_recoverable(),
            Self::Transport(e) => e.requires_reconnect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_layer() {
        let err: Error = punchwire_transport::Error::ReadTimeout.into();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_recoverable());

        let err: Error = punchwire_core::Error::InvalidCredential("12a".into()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_recoverable());

        let err = Error::store("disk full");
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(err.to_string(), "Store error: disk full");
    }
}
