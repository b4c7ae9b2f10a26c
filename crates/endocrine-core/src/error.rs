//! Shared error type across endocrine crates.

use thiserror::Error;

/// Stable error codes (used in logs and by embedding code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid or incomplete configuration.
    Config,
    /// Certificate could not be read or parsed.
    Certificate,
    /// CA fingerprint computation failed.
    Fingerprint,
    /// Broker engine reported a failure.
    Engine,
    /// Advertisement could not be started or stopped.
    Advertisement,
    /// Startup sequence did not reach ready.
    StartupFailed,
    /// Filesystem / IO failure.
    Io,
    /// Internal server error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Config => "CONFIG",
            ErrorCode::Certificate => "CERTIFICATE",
            ErrorCode::Fingerprint => "FINGERPRINT",
            ErrorCode::Engine => "ENGINE",
            ErrorCode::Advertisement => "ADVERTISEMENT",
            ErrorCode::StartupFailed => "STARTUP_FAILED",
            ErrorCode::Io => "IO",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, EndocrineError>;

/// Unified error type used by core and broker.
///
/// Cloneable so a single startup or shutdown outcome can be handed to every
/// waiter.
#[derive(Debug, Clone, Error)]
pub enum EndocrineError {
    #[error("invalid config: {0}")]
    Config(String),
    #[error("certificate: {0}")]
    Certificate(String),
    #[error("fingerprint failed: {0}")]
    Fingerprint(String),
    #[error("engine: {0}")]
    Engine(String),
    #[error("advertisement: {0}")]
    Advertisement(String),
    #[error("startup failed: {0}")]
    StartupFailed(String),
    #[error("io: {0}")]
    Io(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl EndocrineError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            EndocrineError::Config(_) => ErrorCode::Config,
            EndocrineError::Certificate(_) => ErrorCode::Certificate,
            EndocrineError::Fingerprint(_) => ErrorCode::Fingerprint,
            EndocrineError::Engine(_) => ErrorCode::Engine,
            EndocrineError::Advertisement(_) => ErrorCode::Advertisement,
            EndocrineError::StartupFailed(_) => ErrorCode::StartupFailed,
            EndocrineError::Io(_) => ErrorCode::Io,
            EndocrineError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<std::io::Error> for EndocrineError {
    fn from(e: std::io::Error) -> Self {
        EndocrineError::Io(e.to_string())
    }
}
