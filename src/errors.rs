//! Error handling for the RiseTech portal.
//!
//! `PortalError` covers every failure the session core and its collaborator
//! clients can report. Lookup failures inside the session resolver are
//! recovered locally; everything else propagates with `?` and reaches HTTP
//! callers as an `AppError`.

use thiserror::Error;

/// Main error type for the portal
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Authentication error: {message}")]
    Auth { message: String },

    #[error("Profile store returned {status}: {message}")]
    ProfileStore { status: u16, message: String },

    #[error("Mutex lock failed: {resource}")]
    MutexPoisoned { resource: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Network operation failed: {operation}")]
    Network {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Type alias for Result with PortalError
pub type PortalResult<T> = Result<T, PortalError>;

impl PortalError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a profile store error from a non-success HTTP status
    pub fn profile_store(status: u16, message: impl Into<String>) -> Self {
        Self::ProfileStore {
            status,
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            operation: operation.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Poison-safe locking for the std mutexes shared between handlers and the
/// resolver task.
pub trait SafeLock<T: ?Sized> {
    /// Safely lock a mutex, returning a PortalError on poison
    fn safe_lock(&self) -> PortalResult<std::sync::MutexGuard<'_, T>>;
}

impl<T: ?Sized> SafeLock<T> for std::sync::Mutex<T> {
    fn safe_lock(&self) -> PortalResult<std::sync::MutexGuard<'_, T>> {
        self.lock().map_err(|_| PortalError::MutexPoisoned {
            resource: std::any::type_name::<T>().to_string(),
        })
    }
}

impl From<figment::Error> for PortalError {
    fn from(err: figment::Error) -> Self {
        PortalError::config(err.to_string())
    }
}
