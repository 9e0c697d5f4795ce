//! Error types for retick-engine

use thiserror::Error;

/// Result type for retick-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in retick-engine
#[derive(Debug, Error)]
pub enum Error {
    /// `step()` called after the engine exited
    #[error("engine has exited; reset it before stepping again")]
    Exited,

    /// Configuration text could not be parsed
    #[error("config parse error: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// Configuration could not be rendered as RON
    #[error("config render error: {0}")]
    Render(#[from] ron::Error),

    /// Core error (rule registration or rule fault)
    #[error("core error: {0}")]
    Core(#[from] retick_core::Error),
}

impl Error {
    /// Check whether this is a registration error raised at construction
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            Error::Core(
                retick_core::Error::UnresolvedInhibitor { .. }
                    | retick_core::Error::AmbiguousInhibitor { .. }
            )
        )
    }
}

// Compile-time check that Error is Send + Sync for thread-safe error propagation.
// This function is never called but will fail to compile if the bound is not satisfied.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
