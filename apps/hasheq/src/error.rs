//! # Application Errors
//!
//! Errors raised by the binary itself: configuration, file I/O, server
//! startup. Ledger failures pass through unchanged.

use hasheq_core::HashEqError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// A ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] HashEqError),

    /// The configuration file or an override could not be used.
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading or writing a local file failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The HTTP server could not start or stopped abnormally.
    #[error("server error: {0}")]
    Server(String),
}
