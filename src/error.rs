//! Application-wide error types.
//!
//! Library modules define their own error types via `thiserror`
//! ([`ServiceError`](crate::service::ServiceError),
//! [`FetchError`](crate::fetch::FetchError), ...). This module aggregates them
//! into [`Error`] for the download orchestration, while the CLI uses `anyhow`
//! at the very top.
//!
//! # Example
//!
//! ```ignore
//! use music_courier::error::{Error, Result, ResultExt};
//!
//! fn prepare(dir: &Path) -> Result<()> {
//!     std::fs::create_dir_all(dir).with_context("creating album directory")?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A music service call failed
    #[error("Service error: {0}")]
    Service(#[from] crate::service::ServiceError),

    /// Downloading a media payload or asset failed
    #[error("Download error: {0}")]
    Fetch(#[from] crate::fetch::FetchError),

    /// Writing tags into an audio file failed
    #[error("Tag error for {path}: {message}")]
    TagWrite { path: PathBuf, message: String },

    /// A path template could not be parsed or expanded
    #[error("Template error: {0}")]
    Template(#[from] crate::organizer::TemplateError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The user interrupted the run
    #[error("Interrupted")]
    Interrupted,

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a tag write error.
    pub fn tag_write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::TagWrite {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) is a user interruption.
    pub fn is_interrupted(&self) -> bool {
        match self {
            Error::Interrupted => true,
            Error::Fetch(crate::fetch::FetchError::Interrupted) => true,
            Error::WithContext { source, .. } => source.is_interrupted(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, crate::service::ServiceError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Service(e).context(ctx))
    }
}
