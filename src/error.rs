//! Error types and result handling for tankobon operations.
//!
//! Every fallible operation returns [`Result<T>`]. Pipeline failures are
//! wrapped in [`Error::Chapter`] or [`Error::Page`] so the offending
//! identifiers travel with the cause.
//!
use std::path::PathBuf;

use crate::identifier::Identifier;

/// Type alias for Results with tankobon errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all tankobon operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O errors from the standard library
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Invalid group-name pattern
    #[error(transparent)]
    Regex(#[from] regex::Error),
    /// Image encoding errors (decoding failures map to [`Error::Decode`])
    #[error(transparent)]
    Image(#[from] image::ImageError),
    /// ZIP container errors
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    /// A pipeline worker panicked or was aborted
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Semaphore(#[from] tokio::sync::AcquireError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    ConfigBuilder(#[from] crate::tankobon::TankobonConfigBuilderError),

    /// The catalog has no record for the requested id
    #[error("Not found: {0}")]
    NotFound(String),
    /// Unrecognised ranking or processing policy name
    #[error("Invalid {kind} policy: '{value}'")]
    InvalidPolicy { kind: &'static str, value: String },
    /// A network request failed after the source's own retries
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },
    /// A response body or file is not a decodable image
    #[error("Could not decode image from {origin}: {reason}")]
    Decode { origin: String, reason: String },
    /// A crop or split rectangle cannot be extracted from the image
    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(String),
    /// Filtering and ranking left no chapters to download
    #[error("No chapters left after filtering")]
    EmptyResult,
    /// The unit of work stopped because another one failed first
    #[error("Cancelled")]
    Cancelled,

    #[error("chapter {chapter}: {source}")]
    Chapter {
        chapter: Identifier,
        #[source]
        source: Box<Error>,
    },
    #[error("chapter {chapter}: image {page}: {source}")]
    Page {
        chapter: Identifier,
        page: usize,
        #[source]
        source: Box<Error>,
    },

    /// Error for invalid file or directory paths
    #[error("The given path '{0:?}' is invalid: {1}")]
    InvalidPath(PathBuf, String),
    /// Other errors that don't fit into specific categories
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    pub fn invalid_policy(kind: &'static str, value: impl Into<String>) -> Self {
        Error::InvalidPolicy {
            kind,
            value: value.into(),
        }
    }

    /// Wraps a stage failure with the chapter it belongs to.
    pub fn in_chapter(self, chapter: &Identifier) -> Self {
        Error::Chapter {
            chapter: chapter.clone(),
            source: Box::new(self),
        }
    }

    /// Wraps an image failure with its chapter and page index.
    pub fn in_page(self, chapter: &Identifier, page: usize) -> Self {
        Error::Page {
            chapter: chapter.clone(),
            page,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through chapter and page wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Chapter { source, .. } | Error::Page { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled)
    }

    /// Whether the error must stop a whole-manga run instead of a single volume.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self.root(),
            Error::NotFound(_)
                | Error::InvalidPolicy { .. }
                | Error::EmptyResult
                | Error::ConfigBuilder(_)
        )
    }
}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Error::Other(error)
    }
}

impl From<&str> for Error {
    fn from(error: &str) -> Self {
        Error::Other(error.to_string())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
