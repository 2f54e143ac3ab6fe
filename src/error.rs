//! Error types for book-model reading.
//!
//! Per the error-handling design: only catastrophic I/O and a missing plugin
//! are fatal. Malformed input, unresolved references, unknown style
//! properties, and tag-nesting violations are absorbed by the affected
//! reader and logged via [`log::warn!`] instead of surfacing here.

use thiserror::Error;

/// Errors that can occur while reading a book into its model.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("Missing required element: {0}")]
    MissingElement(String),

    #[error("no plugin registered for file type {0:?}")]
    PluginNotFound(String),

    #[error("cache allocator failed: {0}")]
    AllocatorFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
