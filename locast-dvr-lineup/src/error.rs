//! Error types for lineup and device document rendering.

use thiserror::Error;

/// Errors raised while building the documents served to DVR clients.
#[derive(Error, Debug)]
pub enum LineupError {
    /// An XML document could not be written.
    #[error("Failed to write XML document: {0}")]
    Xml(#[from] xmltree::Error),

    /// A rendered XML document was not valid UTF-8.
    #[error("XML document is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
