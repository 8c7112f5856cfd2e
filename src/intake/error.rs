//! Errors that clients of the intake service can see.

use axum::http::StatusCode;

use crate::pages::PageError;

/// An error reading one document or one archive.
///
/// Each variant maps to exactly one HTTP status, via
/// [`IntakeError::status_code`].
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// An identity document was submitted without a language.
    #[error("The 'lang' parameter is required for CNI documents.")]
    MissingLanguage,

    /// A ZIP archive was submitted for a kind that can't be read in bulk.
    #[error("Bulk processing for '{0}' is not supported.")]
    BulkNotSupported(String),

    /// We don't know how to read this file type.
    #[error("Unsupported file type: {0}.")]
    UnsupportedFormat(String),

    /// The bytes could not be turned into an image.
    #[error("{0}")]
    Decode(String),

    /// The ZIP archive itself was unreadable.
    #[error("Bulk processing failed: {0:#}")]
    ArchiveFormat(anyhow::Error),

    /// The OCR engine or another collaborator failed.
    #[error("{0:#}")]
    Collaborator(anyhow::Error),

    /// We couldn't manage our scratch storage.
    #[error("Bulk processing failed: {0}")]
    Scratch(#[from] std::io::Error),

    /// The HTTP request itself was malformed.
    #[error("{0}")]
    BadRequest(String),
}

impl IntakeError {
    /// The HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            IntakeError::MissingLanguage
            | IntakeError::BulkNotSupported(_)
            | IntakeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            IntakeError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IntakeError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IntakeError::ArchiveFormat(_)
            | IntakeError::Collaborator(_)
            | IntakeError::Scratch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PageError> for IntakeError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::Unsupported(file_type) => IntakeError::UnsupportedFormat(file_type),
            err @ PageError::Decode(_) => IntakeError::Decode(err.to_string()),
            PageError::Internal(err) => IntakeError::Collaborator(err),
        }
    }
}
