//! Document intake: single files and ZIP archives in, JSON envelopes out.
//!
//! A request is first validated into a [`document::DocumentRequest`]. Single
//! files go straight to the [`processor::DocumentProcessor`]. ZIP archives go
//! to the [`bulk::BulkDispatcher`], which expands them into a scratch
//! directory and runs the processor over each supported entry in turn.

pub mod archive;
pub mod bulk;
pub mod classify;
pub mod document;
pub mod envelope;
pub mod error;
pub mod processor;

/// Is this upload a ZIP archive?
pub fn is_archive_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".zip")
}
