//! Read a single document.

use std::sync::Arc;

use crate::{
    ocr::{OcrEngine, OcrRequest},
    pages::{PageOptions, load_pages},
    prelude::*,
};

use super::{
    classify::{FileClassification, classify},
    document::DocumentRequest,
    envelope::{FileMetadata, ResponseEnvelope, assemble},
    error::IntakeError,
};

/// Turns one uploaded file into a [`ResponseEnvelope`].
pub struct DocumentProcessor {
    engine: Arc<dyn OcrEngine>,
    page_options: PageOptions,
}

impl DocumentProcessor {
    /// Create a new processor around a shared OCR engine.
    pub fn new(engine: Arc<dyn OcrEngine>, page_options: PageOptions) -> Self {
        Self {
            engine,
            page_options,
        }
    }

    /// Load the pages of one file and OCR them, returning the `details`
    /// list.
    #[instrument(level = "debug", skip_all, fields(%name, kind = %request.kind()))]
    pub async fn process_one(
        &self,
        name: &str,
        data: &[u8],
        classification: &FileClassification,
        request: &DocumentRequest,
    ) -> Result<Vec<Value>, IntakeError> {
        let pages = load_pages(
            &classification.file_type,
            data,
            request.kind().page_selection(),
            &self.page_options,
        )
        .await?;
        debug!(pages = pages.len(), "Loaded pages");

        let payload = self
            .engine
            .run_ocr(OcrRequest {
                source_name: name,
                kind: request.kind(),
                language: request.language(),
                pages: &pages,
            })
            .await
            .map_err(IntakeError::Collaborator)?;
        Ok(payload.into_details())
    }

    /// Classify, OCR and assemble one file.
    pub async fn process_document(
        &self,
        name: &str,
        data: &[u8],
        request: &DocumentRequest,
        request_path: &str,
    ) -> Result<ResponseEnvelope, IntakeError> {
        let classification = classify(name, data);
        let details = self
            .process_one(name, data, &classification, request)
            .await?;
        Ok(assemble(
            FileMetadata::new(classification, request, request_path),
            details,
        ))
    }
}
