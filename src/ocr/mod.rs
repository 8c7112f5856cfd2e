//! The OCR collaborator.
//!
//! The intake pipeline only knows about [`OcrEngine`]. In production that's
//! an [`llm::LlmOcrEngine`], which asks a vision model to read each page.

use crate::{
    intake::document::{CniLanguage, DocumentKind},
    pages::Page,
    prelude::*,
};

pub mod llm;

/// Everything an OCR engine needs to read one document.
#[derive(Debug)]
pub struct OcrRequest<'a> {
    /// The file name, for logs and prompts.
    pub source_name: &'a str,
    /// What kind of document this is.
    pub kind: DocumentKind,
    /// The document language, for identity documents.
    pub language: Option<CniLanguage>,
    /// The pages to read, in order.
    pub pages: &'a [Page],
}

/// What an OCR engine returned.
#[derive(Clone, Debug, PartialEq)]
pub enum OcrPayload {
    /// A single result for the whole document.
    Single(Value),
    /// Several results, in order.
    Many(Vec<Value>),
}

impl OcrPayload {
    /// Wrap a JSON value. Arrays become [`OcrPayload::Many`].
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(values) => OcrPayload::Many(values),
            other => OcrPayload::Single(other),
        }
    }

    /// Flatten into the `details` list of a response.
    pub fn into_details(self) -> Vec<Value> {
        match self {
            OcrPayload::Single(value) => vec![value],
            OcrPayload::Many(values) => values,
        }
    }
}

/// Interface for OCR engines.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Read the pages in `request`.
    async fn run_ocr(&self, request: OcrRequest<'_>) -> Result<OcrPayload>;
}
