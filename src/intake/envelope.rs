//! The JSON shapes we return to clients.

use schemars::JsonSchema;

use crate::prelude::*;

use super::{
    classify::FileClassification,
    document::{CniLanguage, DocumentRequest},
};

/// Metadata describing one processed file.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct FileMetadata {
    /// The name of the file inside a ZIP archive. Only present for bulk
    /// uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    /// The request path that produced this result.
    pub file_url: String,

    /// The file's extension, uppercased, or `UNKNOWN`.
    pub file_type: String,

    /// When the file was created (`YYYY-MM-DD`), or `UNKNOWN`.
    pub file_creation_date: String,

    /// The document language. Only present for identity documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<CniLanguage>,
}

impl FileMetadata {
    /// Build metadata for a classified file.
    pub fn new(
        classification: FileClassification,
        request: &DocumentRequest,
        request_path: &str,
    ) -> Self {
        Self {
            source_file: None,
            file_url: request_path.to_owned(),
            file_type: classification.file_type,
            file_creation_date: classification.creation_date,
            language: request.language(),
        }
    }
}

/// The result of processing one file.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ResponseEnvelope {
    /// What we know about the file.
    pub file_metadata: FileMetadata,

    /// One entry per OCR result, in page order.
    pub details: Vec<Value>,
}

/// Combine metadata and OCR details into a response.
pub fn assemble(file_metadata: FileMetadata, details: Vec<Value>) -> ResponseEnvelope {
    ResponseEnvelope {
        file_metadata,
        details,
    }
}

/// Metadata for an archive entry that failed.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct FailureMetadata {
    /// The name of the file inside the ZIP archive.
    pub source_file: String,

    /// Always `true`.
    pub error: bool,
}

/// A failed archive entry, as sent on the wire.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct FailureEnvelope {
    pub file_metadata: FailureMetadata,

    /// A single human-readable error message.
    pub details: Vec<String>,
}

/// One entry in a bulk response.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum Fragment {
    /// A failed entry. Listed first so that deserialization tries the
    /// stricter shape first.
    Failure(FailureEnvelope),
    /// A successfully processed entry.
    Success(ResponseEnvelope),
}

impl Fragment {
    /// Build a failure fragment.
    pub fn failure(source_file: impl Into<String>, message: impl Into<String>) -> Self {
        Fragment::Failure(FailureEnvelope {
            file_metadata: FailureMetadata {
                source_file: source_file.into(),
                error: true,
            },
            details: vec![message.into()],
        })
    }

    /// Did this entry fail?
    pub fn is_failure(&self) -> bool {
        matches!(self, Fragment::Failure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::document::DocumentKind;

    #[test]
    fn identity_metadata_includes_language() {
        let request =
            DocumentRequest::validate(DocumentKind::CniFront, Some(CniLanguage::Fr)).unwrap();
        let classification = FileClassification {
            file_type: "PNG".to_owned(),
            creation_date: "UNKNOWN".to_owned(),
        };
        let envelope = assemble(
            FileMetadata::new(classification, &request, "/ocr/smalter/cni_front"),
            vec![json!({ "nom": "DUPONT" })],
        );
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "file_metadata": {
                    "file_url": "/ocr/smalter/cni_front",
                    "file_type": "PNG",
                    "file_creation_date": "UNKNOWN",
                    "language": "fr",
                },
                "details": [{ "nom": "DUPONT" }],
            })
        );
    }

    #[test]
    fn failure_wire_format() {
        let fragment = Fragment::failure("scans/b.jpg", "model unavailable");
        assert_eq!(
            serde_json::to_value(&fragment).unwrap(),
            json!({
                "file_metadata": { "source_file": "scans/b.jpg", "error": true },
                "details": ["model unavailable"],
            })
        );
        assert!(fragment.is_failure());
    }
}
