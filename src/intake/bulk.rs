//! Read every supported document in a ZIP archive.

use std::sync::Arc;

use futures::{StreamExt as _, stream};

use crate::prelude::*;

use super::{
    archive::{ArchiveEntry, expand},
    document::DocumentRequest,
    envelope::{Fragment, ResponseEnvelope},
    error::IntakeError,
    processor::DocumentProcessor,
};

/// Runs a [`DocumentProcessor`] over each entry of an archive.
pub struct BulkDispatcher {
    processor: Arc<DocumentProcessor>,
    scratch_root: Option<PathBuf>,
}

impl BulkDispatcher {
    /// Create a new dispatcher. Archives are expanded under `scratch_root`,
    /// or the system temporary directory if that's `None`.
    pub fn new(processor: Arc<DocumentProcessor>, scratch_root: Option<PathBuf>) -> Self {
        Self {
            processor,
            scratch_root,
        }
    }

    /// Process an archive, returning one fragment per supported entry, in
    /// entry order.
    ///
    /// Failures of individual entries become [`Fragment::Failure`] values.
    /// Only an unusable archive or an ineligible document kind fails the
    /// whole call.
    #[instrument(level = "debug", skip_all, fields(kind = %request.kind()))]
    pub async fn dispatch_bulk(
        &self,
        data: Vec<u8>,
        request: &DocumentRequest,
        request_path: &str,
    ) -> Result<Vec<Fragment>, IntakeError> {
        if !request.kind().bulk_eligible() {
            return Err(IntakeError::BulkNotSupported(request.kind().to_string()));
        }

        // Holds the scratch directory until we're done, or until this future
        // is dropped.
        let expanded = expand(data, self.scratch_root.as_deref()).await?;
        info!(entries = expanded.entries().len(), "Processing archive");
        debug!(scratch_dir = %expanded.path().display(), "Expanded archive");

        // One entry at a time. The OCR engine is the bottleneck, and it has
        // its own concurrency limit.
        let fragments = stream::iter(expanded.entries())
            .then(|entry| async move {
                match self.process_entry(entry, request, request_path).await {
                    Ok(envelope) => Fragment::Success(envelope),
                    Err(err) => {
                        warn!(source_file = %entry.name, "Failed to process archive entry: {err}");
                        Fragment::failure(entry.name.clone(), err.to_string())
                    }
                }
            })
            .collect::<Vec<_>>()
            .await;

        drop(expanded);
        let failed = fragments.iter().filter(|f| f.is_failure()).count();
        info!(total = fragments.len(), failed, "Processed archive");
        Ok(fragments)
    }

    async fn process_entry(
        &self,
        entry: &ArchiveEntry,
        request: &DocumentRequest,
        request_path: &str,
    ) -> Result<ResponseEnvelope, IntakeError> {
        let data = tokio::fs::read(&entry.path).await?;
        let mut envelope = self
            .processor
            .process_document(&entry.name, &data, request, request_path)
            .await?;
        envelope.file_metadata.source_file = Some(entry.name.clone());
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        intake::{
            document::{CniLanguage, DocumentKind},
            processor::tests::stub_processor,
        },
        test_support::{jpeg_bytes, png_bytes, zip_bytes},
    };

    fn dispatcher(scratch: &Path) -> BulkDispatcher {
        BulkDispatcher::new(
            Arc::new(stub_processor(Some(scratch))),
            Some(scratch.to_owned()),
        )
    }

    fn cni_front() -> DocumentRequest {
        DocumentRequest::validate(DocumentKind::CniFront, Some(CniLanguage::Fr)).unwrap()
    }

    fn scratch_is_empty(root: &Path) -> bool {
        fs::read_dir(root).unwrap().next().is_none()
    }

    fn source_file(fragment: &Fragment) -> &str {
        match fragment {
            Fragment::Failure(failure) => &failure.file_metadata.source_file,
            Fragment::Success(envelope) => envelope.file_metadata.source_file.as_deref().unwrap(),
        }
    }

    #[tokio::test]
    async fn one_fragment_per_supported_entry() {
        let scratch = tempfile::tempdir().unwrap();
        let (png, jpeg) = (png_bytes(), jpeg_bytes());
        let data = zip_bytes(&[
            ("b.jpg", &jpeg[..]),
            ("notes.txt", &b"ignore me"[..]),
            ("a.png", &png[..]),
        ]);
        let fragments = dispatcher(scratch.path())
            .dispatch_bulk(data, &cni_front(), "/ocr/smalter/cni_front")
            .await
            .unwrap();

        assert_eq!(fragments.len(), 2);
        assert_eq!(source_file(&fragments[0]), "a.png");
        assert_eq!(source_file(&fragments[1]), "b.jpg");
        let Fragment::Success(envelope) = &fragments[1] else {
            panic!("expected success");
        };
        assert_eq!(envelope.file_metadata.file_type, "JPG");
        assert_eq!(envelope.file_metadata.language, Some(CniLanguage::Fr));
        assert_eq!(envelope.file_metadata.file_url, "/ocr/smalter/cni_front");
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let scratch = tempfile::tempdir().unwrap();
        let png = png_bytes();
        let data = zip_bytes(&[
            ("1.png", &png[..]),
            ("2-broken.png", &png[..]),
            ("3.png", &b"not really a png"[..]),
            ("4.png", &png[..]),
        ]);
        let fragments = dispatcher(scratch.path())
            .dispatch_bulk(data, &cni_front(), "/ocr/smalter/cni_front")
            .await
            .unwrap();

        let failed = fragments
            .iter()
            .filter(|f| f.is_failure())
            .map(source_file)
            .collect::<Vec<_>>();
        assert_eq!(fragments.len(), 4);
        assert_eq!(failed, vec!["2-broken.png", "3.png"]);
        let wire = serde_json::to_value(&fragments[1]).unwrap();
        assert_eq!(wire["file_metadata"]["error"], json!(true));
        assert!(wire["details"][0].as_str().unwrap().contains("model refused"));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn hidden_entries_with_supported_extensions_are_reported() {
        let scratch = tempfile::tempdir().unwrap();
        let png = png_bytes();
        let data = zip_bytes(&[
            ("a.png", &png[..]),
            (".scan.png", &png[..]),
            ("__MACOSX/._b.png", &b"resource fork"[..]),
        ]);
        let fragments = dispatcher(scratch.path())
            .dispatch_bulk(data, &cni_front(), "/ocr/smalter/cni_front")
            .await
            .unwrap();

        let names = fragments.iter().map(source_file).collect::<Vec<_>>();
        assert_eq!(names, vec![".scan.png", "__MACOSX/._b.png", "a.png"]);
        assert!(!fragments[0].is_failure());
        assert!(fragments[1].is_failure());
        assert!(!fragments[2].is_failure());
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn work_contracts_are_eligible() {
        let scratch = tempfile::tempdir().unwrap();
        let png = png_bytes();
        let request = DocumentRequest::validate(DocumentKind::WorkContract, None).unwrap();
        let fragments = dispatcher(scratch.path())
            .dispatch_bulk(
                zip_bytes(&[("contracts/c1.png", &png[..])]),
                &request,
                "/ocr/smalter/work_contract",
            )
            .await
            .unwrap();
        let wire = serde_json::to_value(&fragments).unwrap();
        assert_eq!(wire[0]["file_metadata"]["source_file"], json!("contracts/c1.png"));
        assert!(wire[0]["file_metadata"].get("language").is_none());
        assert_eq!(wire[0]["details"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ineligible_kinds_are_rejected_before_expansion() {
        let scratch = tempfile::tempdir().unwrap();
        let request = DocumentRequest::validate(DocumentKind::Resume, None).unwrap();
        let err = dispatcher(scratch.path())
            .dispatch_bulk(zip_bytes(&[]), &request, "/ocr/smalter/resume")
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::BulkNotSupported(ref k) if k == "resume"));
        assert_eq!(err.to_string(), "Bulk processing for 'resume' is not supported.");
    }

    #[tokio::test]
    async fn malformed_archives_fail_the_call_and_leave_nothing() {
        let scratch = tempfile::tempdir().unwrap();
        let err = dispatcher(scratch.path())
            .dispatch_bulk(b"PK\x03\x04 truncated".to_vec(), &cni_front(), "/ocr/smalter/cni_front")
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::ArchiveFormat(_)));
        assert!(scratch_is_empty(scratch.path()));
    }
}
