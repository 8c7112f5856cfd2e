//! OCR using a vision-capable chat model.

use std::sync::Arc;

use crate::{
    drivers::ReplyFormat,
    llm::LlmClient,
    pages::{Page, PageSelection},
    prelude::*,
    prompt::{JsonObject, PromptLibrary},
};

use super::{OcrEngine, OcrPayload, OcrRequest};

/// An [`OcrEngine`] that sends page images to an LLM.
pub struct LlmOcrEngine {
    llm: Arc<LlmClient>,
    prompts: PromptLibrary,
}

impl LlmOcrEngine {
    /// Create a new engine.
    pub fn new(llm: Arc<LlmClient>, prompts: PromptLibrary) -> Self {
        Self { llm, prompts }
    }

    /// Ask the model about `pages`, which will all be attached to one prompt.
    async fn read_pages(
        &self,
        request: &OcrRequest<'_>,
        pages: &[Page],
        page_number: usize,
    ) -> Result<Value> {
        let prompt = self.prompts.get(request.kind.as_str())?;

        let mut bindings = JsonObject::new();
        bindings.insert("document_kind".to_owned(), json!(request.kind.as_str()));
        bindings.insert("source_name".to_owned(), json!(request.source_name));
        bindings.insert(
            "language".to_owned(),
            json!(request.language.map(|l| l.english_name()).unwrap_or("unspecified")),
        );
        bindings.insert("page_number".to_owned(), json!(page_number));
        bindings.insert("page_count".to_owned(), json!(request.pages.len()));

        let attachments = pages.iter().map(Page::to_data_url).collect::<Vec<_>>();
        let messages = prompt.render_messages(&bindings, &attachments)?;
        let completion = self.llm.complete(&messages, ReplyFormat::Json).await?;
        Ok(completion.value)
    }
}

#[async_trait]
impl OcrEngine for LlmOcrEngine {
    #[instrument(level = "debug", skip_all, fields(source_name = %request.source_name, kind = %request.kind, pages = request.pages.len()))]
    async fn run_ocr(&self, request: OcrRequest<'_>) -> Result<OcrPayload> {
        if request.pages.is_empty() {
            return Err(anyhow!("no pages to read in {:?}", request.source_name));
        }
        match request.kind.page_selection() {
            // One call per page, so long contracts fit in the model's context.
            PageSelection::All => {
                let mut results = Vec::with_capacity(request.pages.len());
                for (idx, page) in request.pages.iter().enumerate() {
                    let value = self
                        .read_pages(&request, std::slice::from_ref(page), idx + 1)
                        .await
                        .with_context(|| format!("failed to read page {}", idx + 1))?;
                    results.push(value);
                }
                Ok(OcrPayload::Many(results))
            }
            PageSelection::First => {
                let value = self.read_pages(&request, request.pages, 1).await?;
                Ok(OcrPayload::from_value(value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        drivers::{LlmOpts, echo::EchoDriver},
        intake::document::{CniLanguage, DocumentKind},
    };

    async fn echo_engine() -> LlmOcrEngine {
        let llm = LlmClient::with_driver(
            Box::new(EchoDriver::new()),
            "echo".to_owned(),
            LlmOpts::default(),
            2,
        );
        LlmOcrEngine::new(Arc::new(llm), PromptLibrary::load(None).await.unwrap())
    }

    fn page() -> Page {
        Page {
            mime_type: "image/png".to_owned(),
            data: vec![0x89, b'P', b'N', b'G'],
        }
    }

    #[tokio::test]
    async fn identity_cards_mention_the_language() {
        let pages = [page()];
        let payload = echo_engine()
            .await
            .run_ocr(OcrRequest {
                source_name: "card.png",
                kind: DocumentKind::CniFront,
                language: Some(CniLanguage::Es),
                pages: &pages,
            })
            .await
            .unwrap();
        let OcrPayload::Single(value) = payload else {
            panic!("expected a single result");
        };
        assert!(value["echo"].as_str().unwrap().contains("Spanish"));
        assert_eq!(value["pages"], json!(1));
    }

    #[tokio::test]
    async fn work_contracts_read_every_page() {
        let pages = [page(), page(), page()];
        let details = echo_engine()
            .await
            .run_ocr(OcrRequest {
                source_name: "contract.pdf",
                kind: DocumentKind::WorkContract,
                language: None,
                pages: &pages,
            })
            .await
            .unwrap()
            .into_details();
        assert_eq!(details.len(), 3);
        assert!(details[2]["echo"].as_str().unwrap().contains("page 3 of 3"));
    }

    #[tokio::test]
    async fn empty_documents_are_errors() {
        let result = echo_engine()
            .await
            .run_ocr(OcrRequest {
                source_name: "empty.pdf",
                kind: DocumentKind::Generic,
                language: None,
                pages: &[],
            })
            .await;
        assert!(result.is_err());
    }
}
