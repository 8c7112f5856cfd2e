//! Prompt → model → string chains.

use std::sync::Arc;

use schemars::JsonSchema;
use uuid::Uuid;

use crate::{
    drivers::ReplyFormat,
    llm::LlmClient,
    prelude::*,
    prompt::{ChatPrompt, JsonObject},
};

/// A prompt template bound to a model, returning the model's text reply.
pub struct PromptChain {
    llm: Arc<LlmClient>,
    prompt: ChatPrompt,
}

impl PromptChain {
    /// Create a new chain.
    pub fn new(llm: Arc<LlmClient>, prompt: ChatPrompt) -> Self {
        Self { llm, prompt }
    }

    /// Render the prompt with `bindings`, and return the reply text.
    #[instrument(level = "debug", skip_all, fields(model = %self.llm.model()))]
    pub async fn invoke(&self, bindings: &JsonObject) -> Result<String> {
        let messages = self.prompt.render_messages(bindings, &[])?;
        let completion = self.llm.complete(&messages, ReplyFormat::Text).await?;
        match completion.value {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }
}

/// Input to the translation chain.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct TranslateInput {
    /// The language to translate into, in plain English ("French").
    pub language: String,
    /// The text to translate.
    pub text: String,
}

impl TranslateInput {
    /// Template bindings for this input.
    pub fn to_bindings(&self) -> JsonObject {
        let mut bindings = JsonObject::new();
        bindings.insert("language".to_owned(), json!(self.language));
        bindings.insert("text".to_owned(), json!(self.text));
        bindings
    }
}

/// A `POST /chain/invoke` request body.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct InvokeRequest {
    pub input: TranslateInput,
}

/// Metadata about one chain run.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct InvokeMetadata {
    pub run_id: Uuid,
}

/// A `POST /chain/invoke` response body.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct InvokeResponse {
    pub output: String,
    pub metadata: InvokeMetadata,
}

impl InvokeResponse {
    /// Wrap chain output with a fresh run ID.
    pub fn new(output: String) -> Self {
        Self {
            output,
            metadata: InvokeMetadata {
                run_id: Uuid::new_v4(),
            },
        }
    }
}
