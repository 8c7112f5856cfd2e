//! Our OpenAI driver, which we also use for vLLM, LiteLLM, Ollama and other
//! compatible gateways.

use std::time::Duration;

use async_openai::{Client, config::OpenAIConfig};
use futures::{FutureExt as _, TryFutureExt as _};
use keen_retry::RetryResult;
use tokio::time;

use crate::{
    drivers::{LlmError, TokenUsage},
    prelude::*,
    retry::{
        IntoRetryResult as _, IsKnownTransient as _, retry_result_fatal, retry_result_ok,
        try_with_retry_result,
    },
};

use super::{ChatCompletionRequest, ChatCompletionResponse, Driver, LlmRetryResult, ReplyFormat};

/// Create an OpenAI-compatible client configuration from the environment.
pub fn get_openai_client_config() -> OpenAIConfig {
    let mut client_config = OpenAIConfig::new();
    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        client_config = client_config.with_api_key(api_key);
    }
    if let Ok(api_base) = std::env::var("OPENAI_API_BASE") {
        client_config = client_config.with_api_base(api_base);
    }
    client_config
}

/// The parts of a `/chat/completions` response that we use.
///
/// We deliberately don't use the full typed response from `async_openai`,
/// because self-hosted servers are inconsistent about optional fields.
#[derive(Debug, Deserialize)]
struct CompletionReply {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Our OpenAI driver.
#[derive(Debug)]
pub struct OpenAiDriver {
    /// The OpenAI client.
    pub client: Client<OpenAIConfig>,
}

impl OpenAiDriver {
    /// Create a new OpenAI driver.
    pub fn new() -> Result<Self> {
        let client = Client::with_config(get_openai_client_config());
        Ok(Self { client })
    }
}

/// Build the JSON body of a `/chat/completions` request.
fn build_request_body(request: &ChatCompletionRequest<'_>) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages,
    });
    if request.format == ReplyFormat::Json {
        body["response_format"] = json!({ "type": "json_object" });
    }
    let opts = request.llm_opts;
    if let Some(max_completion_tokens) = opts.max_completion_tokens {
        body["max_completion_tokens"] = json!(max_completion_tokens);
    }
    if let Some(temperature) = opts.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(top_p) = opts.top_p {
        body["top_p"] = json!(top_p);
    }
    body
}

#[async_trait]
impl Driver for OpenAiDriver {
    #[instrument(level = "debug", skip_all, fields(model = %request.model))]
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> LlmRetryResult<ChatCompletionResponse> {
        let body = build_request_body(request);
        trace!(%body, "Request");

        // Call the server.
        let chat = self.client.chat();
        let mut chat_future = chat
            .create_byot::<_, Value>(body)
            .map_err(LlmError::Native)
            .boxed();
        if let Some(timeout) = request.llm_opts.timeout {
            // If we have a timeout, wrap our future in a timeout, and merge the errors
            // from the `Result<Result<_, LlmError>, Elapsed>` into a single level.
            chat_future = time::timeout(Duration::from_secs(timeout), chat_future)
                .map(|result| match result {
                    Ok(inner) => inner,
                    Err(_) => Err(LlmError::Timeout),
                })
                .boxed();
        }
        let chat_result: Value = try_with_retry_result!(
            chat_future
                .await
                .into_retry_result(LlmError::is_known_transient)
        );
        debug!(%chat_result, "OpenAI response");
        let reply = try_with_retry_result!(
            serde_json::from_value::<CompletionReply>(chat_result)
                .context("Error parsing OpenAI response")
                .into_fatal()
        );

        // How many tokens did we use?
        let token_usage = reply.usage.map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        });

        let Some(choice) = reply.choices.into_iter().next() else {
            return retry_result_fatal(anyhow!("No choices in OpenAI response"));
        };
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return retry_result_fatal(anyhow!("Content filter triggered"));
        }
        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            // Some servers occasionally return an empty message under load.
            return RetryResult::Transient {
                input: (),
                error: anyhow!("Empty content in OpenAI response"),
            };
        }
        retry_result_ok(ChatCompletionResponse {
            content,
            token_usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::LlmOpts;

    #[test]
    fn request_body_includes_options() {
        let messages = vec![json!({ "role": "user", "content": "hi" })];
        let llm_opts = LlmOpts {
            max_completion_tokens: Some(15000),
            temperature: Some(0.0),
            ..LlmOpts::default()
        };
        let body = build_request_body(&ChatCompletionRequest {
            model: "nanonets/Nanonets-OCR-s",
            messages: &messages,
            format: ReplyFormat::Json,
            llm_opts: &llm_opts,
        });
        assert_eq!(body["model"], json!("nanonets/Nanonets-OCR-s"));
        assert_eq!(body["response_format"]["type"], json!("json_object"));
        assert_eq!(body["max_completion_tokens"], json!(15000));
        assert_eq!(body["temperature"], json!(0.0));
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn text_requests_do_not_ask_for_json() {
        let messages = vec![];
        let llm_opts = LlmOpts::default();
        let body = build_request_body(&ChatCompletionRequest {
            model: "llama-3.1-8b-instant",
            messages: &messages,
            format: ReplyFormat::Text,
            llm_opts: &llm_opts,
        });
        assert!(body.get("response_format").is_none());
    }
}
