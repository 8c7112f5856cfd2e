//! Echo driver for testing.
//!
//! This driver echoes back the text of the last user message. For JSON
//! replies it wraps the text as `{ "echo": <text>, "pages": <count> }`, where
//! `pages` is the number of attached images.

use crate::{prelude::*, retry::retry_result_ok};

use super::{
    ChatCompletionRequest, ChatCompletionResponse, Driver, LlmRetryResult, ReplyFormat,
    TokenUsage,
};

/// Echo driver for testing.
#[derive(Debug, Default)]
pub struct EchoDriver;

impl EchoDriver {
    /// Create a new echo driver.
    pub fn new() -> Self {
        Self
    }
}

/// Extract the text and image count from the last user message.
fn last_user_message(messages: &[Value]) -> Result<(String, usize)> {
    let message = messages
        .iter()
        .rev()
        .find(|msg| msg["role"] == "user")
        .ok_or_else(|| anyhow!("No user message found in prompt"))?;
    match &message["content"] {
        Value::String(text) => Ok((text.clone(), 0)),
        Value::Array(parts) => {
            let text = parts
                .iter()
                .filter(|part| part["type"] == "text")
                .filter_map(|part| part["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let images = parts.iter().filter(|part| part["type"] == "image_url").count();
            Ok((text, images))
        }
        other => Err(anyhow!("Unexpected user message content: {other}")),
    }
}

#[async_trait]
impl Driver for EchoDriver {
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> LlmRetryResult<ChatCompletionResponse> {
        let (text, pages) = match last_user_message(request.messages) {
            Ok(found) => found,
            Err(error) => {
                return keen_retry::RetryResult::Fatal { input: (), error };
            }
        };
        let content = match request.format {
            ReplyFormat::Text => text,
            ReplyFormat::Json => json!({ "echo": text, "pages": pages }).to_string(),
        };
        retry_result_ok(ChatCompletionResponse {
            content,
            token_usage: Some(TokenUsage::default()),
        })
    }
}

// We focus on the "sad paths" here, because the happy path is exercised by
// the OCR engine and CLI tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_attached_images() {
        let messages = vec![
            json!({ "role": "system", "content": "ignored" }),
            json!({ "role": "user", "content": [
                { "type": "text", "text": "read this" },
                { "type": "image_url", "image_url": { "url": "data:," } },
            ] }),
        ];
        let (text, pages) = last_user_message(&messages).unwrap();
        assert_eq!(text, "read this");
        assert_eq!(pages, 1);
    }

    #[test]
    fn no_user_message_is_an_error() {
        let messages = vec![json!({ "role": "assistant", "content": "hello" })];
        let err = last_user_message(&messages).unwrap_err();
        assert!(err.to_string().contains("No user message"));
    }
}
