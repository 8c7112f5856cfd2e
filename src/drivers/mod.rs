//! LLM drivers.
//!
//! We talk to models through the OpenAI `/chat/completions` API, which vLLM,
//! Ollama, LiteLLM and Groq all speak. The `echo` driver exists so that we can
//! exercise the whole pipeline without a model server.

use std::{error, fmt};

use clap::{Args, ValueEnum};
use keen_retry::RetryResult;

use crate::{prelude::*, rate_limit::RateLimit, retry::IsKnownTransient};

pub mod echo;
pub mod openai;

/// Our different driver types.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum DriverType {
    /// OpenAI-compatible driver (also for vLLM, LiteLLM, Ollama, etc).
    #[default]
    #[clap(name = "openai")]
    OpenAI,

    /// Echo the last user message back. For testing.
    Echo,
}

impl DriverType {
    /// Instantiate an appropriate driver.
    pub fn create_driver(&self) -> Result<Box<dyn Driver>> {
        match self {
            DriverType::OpenAI => Ok(Box::new(openai::OpenAiDriver::new()?)),
            DriverType::Echo => Ok(Box::new(echo::EchoDriver::new())),
        }
    }
}

/// Our chat-related options.
#[derive(Args, Clone, Debug, Default)]
pub struct LlmOpts {
    /// The LLM driver to use. This defaults to `openai`, which works with any
    /// OpenAI-compatible server.
    #[clap(long, value_enum, default_value_t = DriverType::default())]
    pub driver: DriverType,

    /// An upper limit on the number of completion tokens to generate. Dense
    /// documents like resumes may need a generous limit.
    #[clap(long, env = "LLM_MAX_COMPLETION_TOKENS")]
    pub max_completion_tokens: Option<u32>,

    /// The temperature to use for sampling, between 0.0 and 2.0. Defaults to
    /// the model's default.
    #[clap(long)]
    pub temperature: Option<f32>,

    /// The top-p sampling value to use, between 0.0 and 1.0. Defaults to the
    /// model's default.
    #[clap(long)]
    pub top_p: Option<f32>,

    /// A timeout, in seconds, for the LLM to return a complete response.
    #[clap(long, env = "LLM_TIMEOUT")]
    pub timeout: Option<u64>,

    /// A rate limit for LLM API requests, of the form "10/s" or "2000/m".
    #[clap(long, env = "LLM_RATE_LIMIT")]
    pub rate_limit: Option<RateLimit>,
}

/// What kind of reply do we want from the model?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyFormat {
    /// Free-form text, returned as-is.
    Text,

    /// A JSON value. Models are asked for JSON mode, but we still clean up
    /// replies wrapped in Markdown fences.
    Json,
}

/// A request for a chat completion.
#[derive(Debug)]
pub struct ChatCompletionRequest<'a> {
    /// The model name, as understood by the server.
    pub model: &'a str,

    /// Rendered OpenAI-style messages.
    pub messages: &'a [Value],

    /// What kind of reply we expect.
    pub format: ReplyFormat,

    /// Sampling and timeout options.
    pub llm_opts: &'a LlmOpts,
}

/// A [`RetryResult`] for LLM requests. This allows [`Driver`] instances to
/// distinguish between errors that may be transient, and errors that are
/// definitely fatal.
pub type LlmRetryResult<T> = RetryResult<(), (), T, anyhow::Error>;

/// Interface trait for LLM drivers.
#[async_trait]
pub trait Driver: fmt::Debug + Send + Sync + 'static {
    /// Run a "chat completion" request, returning the raw reply text.
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> LlmRetryResult<ChatCompletionResponse>;
}

/// A chat completion response.
#[derive(Debug)]
pub struct ChatCompletionResponse {
    /// The text of the first choice. Not parsed or validated yet.
    pub content: String,

    /// Token usage.
    pub token_usage: Option<TokenUsage>,
}

/// Token usage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// How many tokens were used in the prompt?
    pub prompt_tokens: u64,

    /// How many tokens were used in the response?
    pub completion_tokens: u64,
}

/// An error which occurred while calling an LLM.
///
/// Used internally by drivers to handle timeouts.
#[derive(Debug)]
pub enum LlmError<E> {
    /// A native error.
    Native(E),

    /// A timeout error.
    Timeout,
}

impl<E> IsKnownTransient for LlmError<E>
where
    E: IsKnownTransient,
{
    fn is_known_transient(&self) -> bool {
        match self {
            LlmError::Native(err) => err.is_known_transient(),
            // Runaway responses and overloaded servers both show up as
            // timeouts, and both deserve another try.
            LlmError::Timeout => true,
        }
    }
}

impl<E> fmt::Display for LlmError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Native(err) => write!(f, "LLM error: {err}"),
            LlmError::Timeout => write!(f, "LLM request timed out"),
        }
    }
}

impl<E> error::Error for LlmError<E>
where
    E: error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            LlmError::Native(err) => Some(err),
            LlmError::Timeout => None,
        }
    }
}
