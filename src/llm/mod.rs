//! A shared, rate-limited LLM client with retries.
//!
//! The client is expensive to set up and is shared by every request, so it
//! owns the concurrency limit, the rate limiter and the retry policy. Callers
//! only see [`LlmClient::complete`].

use keen_retry::{ExponentialJitter, ResolvedResult};
use leaky_bucket::RateLimiter;
use tokio::sync::Semaphore;

use crate::{
    drivers::{ChatCompletionRequest, Driver, LlmOpts, LlmRetryResult, ReplyFormat, TokenUsage},
    prelude::*,
    retry::{IntoRetryResult as _, retry_result_ok, try_with_retry_result},
};

pub mod json_reply;

/// A completed LLM call.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The reply. A [`Value::String`] for [`ReplyFormat::Text`], otherwise
    /// the parsed JSON value.
    pub value: Value,

    /// Token usage, if the server reported it.
    pub token_usage: Option<TokenUsage>,
}

/// A shared LLM client.
#[derive(Debug)]
pub struct LlmClient {
    driver: Box<dyn Driver>,
    model: String,
    llm_opts: LlmOpts,
    rate_limiter: Option<RateLimiter>,
    permits: Semaphore,
}

impl LlmClient {
    /// Create a new client for `model`, allowing `concurrency_limit` calls in
    /// flight at once.
    pub fn new(model: String, llm_opts: LlmOpts, concurrency_limit: usize) -> Result<Self> {
        let driver = llm_opts.driver.create_driver()?;
        Ok(Self::with_driver(driver, model, llm_opts, concurrency_limit))
    }

    /// Create a new client around an existing driver.
    pub fn with_driver(
        driver: Box<dyn Driver>,
        model: String,
        llm_opts: LlmOpts,
        concurrency_limit: usize,
    ) -> Self {
        let rate_limiter = llm_opts.rate_limit.as_ref().map(|rl| rl.to_rate_limiter());
        Self {
            driver,
            model,
            llm_opts,
            rate_limiter,
            permits: Semaphore::new(concurrency_limit.max(1)),
        }
    }

    /// The model we talk to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `messages` to the model, retrying transient failures with
    /// exponential backoff.
    #[instrument(level = "debug", skip_all, fields(model = %self.model, ?format))]
    pub async fn complete(&self, messages: &[Value], format: ReplyFormat) -> Result<Completion> {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("LLM client is shutting down")?;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            format,
            llm_opts: &self.llm_opts,
        };

        // If we have a transient failure, back off exponentially.
        let jitter = ExponentialJitter::FromBackoffRange {
            backoff_range_millis: 1..=30_000,
            re_attempts: 5,
            jitter_ratio: 0.2,
        };

        let result = self
            .attempt(&request)
            .await
            .retry_with_async(|_| async { self.attempt(&request).await })
            .with_exponential_jitter(|| jitter)
            .await
            .inspect_fatal(|_, fatal_error| error!("LLM call FAILED with error {fatal_error:?}"))
            .inspect_recovered(|_, _, retry_errors_list| {
                warn!(
                    "LLM call succeeded after retrying {} times (failed attempts: [{}])",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            })
            .inspect_given_up(|_, retry_errors_list, fatal_error| {
                error!(
                    "LLM call FAILED after exhausting all {} retrying attempts with error {fatal_error:?}. Previous transient failures: [{}]",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            });

        match result {
            ResolvedResult::Ok { output, .. } | ResolvedResult::Recovered { output, .. } => {
                if let Some(usage) = &output.token_usage {
                    debug!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "Token usage"
                    );
                }
                Ok(output)
            }
            ResolvedResult::Fatal { error, .. } => Err(error),
            ResolvedResult::GivenUp { fatal_error, .. }
            | ResolvedResult::Unrecoverable { fatal_error, .. } => Err(fatal_error),
        }
    }

    /// Make a single attempt at a completion.
    async fn attempt(&self, request: &ChatCompletionRequest<'_>) -> LlmRetryResult<Completion> {
        if let Some(rate_limiter) = &self.rate_limiter {
            rate_limiter.acquire_one().await;
        }

        let response = try_with_retry_result!(self.driver.chat_completion(request).await);
        let value = match request.format {
            ReplyFormat::Text => Value::String(response.content),
            ReplyFormat::Json => try_with_retry_result!(
                json_reply::parse_json_reply(&response.content)
                    // The model didn't produce JSON this time. Let it try
                    // again.
                    .into_transient()
            ),
        };
        retry_result_ok(Completion {
            value,
            token_usage: response.token_usage,
        })
    }
}
