//! The `ask` subcommand.

use std::sync::Arc;

use clap::Args;
use tokio::io::AsyncWriteExt as _;

use crate::{
    chain::PromptChain,
    drivers::LlmOpts,
    llm::LlmClient,
    prelude::*,
    prompt::{JsonObject, PromptLibrary},
    ui::{ProgressConfig, Ui},
};

/// Options for the `ask` subcommand.
#[derive(Debug, Args)]
pub struct AskOpts {
    /// The question to ask.
    pub question: String,

    /// The model to ask.
    #[clap(long, env = "CHAIN_MODEL", default_value = "gemma3:1b")]
    pub model: String,

    /// A directory containing a `question.toml` prompt override.
    #[clap(long, env = "DOC_INTAKE_PROMPT_DIR")]
    pub prompt_dir: Option<PathBuf>,

    #[clap(flatten)]
    pub llm_opts: LlmOpts,
}

/// Run the `ask` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ask(ui: Ui, opts: &AskOpts) -> Result<()> {
    let prompts = PromptLibrary::load(opts.prompt_dir.as_deref()).await?;
    let llm = Arc::new(LlmClient::new(
        opts.model.clone(),
        opts.llm_opts.clone(),
        1,
    )?);
    let chain = PromptChain::new(llm, prompts.get("question")?.clone());

    let mut bindings = JsonObject::new();
    bindings.insert("question".to_owned(), json!(opts.question));

    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "💬",
        msg: "Thinking",
        done_msg: "Answered",
    });
    let answer = chain.invoke(&bindings).await;
    spinner.finish_and_clear();
    let answer = answer?;

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(answer.trim_end().as_bytes())
        .await
        .context("failed to write answer")?;
    stdout.write_all(b"\n").await.context("failed to write answer")?;
    stdout.flush().await.context("failed to flush stdout")?;
    Ok(())
}
