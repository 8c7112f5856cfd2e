use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod chain;
mod cmd;
mod cpu_limit;
mod data_url;
mod drivers;
mod intake;
mod llm;
mod ocr;
mod pages;
mod prelude;
mod prompt;
mod rate_limit;
mod retry;
mod server;
#[cfg(test)]
mod test_support;
mod ui;

/// Read identity cards, contracts and résumés with a vision LLM, over HTTP.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - OPENAI_API_BASE (optional): Override the server URL. Any OpenAI-compatible
    server works, including vLLM, Ollama, LiteLLM and Groq.
  - OPENAI_API_KEY: The API key to use.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Serve the document intake HTTP API.
    Serve(cmd::serve::ServeOpts),
    /// Ask a model a question from the command line.
    Ask(cmd::ask::AskOpts),
    /// Print schemas for our HTTP request and response formats.
    Schema(cmd::schema::SchemaOpts),
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Serve(serve_opts) => {
            ui.hide_progress_bars();
            cmd::serve::cmd_serve(serve_opts).await?;
        }
        Cmd::Ask(ask_opts) => {
            cmd::ask::cmd_ask(ui, ask_opts).await?;
        }
        Cmd::Schema(schema_opts) => {
            ui.hide_progress_bars();
            cmd::schema::cmd_schema(schema_opts).await?;
        }
    }
    Ok(())
}
