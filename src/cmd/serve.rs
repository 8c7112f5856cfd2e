//! The `serve` subcommand.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use clap::Args;

use crate::{
    chain::PromptChain,
    drivers::LlmOpts,
    intake::processor::DocumentProcessor,
    llm::LlmClient,
    ocr::llm::LlmOcrEngine,
    pages::PageOptions,
    prelude::*,
    prompt::PromptLibrary,
    server::{AppState, create_router, serve},
};

/// Options for the `serve` subcommand.
#[derive(Debug, Args)]
pub struct ServeOpts {
    /// The address to listen on.
    #[clap(long, env = "DOC_INTAKE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// The port to listen on.
    #[clap(long, env = "DOC_INTAKE_PORT", default_value = "8080")]
    pub port: u16,

    /// The vision model used for OCR.
    #[clap(long, env = "OCR_MODEL", default_value = "nanonets/Nanonets-OCR-s")]
    pub model: String,

    /// The text model used by `/chain/invoke`.
    #[clap(long, env = "CHAIN_MODEL", default_value = "llama-3.1-8b-instant")]
    pub chain_model: String,

    /// Max number of OCR requests to send to the model at a time.
    #[clap(short = 'j', long = "jobs", default_value = "1")]
    pub jobs: usize,

    /// The largest upload we accept, in megabytes.
    #[clap(long, default_value = "100")]
    pub max_upload_mb: usize,

    /// The DPI to use when rasterizing PDFs.
    #[clap(long, default_value = "300")]
    pub rasterize_dpi: u32,

    /// Where to put temporary files. Defaults to the system temporary
    /// directory.
    #[clap(long, env = "DOC_INTAKE_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// A directory of prompt overrides, named `<document_kind>.toml` or
    /// `translate.toml`.
    #[clap(long, env = "DOC_INTAKE_PROMPT_DIR")]
    pub prompt_dir: Option<PathBuf>,

    #[clap(flatten)]
    pub llm_opts: LlmOpts,
}

/// Run the `serve` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_serve(opts: &ServeOpts) -> Result<()> {
    let ip: IpAddr = opts
        .host
        .parse()
        .with_context(|| format!("invalid listen address {:?}", opts.host))?;
    let addr = SocketAddr::new(ip, opts.port);
    if let Some(scratch_dir) = &opts.scratch_dir {
        tokio::fs::create_dir_all(scratch_dir).await.with_context(|| {
            format!("failed to create scratch directory {:?}", scratch_dir.display())
        })?;
    }

    let prompts = PromptLibrary::load(opts.prompt_dir.as_deref()).await?;

    // The OCR model is shared by every request, and owns the concurrency
    // limit.
    let ocr_llm = Arc::new(LlmClient::new(
        opts.model.clone(),
        opts.llm_opts.clone(),
        opts.jobs,
    )?);
    let engine = LlmOcrEngine::new(ocr_llm, prompts.clone());
    let processor = Arc::new(DocumentProcessor::new(
        Arc::new(engine),
        PageOptions {
            rasterize_dpi: opts.rasterize_dpi,
            scratch_dir: opts.scratch_dir.clone(),
        },
    ));

    let chain_llm = Arc::new(LlmClient::new(
        opts.chain_model.clone(),
        opts.llm_opts.clone(),
        opts.jobs,
    )?);
    let translate = PromptChain::new(chain_llm, prompts.get("translate")?.clone());

    info!(
        ocr_model = %opts.model,
        chain_model = %opts.chain_model,
        jobs = opts.jobs,
        "Starting document intake server"
    );
    let state = AppState::new(processor, opts.scratch_dir.clone(), translate);
    let router = create_router(state, opts.max_upload_mb.saturating_mul(1024 * 1024));
    serve(router, addr).await
}
