//! The HTTP server.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    chain::PromptChain,
    intake::{bulk::BulkDispatcher, processor::DocumentProcessor},
    prelude::*,
};

mod handlers;
mod upload;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<DocumentProcessor>,
    pub bulk: Arc<BulkDispatcher>,
    pub translate: Arc<PromptChain>,
}

impl AppState {
    /// Wire up the intake pipeline around a processor.
    pub fn new(
        processor: Arc<DocumentProcessor>,
        scratch_root: Option<PathBuf>,
        translate: PromptChain,
    ) -> Self {
        let bulk = Arc::new(BulkDispatcher::new(processor.clone(), scratch_root));
        Self {
            processor,
            bulk,
            translate: Arc::new(translate),
        }
    }
}

/// Build our router.
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ocr/resume", post(handlers::ocr_resume))
        .route("/ocr/smalter/{image_type}", post(handlers::ocr_smalter))
        .route("/ocr/eilify", post(handlers::ocr_eilify))
        .route("/chain/invoke", post(handlers::chain_invoke))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` until we receive Ctrl-C.
pub async fn serve(router: Router, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for Ctrl-C: {err}");
            }
            info!("Shutting down");
        })
        .await
        .context("server error")
}
