mod config;
mod conversion;
mod errors;
mod llm_client;
mod pipeline;
mod routes;
mod scoring;
mod state;
mod upload;
mod workspace;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, ConversionBackend};
use crate::conversion::convert_api::ConvertApiClient;
use crate::conversion::local::LocalPdfConverter;
use crate::conversion::{ConversionGateway, ConversionProvider};
use crate::llm_client::retry::RetryPolicy;
use crate::llm_client::OpenAiClient;
use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::routes::build_router;
use crate::scoring::gateway::ScoringGateway;
use crate::scoring::prompts::PromptSet;
use crate::state::AppState;
use crate::upload::validator::{UploadPolicy, UploadValidator};
use crate::workspace::Workspace;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cvscore v{}", env!("CARGO_PKG_VERSION"));

    let workspace = Workspace::new(&config.output_dir);
    workspace
        .ensure()
        .await
        .with_context(|| format!("cannot create output dir {}", config.output_dir.display()))?;
    info!("Output directory: {}", workspace.dir().display());

    // Conversion provider
    let provider = build_conversion_provider(&config)?;
    info!("Conversion backend: {}", provider.name());
    let converter = ConversionGateway::new(provider, workspace.clone());

    // LLM client + prompts
    let llm = OpenAiClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.openai_base_url.clone(),
    )?;
    info!("LLM client initialized (model: {})", llm.model());

    let prompts = match &config.prompts_dir {
        Some(dir) => PromptSet::load(dir)?,
        None => PromptSet::default(),
    };
    let retry = RetryPolicy::connectivity();
    info!(
        "Scoring retries: up to {} attempts, at most {}s of backoff",
        retry.max_attempts,
        retry.max_total_wait().as_secs()
    );
    let scorer = ScoringGateway::new(Arc::new(llm), retry, prompts);

    let policy = UploadPolicy {
        max_file_size: config.max_upload_bytes,
        max_pages: config.max_pages,
        ..UploadPolicy::default()
    };
    let validator = UploadValidator::new(policy, workspace.clone());

    let state = AppState {
        pipeline: Arc::new(PipelineOrchestrator::new(validator, converter, scorer)),
        workspace: workspace.clone(),
        max_upload_bytes: config.max_upload_bytes,
    };

    let origin: HeaderValue = config
        .cors_origin
        .parse()
        .with_context(|| format!("invalid CORS_ORIGIN '{}'", config.cors_origin))?;

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(origin));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Nothing in the output directory outlives the process.
    match workspace.purge().await {
        Ok(n) => info!("Shutdown cleanup removed {n} file(s)"),
        Err(e) => error!("Shutdown cleanup failed: {e}"),
    }

    Ok(())
}

fn build_conversion_provider(config: &Config) -> Result<Arc<dyn ConversionProvider>> {
    Ok(match config.conversion_backend {
        ConversionBackend::ConvertApi => {
            let secret = config
                .convert_api_secret
                .clone()
                .context("CONVERT_API_SECRET is not set")?;
            Arc::new(ConvertApiClient::new(
                secret,
                config.convert_api_base_url.clone(),
            )?)
        }
        ConversionBackend::Local => Arc::new(LocalPdfConverter),
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
