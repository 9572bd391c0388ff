//! Main Entrypoint for the Parley API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Loading the topic catalog and the prompt set.
//! 4. Initializing the dialogue model client.
//! 5. Constructing the Axum router and applying middleware.
//! 6. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use parley_api::{config::Config, router::create_router, state::AppState};
use parley_core::{
    llm_client::{DialogueModel, OpenAICompatibleClient},
    prompt::PromptSet,
    topic::TopicCatalog,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Topics and Prompts ---
    let catalog = match &config.topics_path {
        Some(path) => TopicCatalog::load(path)
            .with_context(|| format!("Failed to load topics from {}", path.display()))?,
        None => TopicCatalog::builtin(),
    };
    let prompts = match &config.prompts_path {
        Some(dir) => PromptSet::load_dir(dir)
            .with_context(|| format!("Failed to load prompts from {}", dir.display()))?,
        None => PromptSet::default(),
    };
    info!(topics = catalog.topics().len(), "Topic catalog ready.");

    // --- 4. Initialize the Dialogue Model ---
    let model: Option<Arc<dyn DialogueModel>> = match config.require_api_key() {
        Ok(api_key) => {
            let openai_config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(&config.model_api_base);
            Some(Arc::new(OpenAICompatibleClient::new(
                openai_config,
                config.chat_model.clone(),
            )))
        }
        Err(e) => {
            warn!(error = %e, "No model credential; conversations will fail to start.");
            None
        }
    };

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        catalog: Arc::new(catalog),
        model,
        prompts: Arc::new(prompts),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.chat_model,
        language = %config.speech_language,
        max_messages = config.max_messages,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
