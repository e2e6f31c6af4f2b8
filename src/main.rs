use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use concierge::config::AppConfig;
use concierge::db;
use concierge::handlers;
use concierge::services::ai::groq::GroqProvider;
use concierge::services::ai::ollama::OllamaProvider;
use concierge::services::ai::{LlmProvider, LlmUnderstanding};
use concierge::services::messaging::instagram::InstagramMessenger;
use concierge::services::messaging::{LogOnlyMessenger, MessagingProvider};
use concierge::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(!config.groq_api_key.is_empty(), "GROQ_API_KEY must be set when LLM_PROVIDER=groq");
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Box::new(GroqProvider::new(config.groq_api_key.clone(), config.groq_model.clone()))
        }
        _ => {
            tracing::info!("using Ollama LLM provider (url: {}, model: {})", config.ollama_url, config.ollama_model);
            Box::new(OllamaProvider::new(config.ollama_url.clone(), config.ollama_model.clone()))
        }
    };

    let messaging: Box<dyn MessagingProvider> = if config.instagram_access_token.is_empty() {
        tracing::warn!("INSTAGRAM_ACCESS_TOKEN not set, replies will only be logged");
        Box::new(LogOnlyMessenger)
    } else {
        Box::new(InstagramMessenger::new(
            config.instagram_access_token.clone(),
            &config.instagram_api_version,
        ))
    };
    if config.instagram_app_secret.is_empty() {
        tracing::warn!("INSTAGRAM_APP_SECRET not set, webhook signatures are not checked");
    }

    let state = Arc::new(AppState::new(
        conn,
        config.clone(),
        Arc::new(LlmUnderstanding::new(llm)),
        messaging,
    ));

    let expired = state.engine.expire_sessions(Utc::now().naive_utc())?;
    if expired > 0 {
        tracing::info!(expired, "removed expired sessions");
    }

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/webhook",
            get(handlers::webhook::verify).post(handlers::webhook::receive),
        )
        .route("/hotel/info", get(handlers::hotel::hotel_info))
        .route("/api/dev/message", post(handlers::dev::send_message))
        .route("/api/sessions/:id", get(handlers::admin::get_session))
        .route("/api/bookings", get(handlers::admin::get_bookings))
        .route("/api/bookings/:id", get(handlers::admin::get_booking))
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
