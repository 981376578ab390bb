// src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use exam_proctor::clients::{HttpContentProvider, HttpSubmissionApi, HttpTelemetrySink};
use exam_proctor::config::Config;
use exam_proctor::routes;
use exam_proctor::state::AppState;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // One HTTP client shared by every collaborator
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .expect("Failed to build HTTP client");

    let content = HttpContentProvider::new(http.clone(), config.content_api_url.clone());
    let submissions = HttpSubmissionApi::new(http.clone(), &config.submission_api_url)
        .expect("SUBMISSION_API_URL cannot be used as a base URL");
    let telemetry = HttpTelemetrySink::spawn(http, &config.event_log_api_url)
        .expect("EVENT_LOG_API_URL cannot be used as a base URL");

    tracing::info!(
        content = %config.content_api_url,
        submissions = %config.submission_api_url,
        events = %config.event_log_api_url,
        "External collaborators configured"
    );

    let addr = config.bind_addr;
    let state = AppState::new(
        config,
        Arc::new(content),
        Arc::new(submissions),
        Arc::new(telemetry),
    );

    // Create the Axum application router
    let app = routes::create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listening address");

    // Peer addresses are needed by the signal rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
