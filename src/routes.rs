// src/routes.rs

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::SignalRateLimit,
    handlers::{health, session, signals, verification},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Session routes behind JWT auth, nested under `/api/sessions`.
/// * Optional per-IP rate limit on the signal route.
/// * Global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    let mut signal_routes: Router<AppState> =
        Router::new().route("/{id}/signals", post(signals::ingest_signal));
    if let Some(limit) = state.config.signal_rate_limit {
        signal_routes = with_rate_limit(signal_routes, limit);
    }

    let session_routes = Router::new()
        .route("/", post(session::create_session))
        .route("/{id}", get(session::get_session))
        .route("/{id}/start", post(session::start_session))
        .route("/{id}/answers/{question_id}", put(session::record_answer))
        .route(
            "/{id}/sections/{section_id}/lock",
            post(session::request_section_lock),
        )
        .route("/{id}/final", post(session::request_final_submit))
        .route(
            "/{id}/verification/{target}",
            put(verification::update_challenge).delete(verification::cancel_challenge),
        )
        .route(
            "/{id}/verification/{target}/confirm",
            post(verification::confirm_challenge),
        )
        .route("/{id}/violations", get(session::get_violations))
        .merge(signal_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/sessions", session_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
}

/// Keys on the peer IP, so the server must be started with connect info.
fn with_rate_limit(routes: Router<AppState>, limit: SignalRateLimit) -> Router<AppState> {
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(limit.per_second)
        .burst_size(limit.burst)
        .finish();

    match governor_conf {
        Some(conf) => {
            tracing::info!(
                per_second = limit.per_second,
                burst = limit.burst,
                "Signal rate limit enabled"
            );
            routes.layer(GovernorLayer::new(Arc::new(conf)))
        }
        None => {
            tracing::warn!("Invalid signal rate limit configuration, rate limit disabled");
            routes
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;
    use url::Url;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::Config,
        test_utils::{RecordingSubmissions, RecordingTelemetry, StaticContent, fixtures::two_section_exam},
        utils::jwt::sign_jwt,
    };

    const SECRET: &str = "router_test_secret";

    fn app(signal_rate_limit: Option<SignalRateLimit>) -> Router {
        let local = Url::parse("http://127.0.0.1:9").unwrap();
        let config = Config {
            jwt_secret: SECRET.to_string(),
            rust_log: "error".to_string(),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            submission_api_url: local.clone(),
            event_log_api_url: local.clone(),
            content_api_url: local,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            signal_rate_limit,
            http_timeout: Duration::from_secs(1),
        };
        let state = AppState::new(
            config,
            StaticContent::with(two_section_exam(chrono::Utc::now())),
            RecordingSubmissions::new(),
            RecordingTelemetry::new(),
        );
        create_router(state)
    }

    fn signal_request(session_id: Uuid, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/sessions/{}/signals", session_id))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let mut req = builder
            .body(Body::from(r#"{"channel":"copy"}"#))
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 40000))));
        req
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let response = app(None)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn session_routes_reject_missing_token() {
        let response = app(None)
            .oneshot(signal_request(Uuid::new_v4(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let token = sign_jwt("alice", SECRET, 60).unwrap();
        let response = app(None)
            .oneshot(signal_request(Uuid::new_v4(), Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signal_route_is_rate_limited_per_peer() {
        let app = app(Some(SignalRateLimit {
            per_second: 60,
            burst: 2,
        }));
        let token = sign_jwt("alice", SECRET, 60).unwrap();
        let session_id = Uuid::new_v4();

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(signal_request(session_id, Some(&token)))
                .await
                .unwrap();
            statuses.push(response.status());
        }

        assert_eq!(
            statuses,
            vec![
                StatusCode::NOT_FOUND,
                StatusCode::NOT_FOUND,
                StatusCode::TOO_MANY_REQUESTS
            ]
        );
    }
}
