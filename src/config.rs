// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use dotenvy::dotenv;
use url::Url;

/// Per-peer token bucket for the signal endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalRateLimit {
    pub per_second: u64,
    pub burst: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,

    pub submission_api_url: Url,
    pub event_log_api_url: Url,
    pub content_api_url: Url,

    /// CORS origins; empty means same-origin only.
    pub allowed_origins: Vec<String>,
    pub signal_rate_limit: Option<SignalRateLimit>,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .expect("BIND_ADDR must be a socket address");

        let submission_api_url = required_url("SUBMISSION_API_URL");
        let event_log_api_url = required_url("EVENT_LOG_API_URL");
        let content_api_url = required_url("CONTENT_API_URL");

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or_default();

        let per_second = optional_number::<u64>("SIGNAL_RATE_PER_SECOND");
        let burst = optional_number::<u32>("SIGNAL_RATE_BURST");
        let signal_rate_limit = match (per_second, burst) {
            (Some(per_second), Some(burst)) => Some(SignalRateLimit { per_second, burst }),
            (None, None) => None,
            _ => panic!("SIGNAL_RATE_PER_SECOND and SIGNAL_RATE_BURST must be set together"),
        };

        let http_timeout =
            Duration::from_secs(optional_number::<u64>("HTTP_TIMEOUT_SECS").unwrap_or(10));

        Self {
            jwt_secret,
            rust_log,
            bind_addr,
            submission_api_url,
            event_log_api_url,
            content_api_url,
            allowed_origins,
            signal_rate_limit,
            http_timeout,
        }
    }
}

fn required_url(key: &str) -> Url {
    let raw = env::var(key).unwrap_or_else(|_| panic!("{} must be set", key));
    Url::parse(&raw).unwrap_or_else(|e| panic!("{} is not a valid URL: {}", key, e))
}

fn optional_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => panic!("{} must be a number, got '{}'", key, raw),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
