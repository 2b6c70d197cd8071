use std::time::Duration;

/// Runtime configuration, environment-sourced at startup (see `Cli` in
/// `main.rs` for the flag and variable names).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// User access code; empty means every `ui_code` check fails.
    pub hub_ui_code: String,
    /// Administrative shared secret; empty means `/api/trigger` always 401s.
    pub hub_secret: String,
    pub vapid_public_key: Option<String>,
    pub vapid_private_key: Option<String>,
    pub vapid_subject: Option<String>,
    pub worker_count: usize,
    pub queue_size: usize,
    pub max_retries: u32,
    pub retry_base_backoff_ms: u64,
    pub push_ttl_seconds: u32,
    pub subscribe_rate_limit: usize,
    pub subscribe_rate_window: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            database_url: String::new(),
            hub_ui_code: String::new(),
            hub_secret: String::new(),
            vapid_public_key: None,
            vapid_private_key: None,
            vapid_subject: None,
            worker_count: 10,
            queue_size: 1024,
            max_retries: 3,
            retry_base_backoff_ms: 400,
            push_ttl_seconds: 60 * 60 * 24 * 14,
            subscribe_rate_limit: 5,
            subscribe_rate_window: Duration::from_secs(60),
        }
    }
}
