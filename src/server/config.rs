//! Process-level configuration
//!
//! Everything the bridge needs at the process level comes from environment
//! variables; tenant-scoped settings live in the registry.

use anyhow::{Context, Result};

/// Default bind host
const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port
const DEFAULT_PORT: u16 = 3000;

/// Default NATS endpoint
const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";

/// Default webhook path segment
const DEFAULT_WEBHOOK_NAME: &str = "webhook";

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// NATS endpoint for the durable queue
    pub nats_url: String,
    /// Path segment webhooks are served under
    pub webhook_name: String,
    /// Externally reachable base URL, used for advertised webhook URLs
    pub webhook_base_url: String,
    /// Directory for per-tenant sidecar files
    pub data_dir: String,
}

impl AppConfig {
    /// Load configuration from the environment
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = match std::env::var("SERVER_PORT").or_else(|_| std::env::var("PORT")) {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid server port: {raw}"))?,
            Err(_) => DEFAULT_PORT,
        };
        let nats_url = std::env::var("NATS_URL").unwrap_or_else(|_| DEFAULT_NATS_URL.to_string());
        let webhook_name =
            std::env::var("WEBHOOK_NAME").unwrap_or_else(|_| DEFAULT_WEBHOOK_NAME.to_string());
        let webhook_base_url = std::env::var("WEBHOOK_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "/app/data".to_string());

        Ok(Self {
            host,
            port,
            nats_url,
            webhook_name,
            webhook_base_url,
            data_dir,
        })
    }

    /// Advertised URL gateway webhooks should target
    #[must_use]
    pub fn principal_url(&self) -> String {
        format!(
            "{}/{}",
            self.webhook_base_url.trim_end_matches('/'),
            self.webhook_name
        )
    }

    /// Advertised URL helpdesk callbacks should target
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!("{}/callback", self.principal_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            host: DEFAULT_HOST.to_string(),
            port: 3000,
            nats_url: DEFAULT_NATS_URL.to_string(),
            webhook_name: "webhook".to_string(),
            webhook_base_url: "https://bridge.example/".to_string(),
            data_dir: "/app/data".to_string(),
        }
    }

    #[test]
    fn test_advertised_urls() {
        let config = config();
        assert_eq!(config.principal_url(), "https://bridge.example/webhook");
        assert_eq!(
            config.callback_url(),
            "https://bridge.example/webhook/callback"
        );
    }
}
