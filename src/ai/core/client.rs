use reqwest::Client;
use std::time::Duration;

/// Configuration options for HTTP client creation
#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
    /// Optional timeout in seconds (defaults to reqwest's default if None)
    pub timeout_seconds: Option<u64>,
}

impl HttpClientConfig {
    pub fn with_timeout(timeout_seconds: u64) -> Self {
        Self {
            timeout_seconds: Some(timeout_seconds),
        }
    }
}

/// Common HTTP client builder shared by all provider adapters regardless
/// of their API format.
pub fn build_http_client(
    config: &HttpClientConfig,
) -> Result<Client, Box<dyn std::error::Error + Send + Sync>> {
    let mut client_builder = Client::builder();

    if let Some(timeout_seconds) = config.timeout_seconds {
        client_builder = client_builder.timeout(Duration::from_secs(timeout_seconds));
    }

    Ok(client_builder.build()?)
}
