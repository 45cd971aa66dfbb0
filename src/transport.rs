use crate::error::{CardHistoryError, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// The session-holding transport the pipeline talks through. One value
/// represents one authenticated session; the month fan-out shares it
/// read-only.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Load a page to establish the session context. The body is discarded.
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn get_json(&self, url: &str) -> Result<Value>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
}

/// Production transport: a reqwest client with a cookie store, so the
/// session established at login is carried into every subsequent call.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("navigate {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CardHistoryError::Transport(format!(
                "navigation to {} returned status {}",
                url, status
            )));
        }
        Ok(())
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CardHistoryError::Transport(format!(
                "GET {} returned status {}",
                url, status
            )));
        }
        Ok(response.json().await?)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        debug!("POST {}", url);
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CardHistoryError::Transport(format!(
                "POST {} returned status {}",
                url, status
            )));
        }
        Ok(response.json().await?)
    }
}
