/// Directory Client - Authenticated access to the Tailscale API
use crate::{
    config::DirectoryConfig,
    directory::{Device, DevicesResponse, DirectorySnapshot, WhoIsResponse},
    error::{TailnetError, TailnetResult},
};
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Source of device records
///
/// One request per call, no retries. Callers decide when to try again.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetch every device in the tailnet
    async fn fetch_directory(&self) -> TailnetResult<DirectorySnapshot>;

    /// Ask the directory who owns `addr`; `None` when nobody does
    async fn fetch_by_address(&self, addr: &str) -> TailnetResult<Option<Device>>;
}

/// Tailscale API client
#[derive(Clone)]
pub struct TailscaleClient {
    http_client: reqwest::Client,
    base_url: String,
    tailnet: String,
    api_key: String,
}

impl TailscaleClient {
    /// Create a new client from directory settings
    pub fn new(config: &DirectoryConfig) -> TailnetResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| TailnetError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            tailnet: config.tailnet.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn tailnet_url(&self, endpoint: &str) -> String {
        format!(
            "{}/api/v2/tailnet/{}/{}",
            self.base_url,
            urlencoding::encode(&self.tailnet),
            endpoint
        )
    }

    async fn get(&self, url: &str) -> TailnetResult<reqwest::Response> {
        debug!(url = %url, "directory request");

        self.http_client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| TailnetError::Fetch(format!("Failed to make request: {}", e)))
    }
}

#[async_trait]
impl DirectoryClient for TailscaleClient {
    async fn fetch_directory(&self) -> TailnetResult<DirectorySnapshot> {
        let response = self.get(&self.tailnet_url("devices")).await?;

        if !response.status().is_success() {
            return Err(TailnetError::Fetch(format!(
                "API request failed with status {}",
                response.status()
            )));
        }

        let last_update = response
            .headers()
            .get(header::DATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let devices: DevicesResponse = response
            .json()
            .await
            .map_err(|e| TailnetError::Fetch(format!("Failed to decode device list: {}", e)))?;

        Ok(DirectorySnapshot::from_devices(devices.devices, last_update))
    }

    async fn fetch_by_address(&self, addr: &str) -> TailnetResult<Option<Device>> {
        let url = format!(
            "{}?addr={}",
            self.tailnet_url("whois"),
            urlencoding::encode(addr)
        );
        let response = self.get(&url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(TailnetError::Fetch(format!(
                "API request failed with status {}",
                response.status()
            )));
        }

        let whois: WhoIsResponse = response
            .json()
            .await
            .map_err(|e| TailnetError::Fetch(format!("Failed to decode whois response: {}", e)))?;

        Ok(Some(whois.into()))
    }
}
