//! Inventory API client used by the poll watcher.

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::store::ServiceObject;

/// Response body of the inventory listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ServiceList {
    pub services: Vec<ServiceObject>,
}

/// Inventory API client.
pub struct InventoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl InventoryClient {
    /// Create a new inventory client.
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(&config.inventory_url)
    }

    /// Create a client targeting an explicit base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the full current service inventory.
    pub async fn list_services(&self) -> Result<Vec<ServiceObject>> {
        let url = format!("{}/v1/services", self.base_url);
        debug!(url = %url, "Listing services");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to list services: {} - {}", status, body);
        }

        let list: ServiceList = response.json().await?;
        debug!(count = list.services.len(), "Listed services");

        Ok(list.services)
    }
}
