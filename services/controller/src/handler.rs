//! Handler contract and implementations.
//!
//! Handlers perform the domain side effects of reconciliation. The
//! controller treats every handler error as transient and retries with
//! backoff, so handlers must be idempotent: redelivery happens after
//! failed attempts and after restarts, and the state passed in may be
//! newer than the change that triggered the notification.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::item::ResourceKey;
use crate::store::ServiceObject;

/// Capability contract for reacting to resource state.
#[async_trait]
pub trait Handler: Send + Sync {
    /// A newly observed object's state is available.
    async fn object_created(&self, object: &ServiceObject) -> Result<()>;

    /// An object changed; `object` is the state current at dequeue
    /// time, not necessarily the state that triggered the notification.
    async fn object_updated(&self, object: &ServiceObject) -> Result<()>;

    /// An object is gone; only its identity is still known.
    async fn object_deleted(&self, key: &ResourceKey) -> Result<()>;
}

/// Handler that only logs transitions. Useful for dry runs and as the
/// default when no tag API is configured.
pub struct LogHandler;

#[async_trait]
impl Handler for LogHandler {
    async fn object_created(&self, object: &ServiceObject) -> Result<()> {
        info!(
            key = %object.key(),
            service_type = %object.service_type,
            "Service created"
        );
        Ok(())
    }

    async fn object_updated(&self, object: &ServiceObject) -> Result<()> {
        info!(
            key = %object.key(),
            service_type = %object.service_type,
            version = %object.resource_version,
            "Service updated"
        );
        Ok(())
    }

    async fn object_deleted(&self, key: &ResourceKey) -> Result<()> {
        info!(key = %key, "Service no longer exists");
        Ok(())
    }
}

/// Tag payload written to the external tag API.
#[derive(Debug, Serialize)]
struct TagRequest {
    tags: BTreeMap<String, String>,
}

/// Handler that mirrors service state into an external tag API.
///
/// Writes use PUT and deletes tolerate 404, so repeated delivery of
/// the same state converges to the same remote tags.
pub struct TagApiHandler {
    client: reqwest::Client,
    base_url: String,
}

impl TagApiHandler {
    /// Create a handler targeting the configured tag API.
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(&config.tag_api_url)
    }

    /// Create a handler targeting an explicit base URL.
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

    fn tag_url(&self, key: &ResourceKey) -> String {
        format!("{}/v1/tags/{}", self.base_url, key)
    }

    fn tags_for(object: &ServiceObject) -> BTreeMap<String, String> {
        let mut tags = object.labels.clone();
        tags.insert("tagsync/namespace".to_string(), object.namespace.clone());
        tags.insert("tagsync/service-type".to_string(), object.service_type.clone());
        if let Some(address) = &object.external_address {
            tags.insert("tagsync/external-address".to_string(), address.clone());
        }
        tags
    }

    async fn put_tags(&self, object: &ServiceObject) -> Result<()> {
        let key = object.key();
        let url = self.tag_url(&key);
        let request = TagRequest {
            tags: Self::tags_for(object),
        };
        debug!(key = %key, url = %url, "Writing tags");

        let response = self.client.put(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to write tags for '{}': {} - {}", key, status, body);
        }

        Ok(())
    }
}

#[async_trait]
impl Handler for TagApiHandler {
    async fn object_created(&self, object: &ServiceObject) -> Result<()> {
        self.put_tags(object).await
    }

    async fn object_updated(&self, object: &ServiceObject) -> Result<()> {
        self.put_tags(object).await
    }

    async fn object_deleted(&self, key: &ResourceKey) -> Result<()> {
        let url = self.tag_url(key);
        debug!(key = %key, url = %url, "Removing tags");

        let response = self.client.delete(&url).send().await?;

        // The remote tags may already be gone; deletion is idempotent.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to remove tags for '{}': {} - {}", key, status, body);
        }

        Ok(())
    }
}
