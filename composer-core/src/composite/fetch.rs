//! Fetching root configuration documents
//!
//! A location that starts with `http://` or `https://` is retrieved through an
//! [`HttpGetter`]; anything else is opened as a local file.

use anyhow::Result;
use async_trait::async_trait;
use std::io::{Cursor, Read};
use tracing::debug;

use crate::context::Context;
use crate::error::CompositeError;

/// Capability to GET a URL and return the response body
#[async_trait]
pub trait HttpGetter: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Whether `location` should be fetched over HTTP
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Fetch the catalog configuration document
pub async fn fetch_catalog_config(
    ctx: &Context,
    location: &str,
    getter: &dyn HttpGetter,
) -> Result<Box<dyn Read + Send>, CompositeError> {
    fetch_config(ctx, "catalog config", location, getter).await
}

/// Fetch the contribution configuration document
pub async fn fetch_composite_config(
    ctx: &Context,
    location: &str,
    getter: &dyn HttpGetter,
) -> Result<Box<dyn Read + Send>, CompositeError> {
    fetch_config(ctx, "composite config", location, getter).await
}

async fn fetch_config(
    ctx: &Context,
    document: &'static str,
    location: &str,
    getter: &dyn HttpGetter,
) -> Result<Box<dyn Read + Send>, CompositeError> {
    if is_remote(location) {
        debug!("Fetching remote {} from {}", document, location);
        let body = ctx
            .run(getter.get(location))
            .await?
            .map_err(|e| CompositeError::FetchRemoteConfig {
                document,
                url: location.to_string(),
                source: e.into(),
            })?;
        return Ok(Box::new(Cursor::new(body)));
    }

    debug!("Opening local {} at {}", document, location);
    let file = std::fs::File::open(location).map_err(|source| CompositeError::OpenConfig {
        document,
        path: location.to_string(),
        source,
    })?;
    Ok(Box::new(file))
}

/// HTTP getter backed by a `reqwest` client
#[cfg(feature = "remote")]
pub struct ReqwestGetter {
    client: reqwest::Client,
}

#[cfg(feature = "remote")]
impl ReqwestGetter {
    pub fn new() -> Result<Self> {
        Self::with_timeout(std::time::Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Result<Self> {
        use anyhow::Context as _;

        let client = reqwest::Client::builder()
            .user_agent(concat!("catalog-composer/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[cfg(feature = "remote")]
#[async_trait]
impl HttpGetter for ReqwestGetter {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP {}", response.status());
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Stub for when the remote feature is disabled
#[cfg(not(feature = "remote"))]
#[derive(Debug, Default)]
pub struct ReqwestGetter;

#[cfg(not(feature = "remote"))]
impl ReqwestGetter {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }

    pub fn with_timeout(_timeout: std::time::Duration) -> Result<Self> {
        Ok(Self)
    }
}

#[cfg(not(feature = "remote"))]
#[async_trait]
impl HttpGetter for ReqwestGetter {
    async fn get(&self, _url: &str) -> Result<Vec<u8>> {
        anyhow::bail!("Remote fetching is not enabled. Rebuild with --features remote")
    }
}
