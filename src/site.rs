//! Revalidation calls against the public site.
//!
//! Approving or rejecting a gallery item changes what the site should render,
//! so the site is asked to rebuild the affected pages. The call is best-effort:
//! moderation already happened by the time we get here.

use crate::config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub const GALLERY_PATH: &str = "/gallery";

#[async_trait]
pub trait PageInvalidator: Send + Sync {
    async fn invalidate(&self, paths: &[&str]) -> Result<()>;
}

/// Production invalidator targeting the site's revalidation endpoint.
#[derive(Clone)]
pub struct SiteClient {
    http: reqwest::Client,
    base_url: String,
    secret: String,
}

impl SiteClient {
    pub fn from_config(cfg: &config::Site) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            secret: cfg.revalidate_secret.clone(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: &str, secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
        }
    }
}

impl fmt::Debug for SiteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PageInvalidator for SiteClient {
    async fn invalidate(&self, paths: &[&str]) -> Result<()> {
        let url = format!("{}/api/revalidate", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("x-revalidate-secret", &self.secret)
            .json(&serde_json::json!({ "paths": paths }))
            .send()
            .await
            .context("revalidate request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("revalidate returned {status}: {body}");
        }
        debug!(?paths, "site revalidated");
        Ok(())
    }
}

/// Kick off revalidation without holding up the caller. Failures are logged
/// and dropped.
pub fn spawn_invalidate(invalidator: Arc<dyn PageInvalidator>, paths: Vec<String>) {
    tokio::spawn(async move {
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        if let Err(err) = invalidator.invalidate(&refs).await {
            warn!(?err, ?paths, "site revalidation failed");
        }
    });
}
