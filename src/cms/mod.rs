use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::warn;

use crate::config::Sanity;
use crate::model::GalleryStatus;

pub mod model;

pub use model::GallerySubmission;

/// Sanity document ids are alphanumeric with dots, dashes and underscores.
/// Ids arrive from untrusted callback payloads, so anything else is refused
/// before it reaches a GROQ string.
static DOC_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"));

pub fn valid_doc_id(id: &str) -> bool {
    DOC_ID_RE.is_match(id)
}

/// Persistence seam for gallery submissions. The production impl talks to the
/// Sanity HTTP API; tests record calls and script responses.
#[async_trait]
pub trait GalleryStore: Send + Sync {
    /// Upload raw image bytes, returning the created asset id.
    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String>;

    /// Create a gallery document referencing an uploaded asset. Returns the
    /// new document id.
    async fn create_submission(
        &self,
        asset_id: &str,
        submitter_chat_id: i64,
        first_name: Option<&str>,
        username: Option<&str>,
        status: GalleryStatus,
    ) -> Result<String>;

    async fn get_submission(&self, id: &str) -> Result<Option<GallerySubmission>>;

    async fn set_status(&self, id: &str, status: GalleryStatus) -> Result<()>;

    async fn delete_submission(&self, id: &str) -> Result<()>;

    async fn delete_asset(&self, asset_id: &str) -> Result<()>;

    /// Pending submissions, oldest first.
    async fn pending_submissions(&self) -> Result<Vec<GallerySubmission>>;

    async fn count_pending_for(&self, submitter_chat_id: i64) -> Result<i64>;
}

#[derive(Clone)]
pub struct SanityClient {
    http: Client,
    base_url: Url,
    token: String,
    dataset: String,
    api_version: String,
}

impl fmt::Debug for SanityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SanityClient")
            .field("base_url", &self.base_url)
            .field("dataset", &self.dataset)
            .finish_non_exhaustive()
    }
}

impl SanityClient {
    pub fn from_config(cfg: &Sanity) -> Result<Self> {
        let base_url = Url::parse(&format!("https://{}.api.sanity.io/", cfg.project_id))
            .context("invalid Sanity project id")?;
        Ok(Self::with_base_url(
            cfg.token.clone(),
            cfg.dataset.clone(),
            cfg.api_version.clone(),
            base_url,
        ))
    }

    pub fn with_base_url(token: String, dataset: String, api_version: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("tg-relaybot/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            dataset,
            api_version,
        }
    }

    fn mutate_url(&self) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("v{}/data/mutate/{}", self.api_version, self.dataset))
            .context("invalid Sanity base URL")?;
        url.query_pairs_mut().append_pair("returnIds", "true");
        Ok(url)
    }

    fn query_url(&self, query: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("v{}/data/query/{}", self.api_version, self.dataset))
            .context("invalid Sanity base URL")?;
        url.query_pairs_mut().append_pair("query", query);
        Ok(url)
    }

    async fn execute_mutation(&self, body: Value) -> Result<Value> {
        let url = self.mutate_url()?;
        let res = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("failed to reach Sanity")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by Sanity: {}", body);
            return Err(anyhow!("received 429 from Sanity: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "Sanity mutation failed: {}", body);
            return Err(anyhow!("sanity error {}: {}", status, body));
        }
        res.json::<Value>().await.context("invalid Sanity response JSON")
    }

    async fn execute_query(&self, query: &str) -> Result<Value> {
        let url = self.query_url(query)?;
        let res = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .context("failed to reach Sanity")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by Sanity: {}", body);
            return Err(anyhow!("received 429 from Sanity: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "Sanity query failed: {}", body);
            return Err(anyhow!("sanity error {}: {}", status, body));
        }
        let payload = res.json::<Value>().await.context("invalid Sanity response JSON")?;
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl GalleryStore for SanityClient {
    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String> {
        let url = self
            .base_url
            .join(&format!(
                "v{}/assets/images/{}",
                self.api_version, self.dataset
            ))
            .context("invalid Sanity base URL")?;

        let res = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", content_type)
            .header("Filename", filename)
            .body(bytes)
            .send()
            .await
            .context("failed to reach Sanity")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "Sanity asset upload failed: {}", body);
            return Err(anyhow!("sanity asset upload failed {}: {}", status, body));
        }

        let payload = res.json::<Value>().await.context("invalid Sanity response JSON")?;
        // The created asset document arrives under `document`, older API
        // versions return it at the top level.
        payload
            .pointer("/document/_id")
            .or_else(|| payload.get("_id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("sanity asset upload returned no asset id"))
    }

    async fn create_submission(
        &self,
        asset_id: &str,
        submitter_chat_id: i64,
        first_name: Option<&str>,
        username: Option<&str>,
        status: GalleryStatus,
    ) -> Result<String> {
        let body = build_create_submission(
            asset_id,
            submitter_chat_id,
            first_name,
            username,
            status,
            Utc::now(),
        );
        let payload = self.execute_mutation(body).await?;
        payload
            .pointer("/results/0/id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("sanity create returned no document id"))
    }

    async fn get_submission(&self, id: &str) -> Result<Option<GallerySubmission>> {
        if !valid_doc_id(id) {
            return Err(anyhow!("invalid document id"));
        }
        let result = self.execute_query(&submission_query(id)).await?;
        Ok(parse_submission(&result))
    }

    async fn set_status(&self, id: &str, status: GalleryStatus) -> Result<()> {
        if !valid_doc_id(id) {
            return Err(anyhow!("invalid document id"));
        }
        let body = build_set_status(id, status, Utc::now());
        self.execute_mutation(body).await?;
        Ok(())
    }

    async fn delete_submission(&self, id: &str) -> Result<()> {
        if !valid_doc_id(id) {
            return Err(anyhow!("invalid document id"));
        }
        self.execute_mutation(build_delete(id)).await?;
        Ok(())
    }

    async fn delete_asset(&self, asset_id: &str) -> Result<()> {
        if !valid_doc_id(asset_id) {
            return Err(anyhow!("invalid asset id"));
        }
        self.execute_mutation(build_delete(asset_id)).await?;
        Ok(())
    }

    async fn pending_submissions(&self) -> Result<Vec<GallerySubmission>> {
        let result = self.execute_query(pending_query()).await?;
        let items = result
            .as_array()
            .map(|arr| arr.iter().filter_map(parse_submission_ref).collect())
            .unwrap_or_default();
        Ok(items)
    }

    async fn count_pending_for(&self, submitter_chat_id: i64) -> Result<i64> {
        let result = self.execute_query(&count_pending_query(submitter_chat_id)).await?;
        Ok(result.as_i64().unwrap_or(0))
    }
}

pub fn build_create_submission(
    asset_id: &str,
    submitter_chat_id: i64,
    first_name: Option<&str>,
    username: Option<&str>,
    status: GalleryStatus,
    uploaded_at: DateTime<Utc>,
) -> Value {
    json!({
        "mutations": [
            {
                "create": {
                    "_type": "gallery",
                    "image": {
                        "_type": "image",
                        "asset": { "_ref": asset_id, "_type": "reference" }
                    },
                    "telegramId": submitter_chat_id.to_string(),
                    "firstName": first_name,
                    "username": username,
                    "uploadedAt": uploaded_at.to_rfc3339(),
                    "status": status.as_str(),
                }
            }
        ]
    })
}

pub fn build_set_status(id: &str, status: GalleryStatus, moderated_at: DateTime<Utc>) -> Value {
    json!({
        "mutations": [
            {
                "patch": {
                    "id": id,
                    "set": {
                        "status": status.as_str(),
                        "moderatedAt": moderated_at.to_rfc3339(),
                    }
                }
            }
        ]
    })
}

pub fn build_delete(id: &str) -> Value {
    json!({
        "mutations": [
            { "delete": { "id": id } }
        ]
    })
}

pub fn submission_query(id: &str) -> String {
    format!(
        "*[_id == \"{id}\"][0]{{_id, _createdAt, status, telegramId, firstName, username, \
image{{asset->{{_id, url}}}}}}"
    )
}

pub fn pending_query() -> &'static str {
    "*[_type == \"gallery\" && status == \"pending\"] | order(_createdAt asc)\
{_id, _createdAt, status, telegramId, firstName, username, image{asset->{_id, url}}}"
}

pub fn count_pending_query(submitter_chat_id: i64) -> String {
    format!(
        "count(*[_type == \"gallery\" && status == \"pending\" && telegramId == \"{submitter_chat_id}\"])"
    )
}

fn parse_submission_ref(value: &Value) -> Option<GallerySubmission> {
    parse_submission(value)
}

/// Map a projected gallery document into a typed submission. Returns `None`
/// for null results or documents without an id.
pub fn parse_submission(value: &Value) -> Option<GallerySubmission> {
    let obj = value.as_object()?;
    let id = obj.get("_id")?.as_str()?.to_string();
    let status = obj
        .get("status")
        .and_then(|v| v.as_str())
        .and_then(GalleryStatus::parse)
        .unwrap_or(GalleryStatus::Pending);
    let submitter_chat_id = obj
        .get("telegramId")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<i64>().ok());
    let created_at = obj
        .get("_createdAt")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(GallerySubmission {
        id,
        status,
        submitter_chat_id,
        first_name: obj
            .get("firstName")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        username: obj
            .get("username")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        asset_id: value
            .pointer("/image/asset/_id")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        image_url: value
            .pointer("/image/asset/url")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        created_at,
    })
}
