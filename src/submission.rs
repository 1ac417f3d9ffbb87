//! Photo submission pipeline: from an incoming Telegram photo to a gallery
//! document awaiting review.
//!
//! The pipeline downloads the photo through the bot API, pushes it into the
//! CMS as an image asset, and creates the gallery document. Submissions from
//! admins skip moderation and publish immediately.

use crate::cms::GalleryStore;
use crate::db::{self, Pool};
use crate::model::GalleryStatus;
use crate::moderation::ModerationPolicy;
use crate::site::{self, PageInvalidator};
use crate::telegram::{Button, Messaging, PhotoRef};
use crate::texts;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::types::{ChatId, MessageId};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_pending_per_user: i64,
    pub max_upload_bytes: u32,
}

impl UploadLimits {
    pub fn from_app(app: &crate::config::App) -> Self {
        Self {
            max_pending_per_user: app.max_pending_per_user,
            max_upload_bytes: app.max_upload_bytes,
        }
    }
}

/// One photo message to run through the pipeline.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub chat: ChatId,
    pub user_id: i64,
    pub first_name: Option<String>,
    pub username: Option<String>,
    /// File id of the largest size variant of the photo.
    pub file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    NotSubscribed,
    TooLarge,
    PendingLimitReached,
    Accepted { item_id: String, published: bool },
    Failed,
}

pub struct SubmissionPipeline {
    db: Pool,
    store: Arc<dyn GalleryStore>,
    messaging: Arc<dyn Messaging>,
    invalidator: Arc<dyn PageInvalidator>,
    policy: ModerationPolicy,
    limits: UploadLimits,
    upload_dir: PathBuf,
}

impl SubmissionPipeline {
    pub fn new(
        db: Pool,
        store: Arc<dyn GalleryStore>,
        messaging: Arc<dyn Messaging>,
        invalidator: Arc<dyn PageInvalidator>,
        policy: ModerationPolicy,
        limits: UploadLimits,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            store,
            messaging,
            invalidator,
            policy,
            limits,
            upload_dir,
        }
    }

    /// Run one photo through the pipeline, reporting progress to the
    /// submitter as it goes. Never returns `Err`: failures are messaged back
    /// to the user and folded into the outcome.
    pub async fn submit(&self, req: UploadRequest) -> SubmissionOutcome {
        match db::is_subscribed(&self.db, req.user_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.tell(req.chat, texts::UPLOAD_NOT_SUBSCRIBED).await;
                return SubmissionOutcome::NotSubscribed;
            }
            Err(err) => {
                warn!(?err, "subscription lookup failed");
                self.tell(req.chat, texts::UPLOAD_FAILED).await;
                return SubmissionOutcome::Failed;
            }
        }

        let status_msg = self.messaging.send_text(req.chat, texts::UPLOAD_STATUS).await.ok();
        match self.run(&req).await {
            Ok(outcome) => {
                self.clear_status(req.chat, status_msg).await;
                self.report(&req, &outcome).await;
                outcome
            }
            Err(err) => {
                warn!(?err, user = req.user_id, "photo submission failed");
                self.clear_status(req.chat, status_msg).await;
                self.tell(req.chat, texts::UPLOAD_FAILED).await;
                SubmissionOutcome::Failed
            }
        }
    }

    async fn run(&self, req: &UploadRequest) -> Result<SubmissionOutcome> {
        let file = self.messaging.file_info(&req.file_id).await?;
        if file.size > self.limits.max_upload_bytes {
            return Ok(SubmissionOutcome::TooLarge);
        }

        // A failed count never blocks an upload, it only disables the cap.
        match self.store.count_pending_for(req.user_id).await {
            Ok(count) if count >= self.limits.max_pending_per_user => {
                return Ok(SubmissionOutcome::PendingLimitReached);
            }
            Ok(_) => {}
            Err(err) => warn!(?err, "pending count unavailable, skipping cap"),
        }

        let filename = format!("{}.jpg", file.unique_id);
        let dest = self.upload_dir.join(&filename);
        self.messaging.download_to(&file.path, &dest).await?;
        let bytes = tokio::fs::read(&dest).await?;
        if let Err(err) = tokio::fs::remove_file(&dest).await {
            warn!(?err, path = %dest.display(), "could not remove downloaded file");
        }

        let asset_id = self
            .store
            .upload_image(bytes, &filename, "image/jpeg")
            .await?;

        let published = self.policy.is_admin(req.user_id);
        let status = if published {
            GalleryStatus::Approved
        } else {
            GalleryStatus::Pending
        };
        let item_id = self
            .store
            .create_submission(
                &asset_id,
                req.user_id,
                req.first_name.as_deref(),
                req.username.as_deref(),
                status,
            )
            .await?;
        info!(
            item = %item_id,
            user = req.user_id,
            status = status.as_str(),
            "gallery submission created"
        );

        Ok(SubmissionOutcome::Accepted { item_id, published })
    }

    async fn report(&self, req: &UploadRequest, outcome: &SubmissionOutcome) {
        match outcome {
            SubmissionOutcome::TooLarge => {
                // The size check happens before the download, so size comes
                // from the bot API metadata.
                let size_mb = match self.messaging.file_info(&req.file_id).await {
                    Ok(file) => file.size as f64 / 1024.0 / 1024.0,
                    Err(_) => self.limits.max_upload_bytes as f64 / 1024.0 / 1024.0,
                };
                self.tell(req.chat, &texts::upload_file_too_big(size_mb)).await;
            }
            SubmissionOutcome::PendingLimitReached => {
                let count = self
                    .store
                    .count_pending_for(req.user_id)
                    .await
                    .unwrap_or(self.limits.max_pending_per_user);
                self.tell(
                    req.chat,
                    &texts::upload_pending_limit(count, self.limits.max_pending_per_user),
                )
                .await;
            }
            SubmissionOutcome::Accepted { item_id, published } => {
                if *published {
                    self.tell(req.chat, texts::UPLOAD_ADMIN_SUCCESS).await;
                    site::spawn_invalidate(
                        Arc::clone(&self.invalidator),
                        vec![site::GALLERY_PATH.to_string()],
                    );
                } else {
                    self.tell(req.chat, texts::UPLOAD_SUCCESS).await;
                    self.announce_for_review(req, item_id).await;
                }
            }
            SubmissionOutcome::NotSubscribed | SubmissionOutcome::Failed => {}
        }
    }

    /// Post the photo into the moderation chat with approve/reject buttons.
    async fn announce_for_review(&self, req: &UploadRequest, item_id: &str) {
        let Some(chat) = self.policy.moderation_chat else {
            warn!("no moderation chat configured, submission awaits /pending review");
            return;
        };
        let name = req.first_name.as_deref().unwrap_or("Unknown");
        let handle = match &req.username {
            Some(u) => format!("@{u}"),
            None => format!("User {}", req.user_id),
        };
        let caption = texts::moderation_caption(name, &handle, item_id);
        let buttons = vec![vec![
            Button::new(texts::BUTTON_APPROVE, format!("gallery_approve_{item_id}")),
            Button::new(texts::BUTTON_REJECT, format!("gallery_reject_{item_id}")),
        ]];
        if let Err(err) = self
            .messaging
            .send_photo(chat, PhotoRef::FileId(req.file_id.clone()), &caption, buttons)
            .await
        {
            warn!(?err, item = item_id, "could not post submission for review");
        }
    }

    async fn tell(&self, chat: ChatId, text: &str) {
        if let Err(err) = self.messaging.send_text(chat, text).await {
            warn!(?err, chat = chat.0, "could not message submitter");
        }
    }

    async fn clear_status(&self, chat: ChatId, status_msg: Option<MessageId>) {
        if let Some(id) = status_msg {
            if let Err(err) = self.messaging.delete_message(chat, id).await {
                warn!(?err, "could not remove upload status message");
            }
        }
    }
}
