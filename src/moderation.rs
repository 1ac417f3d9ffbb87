//! Moderation decisions for gallery submissions.
//!
//! A decision runs through fixed gates: authorization, a fresh load of the
//! document, an idempotence check against its current status, then the single
//! status write. Everything after the write is best-effort cleanup; a failed
//! side effect is logged and never undoes the decision.

use crate::cms::{model::GallerySubmission, GalleryStore};
use crate::config;
use crate::model::{GalleryStatus, ModerationDecision};
use crate::site::{self, PageInvalidator};
use crate::telegram::{Messaging, PhotoRef};
use crate::texts;
use anyhow::Result;
use std::sync::Arc;
use teloxide::types::{ChatId, MessageId};
use tracing::{info, warn};

/// Who may act on moderation buttons.
#[derive(Debug, Clone)]
pub struct ModerationPolicy {
    pub moderation_chat: Option<ChatId>,
    pub admin_ids: Vec<i64>,
}

impl ModerationPolicy {
    pub fn from_config(cfg: &config::Telegram) -> Self {
        Self {
            moderation_chat: cfg.moderation_chat_id.map(ChatId),
            admin_ids: cfg.admin_ids.clone(),
        }
    }

    /// A press is allowed from inside the moderation chat, or from an admin
    /// account anywhere.
    pub fn allows(&self, origin: ChatId, actor: i64) -> bool {
        self.moderation_chat == Some(origin) || self.admin_ids.contains(&actor)
    }

    pub fn is_admin(&self, actor: i64) -> bool {
        self.admin_ids.contains(&actor)
    }
}

/// Where the button press came from.
#[derive(Debug, Clone)]
pub struct ModerationContext {
    pub callback_id: String,
    pub actor_id: i64,
    pub origin_chat: ChatId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationOutcome {
    Applied(ModerationDecision),
    Unauthorized,
    NotFound,
    AlreadyModerated(GalleryStatus),
}

pub struct Moderator {
    store: Arc<dyn GalleryStore>,
    messaging: Arc<dyn Messaging>,
    invalidator: Arc<dyn PageInvalidator>,
    policy: ModerationPolicy,
}

impl Moderator {
    pub fn new(
        store: Arc<dyn GalleryStore>,
        messaging: Arc<dyn Messaging>,
        invalidator: Arc<dyn PageInvalidator>,
        policy: ModerationPolicy,
    ) -> Self {
        Self {
            store,
            messaging,
            invalidator,
            policy,
        }
    }

    /// Apply a moderation decision to one submission.
    ///
    /// Returns `Err` only when the status write itself fails; every refused
    /// press is still acked so the spinner on the button clears.
    pub async fn handle(
        &self,
        decision: ModerationDecision,
        item_id: &str,
        ctx: &ModerationContext,
    ) -> Result<ModerationOutcome> {
        if !self.policy.allows(ctx.origin_chat, ctx.actor_id) {
            warn!(
                actor = ctx.actor_id,
                chat = ctx.origin_chat.0,
                "moderation press from outside the moderation chat"
            );
            self.ack(ctx, texts::MODERATION_UNAUTHORIZED).await;
            return Ok(ModerationOutcome::Unauthorized);
        }

        // Always a fresh load: two moderators can race on the same buttons.
        let submission = match self.store.get_submission(item_id).await? {
            Some(s) => s,
            None => {
                self.ack(ctx, texts::MODERATION_NOT_FOUND).await;
                return Ok(ModerationOutcome::NotFound);
            }
        };

        if submission.status.is_terminal() {
            self.ack(ctx, &texts::moderation_already(submission.status.as_str()))
                .await;
            return Ok(ModerationOutcome::AlreadyModerated(submission.status));
        }

        let target = decision.target_status();
        self.store.set_status(item_id, target).await?;
        info!(
            item = item_id,
            status = target.as_str(),
            actor = ctx.actor_id,
            "submission moderated"
        );

        let ack_text = match decision {
            ModerationDecision::Approve => texts::MODERATION_APPROVED,
            ModerationDecision::Reject => texts::MODERATION_REJECTED,
        };
        self.ack(ctx, ack_text).await;
        self.remove_review_message(ctx).await;
        self.notify_submitter(&submission, decision).await;

        if decision == ModerationDecision::Reject {
            self.discard_rejected(&submission).await;
        }

        site::spawn_invalidate(
            Arc::clone(&self.invalidator),
            vec![site::GALLERY_PATH.to_string()],
        );

        Ok(ModerationOutcome::Applied(decision))
    }

    async fn ack(&self, ctx: &ModerationContext, text: &str) {
        if let Err(err) = self
            .messaging
            .answer_callback(&ctx.callback_id, Some(text))
            .await
        {
            warn!(?err, "failed to answer moderation callback");
        }
    }

    /// Remove the review card from the moderation chat. If the delete fails
    /// (too old, already gone) fall back to stripping its buttons.
    async fn remove_review_message(&self, ctx: &ModerationContext) {
        if let Err(err) = self
            .messaging
            .delete_message(ctx.origin_chat, ctx.message_id)
            .await
        {
            warn!(?err, "could not delete review message, clearing buttons");
            if let Err(err) = self
                .messaging
                .clear_buttons(ctx.origin_chat, ctx.message_id)
                .await
            {
                warn!(?err, "could not clear review message buttons");
            }
        }
    }

    async fn notify_submitter(&self, submission: &GallerySubmission, decision: ModerationDecision) {
        let Some(chat_id) = submission.submitter_chat_id else {
            return;
        };
        let chat = ChatId(chat_id);
        let text = match decision {
            ModerationDecision::Approve => texts::NOTIFY_APPROVED,
            ModerationDecision::Reject => texts::NOTIFY_REJECTED,
        };

        if let Some(url) = &submission.image_url {
            match self
                .messaging
                .send_photo(chat, PhotoRef::Url(url.clone()), text, Vec::new())
                .await
            {
                Ok(_) => return,
                Err(err) => {
                    warn!(?err, chat = chat_id, "photo notification failed, sending text")
                }
            }
        }
        if let Err(err) = self.messaging.send_text(chat, text).await {
            warn!(?err, chat = chat_id, "could not notify submitter");
        }
    }

    /// Rejected images do not stay in the CMS. Drop the document first so the
    /// asset is unreferenced by the time it is deleted.
    async fn discard_rejected(&self, submission: &GallerySubmission) {
        if let Err(err) = self.store.delete_submission(&submission.id).await {
            warn!(?err, item = %submission.id, "could not delete rejected document");
            return;
        }
        if let Some(asset_id) = &submission.asset_id {
            if let Err(err) = self.store.delete_asset(asset_id).await {
                warn!(?err, asset = %asset_id, "could not delete rejected asset");
            }
        }
    }
}
