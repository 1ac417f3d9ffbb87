//! Routing for incoming Telegram updates.
//!
//! Updates arrive over the webhook, get parsed by teloxide, and land here.
//! Commands and photo submissions come in as messages; moderation and
//! subscribe buttons come in as callback queries.

use crate::cms::GalleryStore;
use crate::db::{self, Pool};
use crate::dispatch::BatchConfig;
use crate::model::{CallbackAction, SubscribeOutcome, UnsubscribeOutcome};
use crate::moderation::{ModerationContext, ModerationPolicy, Moderator};
use crate::site::PageInvalidator;
use crate::submission::{SubmissionPipeline, UploadRequest};
use crate::telegram::{Button, Messaging, PhotoRef};
use crate::texts;
use anyhow::Result;
use std::sync::Arc;
use teloxide::types::{
    CallbackQuery, Chat, ChatId, ChatKind, MediaKind, Message, MessageKind, PublicChatKind,
    Update, UpdateKind, User,
};
use tracing::{debug, info, instrument, warn};

/// Everything the update handlers need, shared behind one `Arc`.
pub struct Relay {
    pub db: Pool,
    pub messaging: Arc<dyn Messaging>,
    pub store: Arc<dyn GalleryStore>,
    pub invalidator: Arc<dyn PageInvalidator>,
    pub moderator: Moderator,
    pub pipeline: SubmissionPipeline,
    pub policy: ModerationPolicy,
    pub batch: BatchConfig,
}

#[instrument(skip_all, fields(update_id = update.id))]
pub async fn handle_update(relay: &Relay, update: Update) -> Result<()> {
    match update.kind {
        UpdateKind::Message(msg) => handle_message(relay, &msg).await,
        UpdateKind::CallbackQuery(q) => handle_callback(relay, &q).await,
        _ => {
            debug!("ignoring unhandled update kind");
            Ok(())
        }
    }
}

async fn handle_message(relay: &Relay, msg: &Message) -> Result<()> {
    let user = match msg.from() {
        Some(u) => u,
        None => return Ok(()),
    };

    match &msg.kind {
        MessageKind::Common(common) => {
            if let Some(text) = msg.text() {
                return handle_text(relay, msg, user, text).await;
            }
            match &common.media_kind {
                MediaKind::Photo(photo) => {
                    // Photo submissions only make sense in a direct chat.
                    if !msg.chat.is_private() {
                        return Ok(());
                    }
                    if let Some(size) = photo.photo.last() {
                        relay
                            .pipeline
                            .submit(UploadRequest {
                                chat: msg.chat.id,
                                user_id: user.id.0 as i64,
                                first_name: Some(user.first_name.clone()),
                                username: user.username.clone(),
                                file_id: size.file.id.clone(),
                            })
                            .await;
                    } else {
                        let _ = relay
                            .messaging
                            .send_text(msg.chat.id, texts::UPLOAD_FILE_NOT_FOUND)
                            .await;
                    }
                }
                _ => {}
            }
        }
        MessageKind::WebAppData(data) => {
            if CallbackAction::parse(&data.web_app_data.data) == CallbackAction::Subscribe {
                subscribe(relay, msg.chat.id, user).await?;
            }
        }
        _ => {}
    }

    Ok(())
}

async fn handle_text(relay: &Relay, msg: &Message, user: &User, text: &str) -> Result<()> {
    let chat = msg.chat.id;
    let user_id = user.id.0 as i64;
    let command = text
        .trim()
        .split_whitespace()
        .next()
        .map(|token| token.split('@').next().unwrap_or(token))
        .unwrap_or_default();

    match command {
        "/start" => {
            if db::is_subscribed(&relay.db, user_id).await? {
                let _ = relay.messaging.send_text(chat, texts::START_WELCOME).await;
            } else {
                let buttons = vec![vec![Button::new(
                    texts::BUTTON_SUBSCRIBE,
                    r#"{"action":"subscribe"}"#,
                )]];
                let _ = relay
                    .messaging
                    .send_text_with_buttons(chat, texts::START_WELCOME, buttons)
                    .await;
            }
        }
        "/subscribe" => {
            subscribe(relay, chat, user).await?;
        }
        "/unsubscribe" => {
            if !msg.chat.is_private() {
                let _ = relay
                    .messaging
                    .send_text(chat, texts::UNSUBSCRIBE_PRIVATE_ONLY)
                    .await;
                return Ok(());
            }
            let reply = match db::remove_subscriber(&relay.db, user_id).await? {
                UnsubscribeOutcome::Unsubscribed => texts::UNSUBSCRIBE_FAREWELL,
                UnsubscribeOutcome::NotSubscribed => texts::UNSUBSCRIBE_NOT_SUBSCRIBED,
            };
            let _ = relay.messaging.send_text(chat, reply).await;
        }
        "/chatid" => {
            let info = texts::chat_info(chat.0, msg.chat.title(), chat_kind(&msg.chat));
            let _ = relay.messaging.send_text(chat, &info).await;
        }
        "/pending" => {
            // Only the moderation chat sees the queue; anywhere else the
            // command is silently dropped.
            if relay.policy.moderation_chat != Some(chat) {
                warn!(chat = chat.0, user = user_id, "/pending outside moderation chat");
                return Ok(());
            }
            send_pending_queue(relay, chat).await?;
        }
        "/upload" => {
            if !msg.chat.is_private() {
                warn!(chat = chat.0, user = user_id, "/upload outside a direct chat");
                return Ok(());
            }
            let reply = if db::is_subscribed(&relay.db, user_id).await? {
                texts::UPLOAD_PROMPT
            } else {
                texts::UPLOAD_NOT_SUBSCRIBED
            };
            let _ = relay.messaging.send_text(chat, reply).await;
        }
        other if other.starts_with('/') => {
            debug!(command = other, "unrouted command");
        }
        _ => {}
    }

    Ok(())
}

async fn subscribe(relay: &Relay, chat: ChatId, user: &User) -> Result<()> {
    let outcome = db::add_subscriber(
        &relay.db,
        user.id.0 as i64,
        user.username.as_deref(),
        Some(&user.first_name),
    )
    .await?;
    let reply = match outcome {
        SubscribeOutcome::Subscribed => {
            info!(user = user.id.0, "new subscriber");
            texts::SUBSCRIBE_SUCCESS
        }
        SubscribeOutcome::AlreadySubscribed => texts::SUBSCRIBE_ALREADY,
    };
    let _ = relay.messaging.send_text(chat, reply).await;
    Ok(())
}

/// Post the pending queue into the moderation chat, one card per submission.
async fn send_pending_queue(relay: &Relay, chat: ChatId) -> Result<()> {
    let pending = relay.store.pending_submissions().await?;
    if pending.is_empty() {
        let _ = relay.messaging.send_text(chat, texts::PENDING_NONE).await;
        return Ok(());
    }

    let _ = relay
        .messaging
        .send_text(chat, &texts::pending_summary(pending.len()))
        .await;

    for submission in &pending {
        let caption =
            texts::moderation_caption(submission.display_name(), &submission.handle(), &submission.id);
        let buttons = vec![vec![
            Button::new(
                texts::BUTTON_APPROVE,
                format!("gallery_approve_{}", submission.id),
            ),
            Button::new(
                texts::BUTTON_REJECT,
                format!("gallery_reject_{}", submission.id),
            ),
        ]];
        let sent = match &submission.image_url {
            Some(url) => {
                relay
                    .messaging
                    .send_photo(chat, PhotoRef::Url(url.clone()), &caption, buttons)
                    .await
            }
            None => {
                relay
                    .messaging
                    .send_text_with_buttons(chat, &caption, buttons)
                    .await
            }
        };
        if let Err(err) = sent {
            warn!(?err, item = %submission.id, "could not post pending card");
        }
    }
    Ok(())
}

async fn handle_callback(relay: &Relay, q: &CallbackQuery) -> Result<()> {
    let data = match q.data.as_deref() {
        Some(d) => d,
        None => {
            let _ = relay.messaging.answer_callback(&q.id, None).await;
            return Ok(());
        }
    };

    match CallbackAction::parse(data) {
        CallbackAction::Moderate { decision, item_id } => {
            let msg = match &q.message {
                Some(m) => m,
                None => {
                    warn!(callback = %q.id, "moderation callback without source message");
                    let _ = relay.messaging.answer_callback(&q.id, None).await;
                    return Ok(());
                }
            };
            let ctx = ModerationContext {
                callback_id: q.id.clone(),
                actor_id: q.from.id.0 as i64,
                origin_chat: msg.chat.id,
                message_id: msg.id,
            };
            let outcome = relay.moderator.handle(decision, &item_id, &ctx).await?;
            debug!(?outcome, item = %item_id, "moderation callback handled");
        }
        CallbackAction::Subscribe => {
            let _ = relay.messaging.answer_callback(&q.id, None).await;
            let chat = q
                .message
                .as_ref()
                .map(|m| m.chat.id)
                .unwrap_or(ChatId(q.from.id.0 as i64));
            subscribe(relay, chat, &q.from).await?;
        }
        CallbackAction::Unknown => {
            debug!(callback = %q.id, "unknown callback payload");
            let _ = relay.messaging.answer_callback(&q.id, None).await;
        }
    }

    Ok(())
}

fn chat_kind(chat: &Chat) -> &'static str {
    match &chat.kind {
        ChatKind::Private(_) => "private",
        ChatKind::Public(public) => match public.kind {
            PublicChatKind::Group(_) => "group",
            PublicChatKind::Supergroup(_) => "supergroup",
            PublicChatKind::Channel(_) => "channel",
        },
    }
}
