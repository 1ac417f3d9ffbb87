//! Shared fixtures for the integration tests: recording fakes for the
//! Telegram gateway, the CMS, and the site invalidator, plus raw update
//! payloads shaped like the bot API sends them.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teloxide::types::{ChatId, MessageId, Update};
use tg_relaybot::cms::model::GallerySubmission;
use tg_relaybot::cms::GalleryStore;
use tg_relaybot::dispatch::BatchConfig;
use tg_relaybot::handlers::Relay;
use tg_relaybot::model::GalleryStatus;
use tg_relaybot::moderation::{ModerationPolicy, Moderator};
use tg_relaybot::server::{AppState, Secrets};
use tg_relaybot::site::PageInvalidator;
use tg_relaybot::submission::{SubmissionPipeline, UploadLimits};
use tg_relaybot::telegram::{Button, Messaging, PhotoRef, RemoteFile};

pub const MOD_CHAT: i64 = -100500;
pub const ADMIN_ID: i64 = 777000;

pub const TELEGRAM_SECRET: &str = "tg-webhook-secret";
pub const SANITY_SECRET: &str = "sanity-signature";
pub const NOTIFY_SECRET: &str = "notify-secret";
pub const API_KEY: &str = "operator-key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat: i64,
        text: String,
    },
    TextWithButtons {
        chat: i64,
        text: String,
        callbacks: Vec<String>,
    },
    Photo {
        chat: i64,
        caption: String,
        callbacks: Vec<String>,
    },
    Ack {
        id: String,
        text: Option<String>,
    },
    Deleted {
        chat: i64,
    },
    ClearedButtons {
        chat: i64,
    },
}

pub struct RecordingMessaging {
    calls: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    pub file_size: AtomicU32,
    failing_chats: Mutex<HashSet<i64>>,
}

impl RecordingMessaging {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            file_size: AtomicU32::new(100_000),
            failing_chats: Mutex::new(HashSet::new()),
        }
    }

    pub fn calls(&self) -> Vec<Sent> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat: i64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Sent::Text { chat: ch, text } | Sent::TextWithButtons { chat: ch, text, .. }
                    if ch == chat =>
                {
                    Some(text)
                }
                _ => None,
            })
            .collect()
    }

    pub fn fail_sends_to(&self, chat: i64) {
        self.failing_chats.lock().unwrap().insert(chat);
    }

    fn refuse(&self, chat: ChatId) -> Result<()> {
        if self.failing_chats.lock().unwrap().contains(&chat.0) {
            Err(anyhow!("chat {chat} blocked the bot"))
        } else {
            Ok(())
        }
    }

    fn next(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) as i32)
    }
}

fn flatten(buttons: Vec<Vec<Button>>) -> Vec<String> {
    buttons
        .into_iter()
        .flatten()
        .map(|b| b.callback_data)
        .collect()
}

#[async_trait]
impl Messaging for RecordingMessaging {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId> {
        self.refuse(chat)?;
        self.calls.lock().unwrap().push(Sent::Text {
            chat: chat.0,
            text: text.to_string(),
        });
        Ok(self.next())
    }

    async fn send_text_with_buttons(
        &self,
        chat: ChatId,
        text: &str,
        buttons: Vec<Vec<Button>>,
    ) -> Result<MessageId> {
        self.refuse(chat)?;
        self.calls.lock().unwrap().push(Sent::TextWithButtons {
            chat: chat.0,
            text: text.to_string(),
            callbacks: flatten(buttons),
        });
        Ok(self.next())
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        _photo: PhotoRef,
        caption: &str,
        buttons: Vec<Vec<Button>>,
    ) -> Result<MessageId> {
        self.refuse(chat)?;
        self.calls.lock().unwrap().push(Sent::Photo {
            chat: chat.0,
            caption: caption.to_string(),
            callbacks: flatten(buttons),
        });
        Ok(self.next())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.calls.lock().unwrap().push(Sent::Ack {
            id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, _message_id: MessageId) -> Result<()> {
        self.calls.lock().unwrap().push(Sent::Deleted { chat: chat.0 });
        Ok(())
    }

    async fn clear_buttons(&self, chat: ChatId, _message_id: MessageId) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Sent::ClearedButtons { chat: chat.0 });
        Ok(())
    }

    async fn file_info(&self, file_id: &str) -> Result<RemoteFile> {
        Ok(RemoteFile {
            path: format!("photos/{file_id}.jpg"),
            unique_id: format!("uniq-{file_id}"),
            size: self.file_size.load(Ordering::SeqCst),
        })
    }

    async fn download_to(&self, _remote_path: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, b"jpeg-bytes").await?;
        Ok(())
    }
}

pub struct MemoryGallery {
    docs: Mutex<Vec<GallerySubmission>>,
    next_doc: AtomicI64,
    next_asset: AtomicI64,
    pub uploads: Mutex<Vec<String>>,
    pub deleted_docs: Mutex<Vec<String>>,
    pub deleted_assets: Mutex<Vec<String>>,
    pub pending_count_override: Mutex<Option<i64>>,
}

impl MemoryGallery {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(Vec::new()),
            next_doc: AtomicI64::new(1),
            next_asset: AtomicI64::new(1),
            uploads: Mutex::new(Vec::new()),
            deleted_docs: Mutex::new(Vec::new()),
            deleted_assets: Mutex::new(Vec::new()),
            pending_count_override: Mutex::new(None),
        }
    }

    pub fn seed(&self, submission: GallerySubmission) {
        self.docs.lock().unwrap().push(submission);
    }

    pub fn doc(&self, id: &str) -> Option<GallerySubmission> {
        self.docs.lock().unwrap().iter().find(|d| d.id == id).cloned()
    }

    pub fn docs(&self) -> Vec<GallerySubmission> {
        self.docs.lock().unwrap().clone()
    }
}

#[async_trait]
impl GalleryStore for MemoryGallery {
    async fn upload_image(
        &self,
        _bytes: Vec<u8>,
        filename: &str,
        _content_type: &str,
    ) -> Result<String> {
        self.uploads.lock().unwrap().push(filename.to_string());
        let n = self.next_asset.fetch_add(1, Ordering::SeqCst);
        Ok(format!("image-{n}"))
    }

    async fn create_submission(
        &self,
        asset_id: &str,
        submitter_chat_id: i64,
        first_name: Option<&str>,
        username: Option<&str>,
        status: GalleryStatus,
    ) -> Result<String> {
        let n = self.next_doc.fetch_add(1, Ordering::SeqCst);
        let id = format!("doc-{n}");
        self.docs.lock().unwrap().push(GallerySubmission {
            id: id.clone(),
            status,
            submitter_chat_id: Some(submitter_chat_id),
            first_name: first_name.map(str::to_string),
            username: username.map(str::to_string),
            asset_id: Some(asset_id.to_string()),
            image_url: Some(format!("https://cdn.example.com/{asset_id}.jpg")),
            created_at: None,
        });
        Ok(id)
    }

    async fn get_submission(&self, id: &str) -> Result<Option<GallerySubmission>> {
        Ok(self.doc(id))
    }

    async fn set_status(&self, id: &str, status: GalleryStatus) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(doc) => {
                doc.status = status;
                Ok(())
            }
            None => Err(anyhow!("no such document {id}")),
        }
    }

    async fn delete_submission(&self, id: &str) -> Result<()> {
        self.docs.lock().unwrap().retain(|d| d.id != id);
        self.deleted_docs.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn delete_asset(&self, asset_id: &str) -> Result<()> {
        self.deleted_assets.lock().unwrap().push(asset_id.to_string());
        Ok(())
    }

    async fn pending_submissions(&self) -> Result<Vec<GallerySubmission>> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.status == GalleryStatus::Pending)
            .cloned()
            .collect())
    }

    async fn count_pending_for(&self, chat_id: i64) -> Result<i64> {
        if let Some(count) = *self.pending_count_override.lock().unwrap() {
            return Ok(count);
        }
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|d| {
                d.status == GalleryStatus::Pending && d.submitter_chat_id == Some(chat_id)
            })
            .count() as i64)
    }
}

pub struct RecordingInvalidator {
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageInvalidator for RecordingInvalidator {
    async fn invalidate(&self, paths: &[&str]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(paths.iter().map(|p| p.to_string()).collect());
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub pool: SqlitePool,
    pub messaging: Arc<RecordingMessaging>,
    pub gallery: Arc<MemoryGallery>,
    pub invalidator: Arc<RecordingInvalidator>,
    _upload_dir: tempfile::TempDir,
}

impl TestApp {
    pub fn relay(&self) -> &Relay {
        &self.state.relay
    }
}

pub async fn test_app() -> TestApp {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let messaging = Arc::new(RecordingMessaging::new());
    let gallery = Arc::new(MemoryGallery::new());
    let invalidator = Arc::new(RecordingInvalidator::new());
    let upload_dir = tempfile::tempdir().unwrap();

    let policy = ModerationPolicy {
        moderation_chat: Some(ChatId(MOD_CHAT)),
        admin_ids: vec![ADMIN_ID],
    };
    let moderator = Moderator::new(
        Arc::clone(&gallery) as Arc<dyn GalleryStore>,
        Arc::clone(&messaging) as Arc<dyn Messaging>,
        Arc::clone(&invalidator) as Arc<dyn PageInvalidator>,
        policy.clone(),
    );
    let pipeline = SubmissionPipeline::new(
        pool.clone(),
        Arc::clone(&gallery) as Arc<dyn GalleryStore>,
        Arc::clone(&messaging) as Arc<dyn Messaging>,
        Arc::clone(&invalidator) as Arc<dyn PageInvalidator>,
        policy.clone(),
        UploadLimits {
            max_pending_per_user: 5,
            max_upload_bytes: 2 * 1024 * 1024,
        },
        upload_dir.path().to_path_buf(),
    );

    let relay = Arc::new(Relay {
        db: pool.clone(),
        messaging: Arc::clone(&messaging) as Arc<dyn Messaging>,
        store: Arc::clone(&gallery) as Arc<dyn GalleryStore>,
        invalidator: Arc::clone(&invalidator) as Arc<dyn PageInvalidator>,
        moderator,
        pipeline,
        policy,
        batch: BatchConfig {
            batch_size: 5,
            batch_delay: Duration::from_millis(1),
        },
    });
    let state = AppState {
        relay,
        secrets: Arc::new(Secrets {
            telegram_webhook: TELEGRAM_SECRET.to_string(),
            sanity_signature: SANITY_SECRET.to_string(),
            notify: NOTIFY_SECRET.to_string(),
            api_key: API_KEY.to_string(),
        }),
    };

    TestApp {
        state,
        pool,
        messaging,
        gallery,
        invalidator,
        _upload_dir: upload_dir,
    }
}

pub fn pending_doc(id: &str, submitter: i64) -> GallerySubmission {
    GallerySubmission {
        id: id.to_string(),
        status: GalleryStatus::Pending,
        submitter_chat_id: Some(submitter),
        first_name: Some("Ann".to_string()),
        username: Some("ann".to_string()),
        asset_id: Some("image-seed".to_string()),
        image_url: Some("https://cdn.example.com/image-seed.jpg".to_string()),
        created_at: None,
    }
}

// Raw payloads in the shape the bot API delivers them.

pub fn private_chat(id: i64) -> Value {
    json!({ "id": id, "type": "private", "first_name": "Ann" })
}

pub fn group_chat(id: i64) -> Value {
    json!({ "id": id, "type": "group", "title": "Moderators" })
}

pub fn tg_user(id: i64) -> Value {
    json!({ "id": id, "is_bot": false, "first_name": "Ann", "username": "ann" })
}

pub fn text_update(chat: Value, from_id: i64, text: &str) -> Value {
    json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "date": 1_700_000_000,
            "chat": chat,
            "from": tg_user(from_id),
            "text": text
        }
    })
}

pub fn photo_update(chat_id: i64, from_id: i64) -> Value {
    json!({
        "update_id": 2,
        "message": {
            "message_id": 11,
            "date": 1_700_000_000,
            "chat": private_chat(chat_id),
            "from": tg_user(from_id),
            "photo": [
                { "file_id": "small", "file_unique_id": "u-small", "width": 90, "height": 90, "file_size": 1200 },
                { "file_id": "big", "file_unique_id": "u-big", "width": 1280, "height": 960, "file_size": 150_000 }
            ]
        }
    })
}

pub fn callback_update(data: &str, from_id: i64, chat: Value) -> Value {
    json!({
        "update_id": 3,
        "callback_query": {
            "id": "cb-1",
            "from": tg_user(from_id),
            "message": {
                "message_id": 42,
                "date": 1_700_000_000,
                "chat": chat,
                "text": "review card"
            },
            "chat_instance": "ci-1",
            "data": data
        }
    })
}

pub fn parse_update(value: Value) -> Update {
    let bytes = serde_json::to_vec(&value).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
