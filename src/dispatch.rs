//! Batched fan-out of one message to many subscriber chats.
//!
//! Recipients are processed in contiguous batches. Sends inside a batch run
//! concurrently and all settle before the next batch starts; a fixed delay
//! separates batches so the bot API rate limit is never hit. One failed send
//! never aborts the run.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use teloxide::types::ChatId;
use tracing::{debug, warn};

static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").unwrap());

/// Pacing knobs for a fan-out run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl BatchConfig {
    pub fn from_app(app: &crate::config::App) -> Self {
        Self {
            batch_size: app.batch_size,
            batch_delay: Duration::from_millis(app.batch_delay_ms),
        }
    }
}

/// Untagged forms a recipient may take in a webhook payload. Order matters:
/// serde tries variants top to bottom.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RecipientRecord {
    Id(i64),
    Raw(String),
    Keyed { telegram_id: IdValue },
    Entry { name: String },
}

/// A chat id field that arrives either as a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum IdValue {
    Num(i64),
    Text(String),
}

/// Extract a usable chat id, or `None` when the record has no id at all
/// or carries a non-numeric one.
pub fn resolve_chat_id(record: &RecipientRecord) -> Option<ChatId> {
    let parse = |s: &str| {
        let trimmed = s.trim();
        if NUMERIC_RE.is_match(trimmed) {
            trimmed.parse::<i64>().ok()
        } else {
            None
        }
    };
    match record {
        RecipientRecord::Id(id) => Some(ChatId(*id)),
        RecipientRecord::Raw(s) => parse(s).map(ChatId),
        RecipientRecord::Keyed { telegram_id } => match telegram_id {
            IdValue::Num(id) => Some(ChatId(*id)),
            IdValue::Text(s) => parse(s).map(ChatId),
        },
        RecipientRecord::Entry { .. } => None,
    }
}

/// Tally of one fan-out run. `sent + failed == total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
}

/// Fan a send out to every recipient in order, pacing batches by the config.
///
/// Recipients that cannot be resolved to a chat id are counted as failed
/// without the send callback ever being invoked for them.
pub async fn dispatch<F, Fut>(
    recipients: &[RecipientRecord],
    cfg: &BatchConfig,
    send: F,
) -> DispatchOutcome
where
    F: Fn(ChatId) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let total = recipients.len();
    if total == 0 {
        return DispatchOutcome {
            sent: 0,
            failed: 0,
            total: 0,
        };
    }

    let size = cfg.batch_size.max(1);
    let batch_count = total.div_ceil(size);
    let mut sent = 0usize;
    let mut failed = 0usize;

    for (index, batch) in recipients.chunks(size).enumerate() {
        let mut futures = Vec::with_capacity(batch.len());
        let mut chats = Vec::with_capacity(batch.len());
        for record in batch {
            match resolve_chat_id(record) {
                Some(chat) => {
                    chats.push(chat);
                    futures.push(send(chat));
                }
                None => {
                    warn!(?record, "recipient has no usable chat id, skipping");
                    failed += 1;
                }
            }
        }

        let results = futures::future::join_all(futures).await;
        for (chat, result) in chats.iter().zip(results) {
            match result {
                Ok(()) => sent += 1,
                Err(err) => {
                    warn!(chat_id = chat.0, ?err, "send failed");
                    failed += 1;
                }
            }
        }

        debug!(
            batch = index + 1,
            of = batch_count,
            sent,
            failed,
            "batch settled"
        );
        if index + 1 < batch_count && !cfg.batch_delay.is_zero() {
            tokio::time::sleep(cfg.batch_delay).await;
        }
    }

    DispatchOutcome {
        sent,
        failed,
        total,
    }
}
