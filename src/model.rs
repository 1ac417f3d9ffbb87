use serde::{Deserialize, Serialize};

/// Lifecycle of a gallery submission. `Pending` is the only non-terminal
/// state; once approved or rejected the status never changes again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GalleryStatus {
    Pending,
    Approved,
    Rejected,
}

impl GalleryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GalleryStatus::Pending => "pending",
            GalleryStatus::Approved => "approved",
            GalleryStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GalleryStatus::Pending),
            "approved" => Some(GalleryStatus::Approved),
            "rejected" => Some(GalleryStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GalleryStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModerationDecision {
    Approve,
    Reject,
}

impl ModerationDecision {
    /// Status a pending submission transitions to under this decision.
    pub fn target_status(&self) -> GalleryStatus {
        match self {
            ModerationDecision::Approve => GalleryStatus::Approved,
            ModerationDecision::Reject => GalleryStatus::Rejected,
        }
    }
}

/// Parsed inline-keyboard callback payload.
///
/// Moderation buttons carry `gallery_approve_<id>` / `gallery_reject_<id>`;
/// the subscribe button carries a small JSON object. Anything else is
/// `Unknown` and only gets an ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Moderate {
        decision: ModerationDecision,
        item_id: String,
    },
    Subscribe,
    Unknown,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        if let Some(id) = data.strip_prefix("gallery_approve_") {
            if !id.is_empty() {
                return CallbackAction::Moderate {
                    decision: ModerationDecision::Approve,
                    item_id: id.to_string(),
                };
            }
        }
        if let Some(id) = data.strip_prefix("gallery_reject_") {
            if !id.is_empty() {
                return CallbackAction::Moderate {
                    decision: ModerationDecision::Reject,
                    item_id: id.to_string(),
                };
            }
        }
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(data) {
            if v.get("action").and_then(|a| a.as_str()) == Some("subscribe") {
                return CallbackAction::Subscribe;
            }
        }
        CallbackAction::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotSubscribed,
}
