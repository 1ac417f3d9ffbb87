//! User-visible message strings.
//!
//! Everything the bot says lives here so handlers stay free of copy.
//! HTML formatting only, matching the parse mode the gateway sends with.

pub const START_WELCOME: &str = "Welcome!\n\nI can notify you about new blog posts and take \
photo submissions for the community gallery.";

pub const SUBSCRIBE_SUCCESS: &str =
    "You're subscribed to blog updates. We'll notify you when a new post is published.";
pub const SUBSCRIBE_ALREADY: &str =
    "You're already subscribed. We'll notify you when new content drops.";

pub const UNSUBSCRIBE_FAREWELL: &str = "We've removed you from the subscriber list.\n\n\
Use /subscribe anytime if you change your mind.";
pub const UNSUBSCRIBE_NOT_SUBSCRIBED: &str = "You're not currently subscribed to blog updates.";
pub const UNSUBSCRIBE_PRIVATE_ONLY: &str = "Please message me directly to unsubscribe.";

pub const UPLOAD_NOT_SUBSCRIBED: &str = "You need to be subscribed to upload images to the \
gallery.\n\nUse /subscribe to get started.";
pub const UPLOAD_PROMPT: &str = "Send a photo to feature it in the community gallery.\n\
Each submission goes through moderation before it appears.";
pub const UPLOAD_STATUS: &str = "Uploading to gallery...";
pub const UPLOAD_SUCCESS: &str = "Image uploaded.\nYour photo is awaiting review; you'll be \
notified once it's approved and added to the gallery.";
pub const UPLOAD_ADMIN_SUCCESS: &str = "Image uploaded and published to the gallery.";
pub const UPLOAD_FAILED: &str = "Upload to gallery failed. Please try again.";
pub const UPLOAD_FILE_NOT_FOUND: &str = "Could not extract file info from that photo.";

pub fn upload_file_too_big(size_mb: f64) -> String {
    format!("File too large ({size_mb:.1}MB). Max 2MB.")
}

pub fn upload_pending_limit(count: i64, max: i64) -> String {
    format!(
        "You currently have {count} photos awaiting review.\n\
Please wait until some are approved before uploading new ones.\n\
You can have up to {max} pending photos at a time."
    )
}

pub const MODERATION_UNAUTHORIZED: &str = "Unauthorized";
pub const MODERATION_NOT_FOUND: &str = "Image not found";
pub const MODERATION_APPROVED: &str = "Image approved";
pub const MODERATION_REJECTED: &str = "Image rejected";

pub fn moderation_already(status: &str) -> String {
    format!("Already {status}. Cannot change decision.")
}

pub const NOTIFY_APPROVED: &str = "<b>Photo approved</b>\n\nYour photo is now live in the gallery.";
pub const NOTIFY_REJECTED: &str = "<b>Photo not approved</b>\n\nUnfortunately, your photo \
submission did not meet our guidelines.";

pub const PENDING_NONE: &str = "No pending images at the moment.";

pub fn pending_summary(total: usize) -> String {
    format!("<b>Pending gallery submissions</b>\n\nTotal: <b>{total}</b> awaiting review")
}

pub fn moderation_caption(name: &str, handle: &str, item_id: &str) -> String {
    format!("<b>New submission for review</b>\n\nFrom: {name} ({handle})\nID: <code>{item_id}</code>")
}

pub fn chat_info(chat_id: i64, title: Option<&str>, kind: &str) -> String {
    format!(
        "<b>Chat ID:</b>\n<code>{chat_id}</code>\n\n<b>Chat Title:</b> {}\n<b>Chat Type:</b> {kind}",
        title.unwrap_or("N/A")
    )
}

pub fn new_post_announcement(title: &str, url: &str) -> String {
    format!("<b>New post published</b>\n\n{title}\n{url}")
}

pub const BUTTON_APPROVE: &str = "Approve";
pub const BUTTON_REJECT: &str = "Reject";
pub const BUTTON_SUBSCRIBE: &str = "Subscribe to updates";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_limit_mentions_counts() {
        let msg = upload_pending_limit(3, 5);
        assert!(msg.contains("3 photos"));
        assert!(msg.contains("up to 5"));
    }

    #[test]
    fn caption_carries_item_id() {
        let cap = moderation_caption("Ann", "@ann", "doc-9");
        assert!(cap.contains("doc-9"));
        assert!(cap.contains("@ann"));
    }
}
