//! HTTP surface: the two inbound webhooks plus a small operator API.
//!
//! Every route checks its shared-secret header before touching the body.
//! The Telegram route always answers 200 once authenticated so the bot API
//! never retries an update we already consumed.

use crate::config;
use crate::db;
use crate::dispatch::{self, RecipientRecord};
use crate::handlers::{self, Relay};
use crate::model::SubscribeOutcome;
use crate::texts;
use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use teloxide::types::{ChatId, Update};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Secrets {
    pub telegram_webhook: String,
    pub sanity_signature: String,
    pub notify: String,
    pub api_key: String,
}

impl Secrets {
    pub fn from_config(cfg: &config::Config) -> Self {
        Self {
            telegram_webhook: cfg.telegram.webhook_secret.clone(),
            sanity_signature: cfg.sanity.webhook_signature.clone(),
            notify: cfg.http.notify_secret.clone(),
            api_key: cfg.http.api_key.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub secrets: Arc<Secrets>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/telegram", post(telegram_webhook))
        .route("/sanity", post(sanity_webhook))
        .route("/notify", post(notify))
        .route("/subscribe", post(subscribe))
        .with_state(state)
}

pub async fn serve(state: AppState, bind_addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "http server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "could not install ctrl-c handler");
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

fn authorized(headers: &HeaderMap, name: &str, expected: &str) -> bool {
    headers.get(name).and_then(|v| v.to_str().ok()) == Some(expected)
}

fn unauthorized() -> Response {
    StatusCode::UNAUTHORIZED.into_response()
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, msg.to_string()).into_response()
}

async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(
        &headers,
        "x-telegram-bot-api-secret-token",
        &state.secrets.telegram_webhook,
    ) {
        return unauthorized();
    }
    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(err) => {
            warn!(?err, "malformed telegram update");
            return bad_request("invalid update");
        }
    };
    // Failures are logged, never surfaced: a non-200 would make the bot API
    // redeliver an update we already acted on.
    if let Err(err) = handlers::handle_update(&state.relay, update).await {
        warn!(?err, "telegram update handler failed");
    }
    Json(serde_json::json!({})).into_response()
}

#[derive(Debug, Deserialize)]
struct PublishPayload {
    title: String,
    url: String,
}

async fn sanity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(
        &headers,
        "x-sanity-webhook-signature",
        &state.secrets.sanity_signature,
    ) {
        return unauthorized();
    }
    let payload: PublishPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(err) => {
            warn!(?err, "malformed publish payload");
            return bad_request("invalid payload");
        }
    };
    info!(title = %payload.title, "new post published, notifying subscribers");

    let text = texts::new_post_announcement(&payload.title, &payload.url);
    let recipients = match db::list_subscriber_chat_ids(&state.relay.db).await {
        Ok(ids) => ids.into_iter().map(RecipientRecord::Id).collect::<Vec<_>>(),
        Err(err) => {
            warn!(?err, "could not load subscriber list");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let outcome = fan_out(&state.relay, &recipients, &text).await;
    Json(outcome).into_response()
}

#[derive(Debug, Deserialize)]
struct NotifyPayload {
    message: String,
    #[serde(default)]
    recipients: Option<Vec<RecipientRecord>>,
}

async fn notify(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers, "x-notify-secret", &state.secrets.notify) {
        return unauthorized();
    }
    let payload: NotifyPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(err) => {
            warn!(?err, "malformed notify payload");
            return bad_request("invalid payload");
        }
    };
    let recipients = match payload.recipients {
        Some(list) => list,
        None => match db::list_subscriber_chat_ids(&state.relay.db).await {
            Ok(ids) => ids.into_iter().map(RecipientRecord::Id).collect(),
            Err(err) => {
                warn!(?err, "could not load subscriber list");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
    };
    let outcome = fan_out(&state.relay, &recipients, &payload.message).await;
    Json(outcome).into_response()
}

async fn fan_out(
    relay: &Relay,
    recipients: &[RecipientRecord],
    text: &str,
) -> dispatch::DispatchOutcome {
    let outcome = dispatch::dispatch(recipients, &relay.batch, |chat: ChatId| {
        let messaging = Arc::clone(&relay.messaging);
        let text = text.to_string();
        async move { messaging.send_text(chat, &text).await.map(|_| ()) }
    })
    .await;
    info!(
        sent = outcome.sent,
        failed = outcome.failed,
        total = outcome.total,
        "fan-out finished"
    );
    outcome
}

#[derive(Debug, Deserialize)]
struct SubscribePayload {
    chat_id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
}

async fn subscribe(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(&headers, "x-api-key", &state.secrets.api_key) {
        return unauthorized();
    }
    let payload: SubscribePayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(err) => {
            warn!(?err, "malformed subscribe payload");
            return bad_request("invalid payload");
        }
    };
    match db::add_subscriber(
        &state.relay.db,
        payload.chat_id,
        payload.username.as_deref(),
        payload.first_name.as_deref(),
    )
    .await
    {
        Ok(SubscribeOutcome::Subscribed) => {
            Json(serde_json::json!({ "status": "subscribed" })).into_response()
        }
        Ok(SubscribeOutcome::AlreadySubscribed) => {
            Json(serde_json::json!({ "status": "already_subscribed" })).into_response()
        }
        Err(err) => {
            warn!(?err, "subscribe write failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
