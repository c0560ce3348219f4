//! Telegram channel: long-polls the Bot API for updates.
//!
//! Text and photo messages from allowed users become `IncomingMessage`s keyed
//! by the Telegram chat id. Replies go out through `sendMessage`,
//! `sendPhoto` and `sendDocument`.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, PhotoRef};
use crate::conversation::ChatId;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll wait, in seconds, passed to getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{API_BASE}/file/bot{}/{file_path}",
            self.bot_token.expose_secret()
        )
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    /// Send a single message chunk, Markdown-first with fallback.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(send_failed)?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        // User answers are echoed back verbatim and often contain stray
        // Markdown characters.
        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(send_failed)?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }

    // ── Media ───────────────────────────────────────────────────────

    /// Send a document to a Telegram chat under `file_name`.
    pub async fn send_document(
        &self,
        chat_id: &str,
        file_path: &Path,
        file_name: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let file_bytes = tokio::fs::read(file_path).await?;
        self.send_multipart("sendDocument", "document", chat_id, file_bytes, file_name, caption)
            .await?;
        tracing::info!(chat_id, file_name, "Telegram document sent");
        Ok(())
    }

    /// Send a photo to a Telegram chat.
    pub async fn send_photo(
        &self,
        chat_id: &str,
        file_path: &Path,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("photo.png");

        let file_bytes = tokio::fs::read(file_path).await?;
        self.send_multipart("sendPhoto", "photo", chat_id, file_bytes, file_name, caption)
            .await?;
        tracing::info!(chat_id, file_name, "Telegram photo sent");
        Ok(())
    }

    async fn send_multipart(
        &self,
        method: &str,
        field: &'static str,
        chat_id: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let part = Part::bytes(file_bytes).file_name(file_name.to_string());

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field, part);

        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url(method))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram {method} failed: {err}");
        }
        Ok(())
    }

    /// Resolve a file id to its download path via getFile.
    async fn file_path(&self, file_id: &str) -> anyhow::Result<String> {
        let resp: Value = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await?
            .json()
            .await?;

        resp.get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("getFile returned no file_path: {resp}"))
    }

    async fn download(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.file_path(file_id).await?;
        let resp = self.client.get(self.file_url(&path)).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("file download returned {}", resp.status());
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        chat_id: ChatId,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat = chat_id.to_string();
        match response {
            OutgoingResponse::Text(text) => self.send_message(&chat, &text).await,
            OutgoingResponse::Photo { path, caption } => self
                .send_photo(&chat, &path, caption.as_deref())
                .await
                .map_err(send_failed),
            OutgoingResponse::Document {
                path,
                file_name,
                caption,
            } => self
                .send_document(&chat, &path, &file_name, caption.as_deref())
                .await
                .map_err(send_failed),
        }
    }

    async fn fetch_photo(&self, photo: &PhotoRef) -> Result<Vec<u8>, ChannelError> {
        self.download(&photo.file_id)
            .await
            .map_err(|e| ChannelError::FetchFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!("{API_BASE}/bot{}/{method}", token.expose_secret())
}

fn send_failed(e: impl std::fmt::Display) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason: e.to_string(),
    }
}

/// Turn one getUpdates entry into a message, or `None` when it is not a
/// text/photo message from an allowed user.
fn parse_update(update: &Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let message = update.get("message")?;

    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str);
    let photo_id = largest_photo(message);
    if text.is_none() && photo_id.is_none() {
        return None;
    }

    let from = message.get("from");
    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string());

    // Check allowlist against both username and numeric ID
    let mut identities = vec![username];
    if let Some(ref id) = user_id {
        identities.push(id.as_str());
    }
    if !check_user_allowed(allowed_users, identities.iter().copied()) {
        tracing::warn!(
            "Telegram: ignoring message from unauthorized user: \
             username={username}, user_id={}",
            user_id.as_deref().unwrap_or("unknown")
        );
        return None;
    }

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;

    let display_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str)
        .unwrap_or(username);

    let mut incoming = IncomingMessage::new(
        "telegram",
        ChatId(chat_id),
        user_id.as_deref().unwrap_or(username),
        text.unwrap_or_default(),
    )
    .with_user_name(display_name);
    // Telegram re-encodes photos as JPEG.
    if let Some(file_id) = photo_id {
        incoming = incoming.with_photo(PhotoRef::new(file_id).with_extension("jpg"));
    }
    Some(incoming)
}

/// The file id of the largest size of an attached photo.
fn largest_photo(message: &Value) -> Option<String> {
    message
        .get("photo")
        .and_then(Value::as_array)?
        .iter()
        .max_by_key(|size| {
            size.get("file_size")
                .and_then(Value::as_u64)
                .or_else(|| {
                    let w = size.get("width").and_then(Value::as_u64)?;
                    let h = size.get("height").and_then(Value::as_u64)?;
                    Some(w * h)
                })
                .unwrap_or(0)
        })
        .and_then(|size| size.get("file_id"))
        .and_then(Value::as_str)
        .map(String::from)
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char
/// boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(allowed: &[&str]) -> TelegramChannel {
        TelegramChannel::new(
            SecretString::from("123:ABC".to_string()),
            allowed.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn allowed(users: &[&str]) -> Vec<String> {
        users.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel(&["*"]).name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = channel(&[]);
        assert_eq!(ch.api_url("getMe"), "https://api.telegram.org/bot123:ABC/getMe");
        assert_eq!(
            ch.file_url("photos/file_1.jpg"),
            "https://api.telegram.org/file/bot123:ABC/photos/file_1.jpg"
        );
    }

    // ── User allowlist tests ────────────────────────────────────────

    #[test]
    fn telegram_user_allowed_wildcard() {
        assert!(check_user_allowed(&allowed(&["*"]), ["anyone"]));
    }

    #[test]
    fn telegram_user_allowed_specific() {
        let users = allowed(&["alice", "bob"]);
        assert!(check_user_allowed(&users, ["alice"]));
        assert!(!check_user_allowed(&users, ["eve"]));
    }

    #[test]
    fn telegram_user_denied_empty() {
        assert!(!check_user_allowed(&[], ["anyone"]));
    }

    #[test]
    fn telegram_user_exact_match_not_substring() {
        let users = allowed(&["alice"]);
        assert!(!check_user_allowed(&users, ["alice_bot"]));
        assert!(!check_user_allowed(&users, ["malice"]));
    }

    #[test]
    fn telegram_user_allowed_by_numeric_id_identity() {
        assert!(check_user_allowed(&allowed(&["123456789"]), ["unknown", "123456789"]));
        assert!(!check_user_allowed(&allowed(&["alice"]), ["unknown", "123456789"]));
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parses_text_message() {
        let update = serde_json::json!({
            "update_id": 10,
            "message": {
                "chat": {"id": -1001},
                "from": {"id": 55, "username": "ana", "first_name": "Ana"},
                "text": "/nuevo"
            }
        });
        let msg = parse_update(&update, &allowed(&["*"])).unwrap();
        assert_eq!(msg.chat_id, ChatId(-1001));
        assert_eq!(msg.user_id, "55");
        assert_eq!(msg.user_name.as_deref(), Some("Ana"));
        assert_eq!(msg.content, "/nuevo");
        assert!(msg.photo.is_none());
    }

    #[test]
    fn parses_photo_with_largest_size() {
        let update = serde_json::json!({
            "message": {
                "chat": {"id": 7},
                "from": {"id": 55, "username": "ana"},
                "photo": [
                    {"file_id": "small", "file_size": 1000, "width": 90, "height": 60},
                    {"file_id": "large", "file_size": 90000, "width": 1280, "height": 960},
                    {"file_id": "medium", "file_size": 20000, "width": 320, "height": 240}
                ]
            }
        });
        let msg = parse_update(&update, &allowed(&["*"])).unwrap();
        assert_eq!(msg.photo, Some(PhotoRef::new("large").with_extension("jpg")));
        assert_eq!(msg.content, "");
    }

    #[test]
    fn photo_caption_becomes_content() {
        let update = serde_json::json!({
            "message": {
                "chat": {"id": 7},
                "from": {"id": 55},
                "caption": "montaje",
                "photo": [{"file_id": "only", "width": 10, "height": 10}]
            }
        });
        let msg = parse_update(&update, &allowed(&["*"])).unwrap();
        assert_eq!(msg.content, "montaje");
        assert_eq!(msg.photo.unwrap().file_id, "only");
    }

    #[test]
    fn ignores_unauthorized_and_non_message_updates() {
        let update = serde_json::json!({
            "message": {
                "chat": {"id": 7},
                "from": {"id": 55, "username": "eve"},
                "text": "hola"
            }
        });
        assert!(parse_update(&update, &allowed(&["alice"])).is_none());
        assert!(parse_update(&update, &allowed(&["55"])).is_some());

        let sticker = serde_json::json!({
            "message": {"chat": {"id": 7}, "from": {"id": 55}, "sticker": {}}
        });
        assert!(parse_update(&sticker, &allowed(&["*"])).is_none());
        assert!(parse_update(&serde_json::json!({"edited_message": {}}), &allowed(&["*"])).is_none());
    }

    // ── Media error paths ───────────────────────────────────────────

    #[tokio::test]
    async fn telegram_send_document_nonexistent_file() {
        let ch = channel(&["*"]);
        let path = Path::new("/nonexistent/path/to/file.pdf");

        let result = ch.send_document("123456", path, "Reporte.pdf", None).await;

        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(
            err.contains("No such file") || err.contains("not found") || err.contains("os error"),
            "Expected file not found error, got: {err}"
        );
    }

    #[tokio::test]
    async fn telegram_send_photo_nonexistent_file() {
        let ch = channel(&["*"]);
        let result = ch
            .send_photo("123456", Path::new("/nonexistent/photo.png"), None)
            .await;
        assert!(result.is_err());
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_over_limit_on_space() {
        let msg = format!("{} {}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        let msg = "ñ".repeat(3000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count() + chunks[1].chars().count(), 3000);
    }
}
