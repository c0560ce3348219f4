//! Channel trait and message types shared by every transport.

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::conversation::ChatId;
use crate::error::ChannelError;

/// Transport-side handle to an attached photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    pub file_id: String,
    /// Image extension without the dot, when the transport knows it.
    pub extension: Option<String>,
}

impl PhotoRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            extension: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Name the stored copy is indexed under. JPEG unless told otherwise.
    pub fn display_name(&self) -> String {
        format!("montaje.{}", self.extension.as_deref().unwrap_or("jpg"))
    }
}

/// A message received from a channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    pub channel: String,
    pub chat_id: ChatId,
    pub user_id: String,
    pub user_name: Option<String>,
    /// Text or caption; empty for a bare photo.
    pub content: String,
    pub photo: Option<PhotoRef>,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: ChatId,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            chat_id,
            user_id: user_id.into(),
            user_name: None,
            content: content.into(),
            photo: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_photo(mut self, photo: PhotoRef) -> Self {
        self.photo = Some(photo);
        self
    }
}

/// Something to send back to a chat.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingResponse {
    Text(String),
    Photo {
        path: PathBuf,
        caption: Option<String>,
    },
    Document {
        path: PathBuf,
        /// Name the recipient sees, independent of the stored file name.
        file_name: String,
        caption: Option<String>,
    },
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Inbound messages from one channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving. The stream ends when the channel stops.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    async fn respond(&self, chat_id: ChatId, response: OutgoingResponse)
    -> Result<(), ChannelError>;

    /// Download the bytes of an attached photo.
    async fn fetch_photo(&self, photo: &PhotoRef) -> Result<Vec<u8>, ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
