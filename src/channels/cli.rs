//! CLI channel: stdin/stdout REPL for local runs.
//!
//! Everything typed belongs to chat 0. `/foto <path>` stands in for a photo
//! attachment: the file at `<path>` is read when the bot fetches it.

use std::path::Path;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, PhotoRef};
use crate::conversation::ChatId;
use crate::error::ChannelError;

pub const CLI_CHAT: ChatId = ChatId(0);

const PHOTO_COMMAND: &str = "/foto ";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Debug, Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

/// Turn one input line into a message. Blank lines yield nothing.
fn parse_line(line: &str) -> Option<IncomingMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let msg = IncomingMessage::new("cli", CLI_CHAT, "local-user", line);
    match line.strip_prefix(PHOTO_COMMAND) {
        Some(path) if !path.trim().is_empty() => {
            let path = path.trim();
            let mut photo = PhotoRef::new(path);
            if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
                photo = photo.with_extension(ext.to_ascii_lowercase());
            }
            let mut msg = msg.with_photo(photo);
            msg.content.clear();
            Some(msg)
        }
        _ => Some(msg),
    }
}

fn render(response: &OutgoingResponse) -> String {
    match response {
        OutgoingResponse::Text(text) => text.clone(),
        OutgoingResponse::Photo { path, caption } => format!(
            "🖼  {}{}",
            path.display(),
            caption.as_deref().map(|c| format!("\n{c}")).unwrap_or_default()
        ),
        OutgoingResponse::Document {
            path,
            file_name,
            caption,
        } => format!(
            "📄 {file_name} ({}){}",
            path.display(),
            caption.as_deref().map(|c| format!("\n{c}")).unwrap_or_default()
        ),
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(msg) = parse_line(&line) else {
                            eprint!("> ");
                            continue;
                        };
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _chat_id: ChatId,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", render(&response));
        eprint!("> ");
        Ok(())
    }

    async fn fetch_photo(&self, photo: &PhotoRef) -> Result<Vec<u8>, ChannelError> {
        tokio::fs::read(Path::new(&photo.file_id))
            .await
            .map_err(|e| ChannelError::FetchFailed {
                name: "cli".into(),
                reason: format!("{}: {e}", photo.file_id),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn text_line_becomes_message() {
        let msg = parse_line("  Ley de Ohm ").unwrap();
        assert_eq!(msg.chat_id, CLI_CHAT);
        assert_eq!(msg.content, "Ley de Ohm");
        assert!(msg.photo.is_none());
    }

    #[test]
    fn blank_line_is_skipped() {
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn foto_command_attaches_path() {
        let msg = parse_line("/foto /tmp/montaje.jpg").unwrap();
        assert_eq!(
            msg.photo,
            Some(PhotoRef::new("/tmp/montaje.jpg").with_extension("jpg"))
        );
        assert!(msg.content.is_empty());

        let png = parse_line("/foto /tmp/Circuito.PNG").unwrap().photo.unwrap();
        assert_eq!(png.display_name(), "montaje.png");
        let bare = parse_line("/foto /tmp/montaje").unwrap().photo.unwrap();
        assert_eq!(bare.display_name(), "montaje.jpg");

        // Without a path it is plain text.
        assert!(parse_line("/foto").unwrap().photo.is_none());
    }

    #[tokio::test]
    async fn fetch_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foto.jpg");
        tokio::fs::write(&path, b"jpeg").await.unwrap();

        let ch = CliChannel::new();
        let photo = PhotoRef::new(path.display().to_string());
        assert_eq!(ch.fetch_photo(&photo).await.unwrap(), b"jpeg");

        let missing = PhotoRef::new("/no/such/foto.jpg");
        assert!(matches!(
            ch.fetch_photo(&missing).await,
            Err(ChannelError::FetchFailed { .. })
        ));
    }

    #[test]
    fn document_rendering_names_file() {
        let out = render(&OutgoingResponse::Document {
            path: PathBuf::from("/s/abc.pdf"),
            file_name: "Reporte_Generado.pdf".into(),
            caption: Some("listo".into()),
        });
        assert!(out.contains("Reporte_Generado.pdf"));
        assert!(out.ends_with("listo"));
    }
}
