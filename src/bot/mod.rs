//! Bot runtime: ties channels, sessions and the artifact pipeline together.

pub mod dispatch;
pub mod handler;

pub use dispatch::Dispatcher;
pub use handler::ReportBot;

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::ReportBot;
    use crate::channels::{Channel, MessageStream, OutgoingResponse, PhotoRef};
    use crate::conversation::ChatId;
    use crate::error::{ChannelError, ChartError};
    use crate::pipeline::{ArtifactPipeline, ChartRenderer, ChartSpec, ConverterChain};
    use crate::store::{ConfigStore, FileIndex, JsonConfigStore, SessionStore};

    /// Channel that records everything sent through it.
    #[derive(Default)]
    pub struct RecordingChannel {
        sent: Mutex<Vec<(ChatId, OutgoingResponse)>>,
    }

    impl RecordingChannel {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub async fn sent(&self) -> Vec<(ChatId, OutgoingResponse)> {
            self.sent.lock().await.clone()
        }

        pub async fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .await
                .iter()
                .filter_map(|(_, r)| r.as_text().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn respond(
            &self,
            chat_id: ChatId,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.sent.lock().await.push((chat_id, response));
            Ok(())
        }

        async fn fetch_photo(&self, _photo: &PhotoRef) -> Result<Vec<u8>, ChannelError> {
            Ok(b"jpeg".to_vec())
        }
    }

    struct FlatChart;

    impl ChartRenderer for FlatChart {
        fn render(&self, _spec: &ChartSpec, dest: &Path) -> Result<(), ChartError> {
            std::fs::write(dest, b"png")?;
            Ok(())
        }
    }

    /// A bot over `dir` with no template and no converters.
    pub async fn bot_in(dir: &Path) -> (ReportBot, Arc<dyn ConfigStore>) {
        let files = Arc::new(FileIndex::open(dir.join("Storage")).await.unwrap());
        let configs: Arc<dyn ConfigStore> =
            Arc::new(JsonConfigStore::new(dir.join("chat_configs.json")));
        let pipeline = ArtifactPipeline::new(
            dir.join("plantilla.docx"),
            files,
            Arc::new(FlatChart),
            ConverterChain::new(Vec::new(), Duration::from_secs(1)),
        );
        let bot = ReportBot::new(
            Arc::new(SessionStore::new()),
            Arc::clone(&configs),
            Arc::new(pipeline),
        );
        (bot, configs)
    }
}
