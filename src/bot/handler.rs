//! Report bot: applies session transitions and carries out their effects.
//!
//! One `handle` call processes one inbound message:
//! - photos go to the montage step (downloaded, stored, then accepted)
//! - slash commands start, cancel or inspect sessions
//! - anything else is an answer to the pending question
//!
//! Generation runs in its own task so the chat keeps getting "please wait"
//! replies while the pipeline works.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::{Channel, IncomingMessage, OutgoingResponse, PhotoRef};
use crate::config::BotConfig;
use crate::conversation::{ChatId, Command, Effect, ReportData, Session, Step, Transition, prompts};
use crate::error::Result;
use crate::pipeline::processor::PHOTO_TAG;
use crate::pipeline::{ArtifactPipeline, ChartSpec, ConverterChain, ScatterChart};
use crate::store::{ConfigStore, FileIndex, JsonConfigStore, SessionStore};

#[derive(Clone)]
pub struct ReportBot {
    sessions: Arc<SessionStore>,
    configs: Arc<dyn ConfigStore>,
    pipeline: Arc<ArtifactPipeline>,
}

impl ReportBot {
    pub fn new(
        sessions: Arc<SessionStore>,
        configs: Arc<dyn ConfigStore>,
        pipeline: Arc<ArtifactPipeline>,
    ) -> Self {
        Self {
            sessions,
            configs,
            pipeline,
        }
    }

    /// Open the stores named by `config` and wire a bot over them.
    pub async fn from_config(config: &BotConfig) -> Result<Self> {
        let files = Arc::new(FileIndex::open(&config.storage_dir).await?);
        let configs: Arc<dyn ConfigStore> =
            Arc::new(JsonConfigStore::new(&config.chat_config_path));

        let converters = ConverterChain::for_host(config.converter_timeout);
        info!(converters = %converters.names().join(" → "), "Converter chain ready");
        let pipeline = ArtifactPipeline::new(
            &config.template_path,
            files,
            Arc::new(ScatterChart::default()),
            converters,
        );

        Ok(Self::new(
            Arc::new(SessionStore::new()),
            configs,
            Arc::new(pipeline),
        ))
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Process one message. Returns the generation task if this message
    /// completed a report.
    pub async fn handle(
        &self,
        channel: &Arc<dyn Channel>,
        msg: IncomingMessage,
    ) -> Option<JoinHandle<()>> {
        let chat = msg.chat_id;

        if let Some(photo) = &msg.photo {
            self.handle_photo(channel, chat, photo).await;
            return None;
        }

        if let Some(command) = Command::parse(msg.content.trim()) {
            debug!(chat_id = %chat, ?command, "Command received");
            self.handle_command(channel, chat, command).await;
            return None;
        }

        // Answers are stored exactly as sent.
        let answer = msg.content.as_str();
        let Some(transition) = self.sessions.update(chat, |s| s.advance(answer)).await else {
            debug!(chat_id = %chat, "Text outside a session, ignoring");
            return None;
        };
        if transition.ends_session {
            self.sessions.remove(chat).await;
        }
        self.apply(channel, chat, transition).await
    }

    async fn handle_command(&self, channel: &Arc<dyn Channel>, chat: ChatId, command: Command) {
        match command {
            Command::Help => send_text(channel, chat, prompts::HELP).await,
            Command::ListFiles => {
                let records = self.pipeline.files().list().await;
                let listing = if records.is_empty() {
                    prompts::NO_FILES.to_string()
                } else {
                    records
                        .iter()
                        .map(|r| format!("- {} ({})", r.display_name, r.file_type))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                send_text(channel, chat, &listing).await;
            }
            Command::Cancel => {
                let reply = self
                    .sessions
                    .transact(chat, |slot| {
                        if slot.as_ref().is_some_and(|s| s.step.is_generating()) {
                            return prompts::GENERATION_IN_PROGRESS;
                        }
                        if slot.take().is_some() {
                            info!(chat_id = %chat, "Session cancelled");
                        }
                        prompts::CANCELLED
                    })
                    .await;
                send_text(channel, chat, reply).await;
            }
            Command::Configure => {
                if self.is_generating(chat).await {
                    send_text(channel, chat, prompts::GENERATION_IN_PROGRESS).await;
                    return;
                }
                let (session, replies) = Session::start_configuration(chat);
                self.sessions.insert(session).await;
                info!(chat_id = %chat, "Configuration started");
                send_all(channel, chat, replies).await;
            }
            Command::NewReport => {
                if self.is_generating(chat).await {
                    send_text(channel, chat, prompts::GENERATION_IN_PROGRESS).await;
                    return;
                }
                let config = match self.configs.get(chat).await {
                    Ok(config) => config,
                    Err(e) => {
                        warn!(chat_id = %chat, error = %e, "Chat config unavailable");
                        None
                    }
                };
                let (session, replies) = Session::start_report(chat, config.as_ref());
                info!(chat_id = %chat, step = %session.step, "Report started");
                self.sessions.insert(session).await;
                send_all(channel, chat, replies).await;
            }
        }
    }

    async fn handle_photo(&self, channel: &Arc<dyn Channel>, chat: ChatId, photo: &PhotoRef) {
        let waiting = self
            .sessions
            .get(chat)
            .await
            .is_some_and(|s| s.step == Step::MontagePhoto);
        if !waiting {
            debug!(chat_id = %chat, "Photo outside the montage step, ignoring");
            return;
        }

        let bytes = match channel.fetch_photo(photo).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(chat_id = %chat, error = %e, "Photo download failed");
                send_text(channel, chat, prompts::PHOTO_FAILED).await;
                return;
            }
        };

        let record = match self
            .pipeline
            .files()
            .record_bytes(&bytes, &photo.display_name(), PHOTO_TAG)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                warn!(chat_id = %chat, error = %e, "Photo could not be stored");
                send_text(channel, chat, prompts::PHOTO_FAILED).await;
                return;
            }
        };

        let path = record.storage_path.clone();
        if let Some(Some(transition)) = self
            .sessions
            .update(chat, |s| s.accept_photo(path))
            .await
        {
            send_all(channel, chat, transition.replies).await;
        }
    }

    /// Run the transition's effect, then send its replies.
    async fn apply(
        &self,
        channel: &Arc<dyn Channel>,
        chat: ChatId,
        transition: Transition,
    ) -> Option<JoinHandle<()>> {
        let Transition {
            replies, effect, ..
        } = transition;

        let task = match effect {
            None => None,
            Some(Effect::RenderChart(data)) => {
                self.preview_chart(channel, chat, &data).await;
                None
            }
            Some(Effect::SaveConfig(config)) => {
                let reply = match self.configs.put(config).await {
                    Ok(()) => {
                        info!(chat_id = %chat, "Chat config saved");
                        prompts::CONFIG_SAVED
                    }
                    Err(e) => {
                        error!(chat_id = %chat, error = %e, "Chat config save failed");
                        prompts::CONFIG_SAVE_FAILED
                    }
                };
                send_text(channel, chat, reply).await;
                None
            }
            Some(Effect::Generate(data)) => {
                send_text(channel, chat, prompts::GENERATION_STARTED).await;
                Some(self.spawn_generation(channel, chat, data))
            }
        };

        send_all(channel, chat, replies).await;
        task
    }

    async fn preview_chart(&self, channel: &Arc<dyn Channel>, chat: ChatId, data: &ReportData) {
        if ChartSpec::from_report(data).is_none() {
            debug!(chat_id = %chat, "Nothing to plot, skipping chart preview");
            return;
        }
        send_text(channel, chat, prompts::CHART_STARTED).await;

        match self.pipeline.render_chart(data).await {
            Ok(Some(record)) => {
                let path = record.storage_path.clone();
                self.sessions
                    .update(chat, |s| s.attach_chart(path.clone()))
                    .await;
                send(
                    channel,
                    chat,
                    OutgoingResponse::Photo {
                        path,
                        caption: Some(prompts::CHART_CAPTION.to_string()),
                    },
                )
                .await;
            }
            Ok(None) => debug!(chat_id = %chat, "Nothing to plot"),
            Err(e) => {
                warn!(chat_id = %chat, error = %e, "Chart preview failed");
                send_text(channel, chat, prompts::CHART_FAILED).await;
            }
        }
    }

    fn spawn_generation(
        &self,
        channel: &Arc<dyn Channel>,
        chat: ChatId,
        data: ReportData,
    ) -> JoinHandle<()> {
        let bot = self.clone();
        let channel = Arc::clone(channel);

        tokio::spawn(async move {
            let outcome = bot.pipeline.generate(&data).await;

            // The session ends with the run, whatever the outcome.
            bot.sessions
                .transact(chat, |slot| {
                    if slot.as_ref().is_some_and(|s| s.step.is_generating()) {
                        *slot = None;
                    }
                })
                .await;

            match outcome {
                Ok(report) => {
                    info!(chat_id = %chat, pdf = %report.pdf.id, "Report delivered");
                    send(
                        &channel,
                        chat,
                        OutgoingResponse::Document {
                            path: report.pdf.storage_path,
                            file_name: prompts::REPORT_FILE_NAME.to_string(),
                            caption: Some(prompts::REPORT_CAPTION.to_string()),
                        },
                    )
                    .await;
                }
                Err(e) => {
                    error!(chat_id = %chat, error = %e, "Report generation failed");
                    send_text(&channel, chat, &prompts::generation_failed(&e.to_string())).await;
                }
            }
        })
    }

    async fn is_generating(&self, chat: ChatId) -> bool {
        self.sessions
            .get(chat)
            .await
            .is_some_and(|s| s.step.is_generating())
    }
}

async fn send(channel: &Arc<dyn Channel>, chat: ChatId, response: OutgoingResponse) {
    if let Err(e) = channel.respond(chat, response).await {
        warn!(chat_id = %chat, channel = channel.name(), error = %e, "Failed to send response");
    }
}

async fn send_text(channel: &Arc<dyn Channel>, chat: ChatId, text: &str) {
    send(channel, chat, OutgoingResponse::text(text)).await;
}

async fn send_all(channel: &Arc<dyn Channel>, chat: ChatId, replies: Vec<String>) {
    for reply in replies {
        send(channel, chat, OutgoingResponse::Text(reply)).await;
    }
}
