//! Message dispatch: one ordered lane per chat.
//!
//! Messages from the same chat are handled strictly in arrival order; chats
//! never wait on each other. A lane that sits idle with no report generating
//! reports itself and is closed. The next message for that chat opens a fresh
//! lane, which first waits for its predecessor to finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bot::ReportBot;
use crate::channels::{Channel, IncomingMessage, MessageStream};
use crate::conversation::ChatId;

/// How long a lane may go without messages before it is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Generation tasks a lane leaves behind when it closes.
type Generations = Vec<JoinHandle<()>>;

struct Lane {
    id: u64,
    tx: mpsc::UnboundedSender<IncomingMessage>,
    worker: JoinHandle<Generations>,
}

pub struct Dispatcher {
    bot: ReportBot,
    channel: Arc<dyn Channel>,
    idle_timeout: Duration,
    open_lanes: AtomicUsize,
}

impl Dispatcher {
    pub fn new(bot: ReportBot, channel: Arc<dyn Channel>) -> Self {
        Self {
            bot,
            channel,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            open_lanes: AtomicUsize::new(0),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Lanes currently open.
    pub fn lane_count(&self) -> usize {
        self.open_lanes.load(Ordering::Relaxed)
    }

    /// Drain `stream` until it ends, then wait for every lane (and any
    /// report still generating) to finish.
    pub async fn run(&self, mut stream: MessageStream) {
        let mut lanes: HashMap<ChatId, Lane> = HashMap::new();
        // Closed lanes that may still be finishing their last messages.
        let mut retired: HashMap<ChatId, JoinHandle<Generations>> = HashMap::new();
        let mut generations: Generations = Vec::new();
        let (idle_tx, mut idle_rx) = mpsc::unbounded_channel::<(ChatId, u64)>();
        let mut next_id: u64 = 0;

        loop {
            tokio::select! {
                msg = stream.next() => {
                    let Some(msg) = msg else { break };
                    let chat = msg.chat_id;
                    let lane = lanes.entry(chat).or_insert_with(|| {
                        next_id += 1;
                        self.spawn_lane(chat, next_id, retired.remove(&chat), idle_tx.clone())
                    });
                    if let Err(mpsc::error::SendError(msg)) = lane.tx.send(msg) {
                        warn!(chat_id = %chat, "Chat lane died, reopening");
                        let dead = lanes.remove(&chat).map(|l| l.worker);
                        next_id += 1;
                        let lane = self.spawn_lane(chat, next_id, dead, idle_tx.clone());
                        if lane.tx.send(msg).is_err() {
                            warn!(chat_id = %chat, "Reopened lane refused message, dropping it");
                        }
                        lanes.insert(chat, lane);
                    }
                }
                Some((chat, id)) = idle_rx.recv() => {
                    if lanes.get(&chat).is_some_and(|l| l.id == id) {
                        if let Some(lane) = lanes.remove(&chat) {
                            debug!(chat_id = %chat, "Closing idle chat lane");
                            retired.insert(chat, lane.worker);
                        }
                    }
                }
            }

            let finished: Vec<ChatId> = retired
                .iter()
                .filter(|(_, w)| w.is_finished())
                .map(|(chat, _)| *chat)
                .collect();
            for chat in finished {
                if let Some(worker) = retired.remove(&chat) {
                    join_lane(worker, &mut generations).await;
                }
            }
            generations.retain(|t| !t.is_finished());
            self.open_lanes.store(lanes.len(), Ordering::Relaxed);
        }

        info!(lanes = lanes.len(), "Inbound stream ended, draining");
        let workers: Vec<_> = lanes
            .into_values()
            .map(|lane| lane.worker)
            .chain(retired.into_values())
            .collect();
        self.open_lanes.store(0, Ordering::Relaxed);
        for worker in workers {
            join_lane(worker, &mut generations).await;
        }
        for task in generations {
            if let Err(e) = task.await {
                warn!(error = %e, "Report generation task panicked");
            }
        }
    }

    fn spawn_lane(
        &self,
        chat: ChatId,
        id: u64,
        predecessor: Option<JoinHandle<Generations>>,
        idle: mpsc::UnboundedSender<(ChatId, u64)>,
    ) -> Lane {
        debug!(chat_id = %chat, "Opening chat lane");
        let (tx, mut rx) = mpsc::unbounded_channel::<IncomingMessage>();
        let bot = self.bot.clone();
        let channel = Arc::clone(&self.channel);
        let idle_timeout = self.idle_timeout;

        let worker = tokio::spawn(async move {
            let mut generations = Vec::new();
            if let Some(previous) = predecessor {
                join_lane(previous, &mut generations).await;
            }

            loop {
                match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(msg)) => {
                        if let Some(task) = bot.handle(&channel, msg).await {
                            generations.push(task);
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        generations.retain(|t: &JoinHandle<()>| !t.is_finished());
                        if generations.is_empty() {
                            let _ = idle.send((chat, id));
                        }
                    }
                }
            }
            generations.retain(|t| !t.is_finished());
            generations
        });

        Lane { id, tx, worker }
    }
}

/// Wait for a closed lane and adopt the generation tasks it left running.
async fn join_lane(worker: JoinHandle<Generations>, generations: &mut Generations) {
    match worker.await {
        Ok(left) => generations.extend(left),
        Err(e) => warn!(error = %e, "Chat lane panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::{RecordingChannel, bot_in};
    use crate::conversation::prompts;

    fn msg(chat: i64, content: &str) -> IncomingMessage {
        IncomingMessage::new("test", ChatId(chat), "u", content)
    }

    async fn wait_for_lanes(dispatcher: &Dispatcher, expected: usize) {
        for _ in 0..200 {
            if dispatcher.lane_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {expected} lanes, found {}", dispatcher.lane_count());
    }

    #[tokio::test]
    async fn chats_progress_independently_and_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (bot, _) = bot_in(dir.path()).await;
        let rec = RecordingChannel::new();
        let channel: Arc<dyn Channel> = rec.clone();

        let inbound = vec![
            msg(1, "/nuevo"),
            msg(2, "/nuevo"),
            msg(1, "Caída libre"),
            msg(2, "Ley de Hooke"),
            msg(1, "G1"),
        ];
        let dispatcher = Dispatcher::new(bot.clone(), channel);
        dispatcher.run(Box::pin(futures::stream::iter(inbound))).await;

        let one = bot.sessions().get(ChatId(1)).await.unwrap();
        let two = bot.sessions().get(ChatId(2)).await.unwrap();
        assert_eq!(one.data.title, "Caída libre");
        assert_eq!(one.data.group, "G1");
        assert_eq!(two.data.title, "Ley de Hooke");
        assert!(two.data.group.is_empty());
    }

    #[tokio::test]
    async fn replies_go_to_the_sending_chat() {
        let dir = tempfile::tempdir().unwrap();
        let (bot, _) = bot_in(dir.path()).await;
        let rec = RecordingChannel::new();
        let channel: Arc<dyn Channel> = rec.clone();

        let inbound = vec![msg(5, "/cancelar"), msg(6, "/ayuda")];
        Dispatcher::new(bot, channel)
            .run(Box::pin(futures::stream::iter(inbound)))
            .await;

        let sent = rec.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().any(|(chat, r)| *chat == ChatId(5)
            && r.as_text() == Some(prompts::CANCELLED)));
        assert!(
            sent.iter()
                .any(|(chat, r)| *chat == ChatId(6) && r.as_text() == Some(prompts::HELP))
        );
    }

    #[tokio::test]
    async fn idle_lanes_are_closed_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let (bot, _) = bot_in(dir.path()).await;
        let rec = RecordingChannel::new();
        let channel: Arc<dyn Channel> = rec.clone();
        let dispatcher = Arc::new(
            Dispatcher::new(bot.clone(), channel).with_idle_timeout(Duration::from_millis(100)),
        );

        let (tx, rx) = futures::channel::mpsc::unbounded();
        let runner = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.run(Box::pin(rx)).await }
        });

        tx.unbounded_send(msg(1, "/nuevo")).unwrap();
        tx.unbounded_send(msg(2, "/nuevo")).unwrap();
        wait_for_lanes(&dispatcher, 2).await;
        wait_for_lanes(&dispatcher, 0).await;

        // The session outlives its lane.
        tx.unbounded_send(msg(1, "Caída libre")).unwrap();
        drop(tx);
        runner.await.unwrap();

        assert_eq!(dispatcher.lane_count(), 0);
        let one = bot.sessions().get(ChatId(1)).await.unwrap();
        assert_eq!(one.data.title, "Caída libre");
        assert_eq!(one.step, crate::conversation::Step::Group);
    }
}
