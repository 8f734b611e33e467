// One worker task per guild.
//
// Events for a guild are handled strictly in arrival order by that guild's
// worker; different guilds run in parallel. Each worker reads from a bounded
// queue, so a slow guild applies backpressure to its own producer only.

use super::detection_pipeline::DetectionPipeline;
use super::auto_action::ModerationGateway;
use super::moderation_errors::ModerationError;
use super::moderation_models::GuildEvent;
use super::moderation_store::ModerationStore;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Whatever the workers feed events into.
#[async_trait]
pub trait GuildEventProcessor: Send + Sync + 'static {
    async fn process_event(&self, event: GuildEvent);

    /// Called once a guild's worker has drained and stopped.
    fn guild_stopped(&self, _guild_id: u64) {}
}

#[async_trait]
impl<S, G> GuildEventProcessor for DetectionPipeline<S, G>
where
    S: ModerationStore + 'static,
    G: ModerationGateway + 'static,
{
    async fn process_event(&self, event: GuildEvent) {
        let guild_id = event.guild_id();
        match self.process(&event).await {
            Ok(flagged) if !flagged.is_empty() => {
                tracing::debug!(guild_id, flagged = flagged.len(), "Event flagged");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(guild_id, error = %e, "Failed to process guild event");
            }
        }
    }

    fn guild_stopped(&self, guild_id: u64) {
        self.forget_guild(guild_id);
    }
}

struct Worker {
    sender: mpsc::Sender<GuildEvent>,
    handle: JoinHandle<()>,
}

/// A guild either has a running worker or has been disconnected. Both live
/// in one map so the disconnected check and the spawn happen under the same
/// entry lock.
enum GuildSlot {
    Active(Worker),
    Disconnected,
}

pub struct GuildWorkerPool<P: GuildEventProcessor> {
    processor: Arc<P>,
    queue_depth: usize,
    guilds: DashMap<u64, GuildSlot>,
    shutting_down: AtomicBool,
}

impl<P: GuildEventProcessor> GuildWorkerPool<P> {
    pub fn new(processor: Arc<P>, queue_depth: usize) -> Self {
        Self {
            processor,
            queue_depth: queue_depth.max(1),
            guilds: DashMap::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Queue an event for its guild's worker, waiting while the queue is
    /// full.
    pub async fn submit(&self, event: GuildEvent) -> Result<(), ModerationError> {
        let guild_id = event.guild_id();

        // Clone the sender out so the map guard is gone before we await.
        let sender = match self.guilds.entry(guild_id) {
            Entry::Occupied(slot) => match slot.get() {
                GuildSlot::Active(worker) => worker.sender.clone(),
                GuildSlot::Disconnected => return Err(ModerationError::GuildDisconnected(guild_id)),
            },
            Entry::Vacant(slot) => {
                // Checked under the entry lock: shutdown sets the flag before
                // it walks the map, so it either sees this worker or we see
                // the flag.
                if self.shutting_down.load(Ordering::Acquire) {
                    return Err(ModerationError::GuildDisconnected(guild_id));
                }
                let worker = self.spawn_worker(guild_id);
                let sender = worker.sender.clone();
                slot.insert(GuildSlot::Active(worker));
                sender
            }
        };

        sender
            .send(event)
            .await
            .map_err(|_| ModerationError::GuildDisconnected(guild_id))
    }

    fn spawn_worker(&self, guild_id: u64) -> Worker {
        let (sender, mut receiver) = mpsc::channel::<GuildEvent>(self.queue_depth);
        let processor = Arc::clone(&self.processor);

        tracing::debug!(guild_id, "Starting guild worker");
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                processor.process_event(event).await;
            }
            tracing::debug!(guild_id, "Guild worker stopped");
        });

        Worker { sender, handle }
    }

    /// Stop accepting events for a guild, process what is already queued
    /// and wait for the worker to exit.
    pub async fn disconnect(&self, guild_id: u64) {
        let previous = self.guilds.insert(guild_id, GuildSlot::Disconnected);
        if let Some(GuildSlot::Active(worker)) = previous {
            self.stop_worker(guild_id, worker).await;
        }
        tracing::info!(guild_id, "Guild disconnected");
    }

    /// Accept events for a previously disconnected guild again.
    pub fn reconnect(&self, guild_id: u64) {
        if self
            .guilds
            .remove_if(&guild_id, |_, slot| matches!(slot, GuildSlot::Disconnected))
            .is_some()
        {
            tracing::info!(guild_id, "Guild reconnected");
        }
    }

    /// Drain and stop every worker. Later submissions are rejected.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        tracing::info!(workers = self.active_workers(), "Draining guild workers");
        let guilds: Vec<u64> = self.guilds.iter().map(|slot| *slot.key()).collect();
        for guild_id in guilds {
            if let Some((_, GuildSlot::Active(worker))) = self.guilds.remove(&guild_id) {
                self.stop_worker(guild_id, worker).await;
            }
        }
        tracing::info!("Guild workers shut down");
    }

    async fn stop_worker(&self, guild_id: u64, worker: Worker) {
        // Dropping the last sender ends the worker's recv loop once the
        // queue is empty. Senders cloned by in-flight submits keep it alive
        // until their send completes.
        drop(worker.sender);
        if let Err(e) = worker.handle.await {
            tracing::error!(guild_id, error = %e, "Guild worker ended abnormally");
        }
        self.processor.guild_stopped(guild_id);
    }

    pub fn active_workers(&self) -> usize {
        self.guilds
            .iter()
            .filter(|slot| matches!(slot.value(), GuildSlot::Active(_)))
            .count()
    }

    pub fn is_disconnected(&self, guild_id: u64) -> bool {
        self.guilds
            .get(&guild_id)
            .is_some_and(|slot| matches!(slot.value(), GuildSlot::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::MessageCreated;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(u64, u64)>>,
        stopped: Mutex<Vec<u64>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl GuildEventProcessor for Recorder {
        async fn process_event(&self, event: GuildEvent) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let GuildEvent::Message(msg) = event {
                self.seen.lock().unwrap().push((msg.guild_id, msg.message_id));
            }
        }

        fn guild_stopped(&self, guild_id: u64) {
            self.stopped.lock().unwrap().push(guild_id);
        }
    }

    fn message(guild_id: u64, message_id: u64) -> GuildEvent {
        GuildEvent::Message(MessageCreated {
            guild_id,
            channel_id: 1,
            message_id,
            author_id: 1,
            content: "hi".to_string(),
            mention_count: 0,
            timestamp: Utc::now(),
        })
    }

    fn ids_for(recorder: &Recorder, guild_id: u64) -> Vec<u64> {
        recorder
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, id)| *id)
            .collect()
    }

    #[tokio::test]
    async fn events_are_processed_in_order_per_guild() {
        let recorder = Arc::new(Recorder::default());
        let pool = GuildWorkerPool::new(Arc::clone(&recorder), 4);

        for id in 0..50 {
            pool.submit(message(1, id)).await.unwrap();
            pool.submit(message(2, id)).await.unwrap();
        }
        assert_eq!(pool.active_workers(), 2);
        pool.shutdown().await;

        assert_eq!(ids_for(&recorder, 1), (0..50).collect::<Vec<_>>());
        assert_eq!(ids_for(&recorder, 2), (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn disconnect_drains_queued_events_then_rejects() {
        let recorder = Arc::new(Recorder {
            delay: Some(Duration::from_millis(2)),
            ..Default::default()
        });
        let pool = GuildWorkerPool::new(Arc::clone(&recorder), 16);

        for id in 0..10 {
            pool.submit(message(7, id)).await.unwrap();
        }
        pool.disconnect(7).await;

        assert_eq!(ids_for(&recorder, 7).len(), 10);
        assert_eq!(*recorder.stopped.lock().unwrap(), vec![7]);
        assert!(matches!(
            pool.submit(message(7, 99)).await,
            Err(ModerationError::GuildDisconnected(7))
        ));
        assert_eq!(pool.active_workers(), 0);

        // Other guilds are unaffected.
        pool.submit(message(8, 1)).await.unwrap();

        pool.reconnect(7);
        pool.submit(message(7, 100)).await.unwrap();
        pool.shutdown().await;
        assert_eq!(ids_for(&recorder, 7).last(), Some(&100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn disconnect_racing_submits_never_revives_the_worker() {
        let recorder = Arc::new(Recorder::default());
        let pool = Arc::new(GuildWorkerPool::new(Arc::clone(&recorder), 8));
        pool.submit(message(3, 0)).await.unwrap();

        let mut producers = Vec::new();
        for task in 0..4u64 {
            let pool = Arc::clone(&pool);
            producers.push(tokio::spawn(async move {
                let mut accepted = 0usize;
                for i in 0..200u64 {
                    if pool.submit(message(3, 1 + task * 1_000 + i)).await.is_ok() {
                        accepted += 1;
                    }
                    tokio::task::yield_now().await;
                }
                accepted
            }));
        }

        tokio::task::yield_now().await;
        pool.disconnect(3).await;

        let mut accepted = 1;
        for producer in producers {
            accepted += producer.await.unwrap();
        }

        // Nothing was spawned behind the disconnect, and every accepted
        // event was processed by the drained worker.
        assert_eq!(pool.active_workers(), 0);
        assert!(pool.is_disconnected(3));
        assert!(matches!(
            pool.submit(message(3, 9_999)).await,
            Err(ModerationError::GuildDisconnected(3))
        ));
        assert_eq!(ids_for(&recorder, 3).len(), accepted);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_events() {
        let recorder = Arc::new(Recorder::default());
        let pool = GuildWorkerPool::new(recorder, DEFAULT_QUEUE_DEPTH);
        pool.submit(message(1, 1)).await.unwrap();
        pool.shutdown().await;

        assert!(pool.submit(message(1, 2)).await.is_err());
        assert!(pool.submit(message(3, 1)).await.is_err());
    }
}
