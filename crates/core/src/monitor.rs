use coral_shared::{AgentRecord, MessageRecord, ThreadRecord};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::coral::{CoralSource, Resource};
use crate::db;
use crate::events::{MessageUpdate, MonitorEvent};

/// Counts from one polling round. `None` means that step failed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub agents: Option<usize>,
    pub threads: Option<usize>,
    pub new_messages: Option<usize>,
}

/// Polls a [`CoralSource`], mirrors what it sees into SQLite and re-broadcasts it.
pub struct Monitor {
    source: Arc<dyn CoralSource>,
    pool: SqlitePool,
    tx: broadcast::Sender<Arc<MonitorEvent>>,
    interval: Duration,
    stale_after: Duration,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn CoralSource>,
        pool: SqlitePool,
        tx: broadcast::Sender<Arc<MonitorEvent>>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            pool,
            tx,
            interval,
            stale_after: interval * 3,
        }
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is the normal state when no dashboard is open.
        let _ = self.tx.send(Arc::new(event));
    }

    pub async fn poll_agents(&self) -> anyhow::Result<usize> {
        let payload = self.source.fetch(Resource::Agents).await?;
        debug!(payload = %payload, "Fetched agents");

        let agents = AgentRecord::collect(&payload);
        for agent in &agents {
            db::upsert_agent(&self.pool, agent).await?;
        }
        let stale = db::mark_stale_agents(&self.pool, self.stale_after).await?;
        if stale > 0 {
            info!(count = stale, "Marked agents inactive");
        }

        self.emit(MonitorEvent::AgentsUpdate(payload));
        Ok(agents.len())
    }

    pub async fn poll_threads(&self) -> anyhow::Result<usize> {
        let payload = self.source.fetch(Resource::Threads).await?;
        debug!(payload = %payload, "Fetched threads");

        let threads = ThreadRecord::collect(&payload);
        for thread in &threads {
            db::insert_thread(&self.pool, thread).await?;
        }

        self.emit(MonitorEvent::ThreadsUpdate(payload));
        Ok(threads.len())
    }

    /// Returns how many messages were new to the mirror.
    pub async fn poll_messages(&self) -> anyhow::Result<usize> {
        let payload = self.source.fetch(Resource::Messages).await?;
        debug!(payload = %payload, "Fetched messages");

        let mut inserted = 0;
        for message in MessageRecord::collect(&payload) {
            let Some(id) = db::insert_message(&self.pool, &message).await? else {
                continue;
            };
            inserted += 1;
            self.emit(MonitorEvent::MessageUpdate(MessageUpdate {
                id,
                thread_id: message.thread_id,
                sender_id: message.sender_id,
                receiver_id: message.receiver_id,
                content: message.content,
                message_type: message.message_type,
                timestamp: chrono::Utc::now().to_rfc3339(),
            }));
        }

        self.emit(MonitorEvent::MessagesUpdate(payload));
        Ok(inserted)
    }

    /// One round: agents, then threads, then messages. A failing step is
    /// logged and does not prevent the others.
    pub async fn poll_once(&self) -> PollSummary {
        let agents = self
            .poll_agents()
            .await
            .map_err(|e| warn!(error = %e, "Failed to poll agents"))
            .ok();
        let threads = self
            .poll_threads()
            .await
            .map_err(|e| warn!(error = %e, "Failed to poll threads"))
            .ok();
        let new_messages = self
            .poll_messages()
            .await
            .map_err(|e| warn!(error = %e, "Failed to poll messages"))
            .ok();

        PollSummary {
            agents,
            threads,
            new_messages,
        }
    }

    pub fn spawn(self: Arc<Self>, shutdown: Arc<Notify>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                url = %self.source.endpoint(Resource::Agents),
                interval_secs = self.interval.as_secs(),
                "Starting passive monitoring of Coral server"
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let stop = shutdown.notified();
            tokio::pin!(stop);
            stop.as_mut().enable();

            loop {
                tokio::select! {
                    () = &mut stop => {
                        info!("Monitor loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let summary = self.poll_once().await;
                        if summary == PollSummary::default() {
                            error!("Every poll step failed; is the Coral server reachable?");
                        } else {
                            debug!(?summary, "Poll round complete");
                        }
                    }
                }
            }
        })
    }
}
