use coral_monitor::coral::{CoralSource, Resource};
use coral_monitor::db;
use coral_monitor::events::MonitorEvent;
use coral_monitor::monitor::{Monitor, PollSummary};
use coral_monitor::test_utils::StaticSource;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

struct Harness {
    source: Arc<StaticSource>,
    pool: sqlx::SqlitePool,
    tx: broadcast::Sender<Arc<MonitorEvent>>,
}

impl Harness {
    async fn new(source: StaticSource) -> Self {
        let pool = coral_monitor::memory_pool().await.unwrap();
        let (tx, _rx) = broadcast::channel(64);
        Self {
            source: Arc::new(source),
            pool,
            tx,
        }
    }

    fn monitor(&self, interval: Duration) -> Monitor {
        let source: Arc<dyn CoralSource> = self.source.clone();
        Monitor::new(source, self.pool.clone(), self.tx.clone(), interval)
    }
}

#[tokio::test]
async fn test_failing_step_does_not_block_others() {
    // No agents payload: that step fails, threads and messages still run.
    let harness = Harness::new(
        StaticSource::new()
            .with(Resource::Threads, json!([{ "id": "t-1", "name": "General" }]))
            .with(
                Resource::Messages,
                json!([{ "threadId": "t-1", "senderId": "a", "content": "hi" }]),
            ),
    )
    .await;

    let summary = harness.monitor(Duration::from_secs(5)).poll_once().await;
    assert_eq!(
        summary,
        PollSummary {
            agents: None,
            threads: Some(1),
            new_messages: Some(1),
        }
    );
    let messages = db::list_messages(&harness.pool, Some("t-1"), None)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_payload_accepted_as_json_string() {
    let harness = Harness::new(
        StaticSource::new()
            .with(Resource::Agents, json!(r#"[{"agentId":"a1"},{"agentId":"a2"}]"#))
            .with(Resource::Threads, json!(r#"{"threadId":"t-9","name":"Solo"}"#))
            .with(Resource::Messages, json!("plain text from nowhere")),
    )
    .await;

    let summary = harness.monitor(Duration::from_secs(5)).poll_once().await;
    assert_eq!(summary.agents, Some(2));
    assert_eq!(summary.threads, Some(1));
    assert_eq!(summary.new_messages, Some(1));

    let unknown = db::list_messages(&harness.pool, Some("unknown"), None)
        .await
        .unwrap();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].content.as_deref(), Some("plain text from nowhere"));
}

#[tokio::test]
async fn test_message_update_only_for_new_rows() {
    let harness = Harness::new(
        StaticSource::new()
            .with(Resource::Agents, json!([]))
            .with(Resource::Threads, json!([]))
            .with(
                Resource::Messages,
                json!([
                    { "messageId": "m-1", "threadId": "t-1", "content": "one" },
                    { "messageId": "m-2", "threadId": "t-1", "content": "two" }
                ]),
            ),
    )
    .await;
    let monitor = harness.monitor(Duration::from_secs(5));
    let mut rx = harness.tx.subscribe();

    monitor.poll_once().await;
    monitor.poll_once().await;

    let mut message_updates = 0;
    let mut messages_updates = 0;
    while let Ok(event) = rx.try_recv() {
        match event.as_ref() {
            MonitorEvent::MessageUpdate(_) => message_updates += 1,
            MonitorEvent::MessagesUpdate(_) => messages_updates += 1,
            _ => {}
        }
    }
    assert_eq!(message_updates, 2);
    assert_eq!(messages_updates, 2);
}

#[tokio::test]
async fn test_agents_missing_from_polls_go_inactive() {
    let harness = Harness::new(
        StaticSource::new()
            .with(Resource::Agents, json!([{ "agentId": "old" }]))
            .with(Resource::Threads, json!([]))
            .with(Resource::Messages, json!([])),
    )
    .await;
    // Stale after three intervals: with a zero interval any earlier
    // sighting counts as stale.
    let monitor = harness.monitor(Duration::ZERO);
    monitor.poll_agents().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    harness
        .source
        .set(Resource::Agents, json!([{ "agentId": "fresh" }]));
    monitor.poll_agents().await.unwrap();

    let agents = db::list_agents(&harness.pool).await.unwrap();
    let status = |id: &str| {
        agents
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.status.clone())
            .unwrap()
    };
    assert_eq!(status("old"), db::STATUS_INACTIVE);
    assert_eq!(status("fresh"), db::STATUS_ACTIVE);
}

#[tokio::test]
async fn test_spawned_loop_polls_and_stops_on_shutdown() {
    let harness = Harness::new(
        StaticSource::new()
            .with(Resource::Agents, json!([{ "agentId": "a1" }]))
            .with(Resource::Threads, json!([]))
            .with(Resource::Messages, json!([])),
    )
    .await;
    let mut rx = harness.tx.subscribe();
    let shutdown = Arc::new(Notify::new());
    let handle = Arc::new(harness.monitor(Duration::from_millis(50))).spawn(shutdown.clone());

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("monitor never polled")
        .unwrap();
    assert_eq!(first.name(), "agents_update");

    shutdown.notify_waiters();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("monitor did not stop")
        .unwrap();
}
