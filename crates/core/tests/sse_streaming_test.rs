use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use coral_monitor::coral::{CoralSource, Resource};
use coral_monitor::events::MonitorEvent;
use coral_monitor::monitor::Monitor;
use coral_monitor::test_utils::{create_test_app_state, StaticSource};
use coral_monitor::build_router;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn open_stream(
    app: axum::Router,
) -> impl futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> {
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.into_body().into_data_stream()
}

async fn next_chunk<S>(stream: &mut S) -> String
where
    S: futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
{
    let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("Timeout waiting for SSE chunk")
        .expect("Stream ended unexpectedly")
        .expect("Error reading stream");
    String::from_utf8(chunk.to_vec()).unwrap()
}

#[tokio::test]
async fn test_sse_headers() {
    let state = create_test_app_state(Arc::new(StaticSource::new())).await;
    let response = build_router(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
}

#[tokio::test]
async fn test_sse_handshake_then_named_event() {
    let state = create_test_app_state(Arc::new(StaticSource::new())).await;
    let tx = state.tx.clone();
    let stream = open_stream(build_router(state)).await;
    tokio::pin!(stream);

    let first = next_chunk(&mut stream).await;
    assert!(first.contains("event: handshake"));
    assert!(first.contains("data: connected"));

    tx.send(Arc::new(MonitorEvent::AgentsUpdate(json!([{ "id": "a1" }]))))
        .unwrap();
    let second = next_chunk(&mut stream).await;
    assert!(second.contains("event: agents_update"));
    assert!(second.contains(r#"data: [{"id":"a1"}]"#));
}

#[tokio::test]
async fn test_sse_carries_poll_events() {
    let source: Arc<dyn CoralSource> = Arc::new(
        StaticSource::new()
            .with(Resource::Agents, json!([]))
            .with(Resource::Threads, json!([]))
            .with(
                Resource::Messages,
                json!([{ "messageId": "m-1", "threadId": "t-1", "senderId": "a1", "content": "hello" }]),
            ),
    );
    let state = create_test_app_state(source.clone()).await;
    let monitor = Monitor::new(
        source,
        state.pool.clone(),
        state.tx.clone(),
        Duration::from_secs(1),
    );

    let stream = open_stream(build_router(state)).await;
    tokio::pin!(stream);
    assert!(next_chunk(&mut stream).await.contains("event: handshake"));

    monitor.poll_once().await;

    let mut names = Vec::new();
    let mut message_update = None;
    for _ in 0..4 {
        let chunk = next_chunk(&mut stream).await;
        let name = chunk
            .lines()
            .find_map(|l| l.strip_prefix("event: "))
            .unwrap()
            .to_string();
        if name == "message_update" {
            message_update = Some(chunk.clone());
        }
        names.push(name);
    }
    assert_eq!(
        names,
        ["agents_update", "threads_update", "message_update", "messages_update"]
    );

    let message_update = message_update.unwrap();
    assert!(message_update.contains(r#""thread_id":"t-1""#));
    assert!(message_update.contains(r#""content":"hello""#));
}

#[tokio::test]
async fn test_sse_survives_lagged_receiver() {
    let state = create_test_app_state(Arc::new(StaticSource::new())).await;
    let tx = state.tx.clone();
    let stream = open_stream(build_router(state)).await;
    tokio::pin!(stream);
    assert!(next_chunk(&mut stream).await.contains("event: handshake"));

    // Channel capacity is 64; overflow it before the stream reads again.
    for i in 0..100 {
        let _ = tx.send(Arc::new(MonitorEvent::ThreadsUpdate(json!(i))));
    }

    let chunk = next_chunk(&mut stream).await;
    assert!(chunk.contains("event: threads_update"));
}
