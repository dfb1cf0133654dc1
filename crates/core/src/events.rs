use serde::Serialize;
use serde_json::Value;

/// Everything pushed to dashboard clients over `/api/events`.
///
/// The `*_update` collection events carry the raw payload as the Coral server
/// returned it. `message_update` is emitted once per newly mirrored message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MonitorEvent {
    AgentsUpdate(Value),
    ThreadsUpdate(Value),
    MessagesUpdate(Value),
    MessageUpdate(MessageUpdate),
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageUpdate {
    pub id: String,
    pub thread_id: String,
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub content: Value,
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: String,
}

impl MonitorEvent {
    /// SSE event name, identical to the serialized `type` tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::AgentsUpdate(_) => "agents_update",
            MonitorEvent::ThreadsUpdate(_) => "threads_update",
            MonitorEvent::MessagesUpdate(_) => "messages_update",
            MonitorEvent::MessageUpdate(_) => "message_update",
        }
    }

    pub fn data_json(&self) -> serde_json::Result<String> {
        match self {
            MonitorEvent::AgentsUpdate(v)
            | MonitorEvent::ThreadsUpdate(v)
            | MonitorEvent::MessagesUpdate(v) => serde_json::to_string(v),
            MonitorEvent::MessageUpdate(m) => serde_json::to_string(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_tag_matches_name() {
        let events = [
            MonitorEvent::AgentsUpdate(json!([])),
            MonitorEvent::ThreadsUpdate(json!([])),
            MonitorEvent::MessagesUpdate(json!("raw")),
            MonitorEvent::MessageUpdate(MessageUpdate {
                id: "m1".to_string(),
                thread_id: "t1".to_string(),
                sender_id: None,
                receiver_id: None,
                content: json!("hi"),
                message_type: "unknown".to_string(),
                timestamp: "2026-01-01T00:00:00Z".to_string(),
            }),
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.name());
        }
    }

    #[test]
    fn test_message_update_data_uses_type_key() {
        let event = MonitorEvent::MessageUpdate(MessageUpdate {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            sender_id: Some("alpha".to_string()),
            receiver_id: Some("beta".to_string()),
            content: json!({"type": "question"}),
            message_type: "question".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        });
        let data: Value = serde_json::from_str(&event.data_json().unwrap()).unwrap();
        assert_eq!(data["type"], "question");
        assert_eq!(data["receiver_id"], "beta");
        assert!(data.get("message_type").is_none());
    }
}
