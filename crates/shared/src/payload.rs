//! Normalization of Coral REST payloads.
//!
//! The dev-mode endpoints are inconsistent about shape: the same resource may
//! come back as a JSON array, a single object, a JSON document wrapped in a
//! string (sometimes twice), or a bare id. Everything here turns those shapes
//! into flat records for the mirror tables.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

/// How many layers of string-wrapped JSON are unwrapped before giving up.
const MAX_DECODE_DEPTH: usize = 4;

/// Thread id assigned to messages that arrive as bare text.
pub const UNKNOWN_THREAD: &str = "unknown";
pub const UNKNOWN_SENDER: &str = "unknown";
pub const UNKNOWN_TYPE: &str = "unknown";
pub const UNKNOWN_AGENT_DESCRIPTION: &str = "Unknown agent";

/// Namespace for message fingerprints. Arbitrary but fixed forever.
const MESSAGE_NAMESPACE: Uuid = Uuid::from_u128(0x6c0f_1a2e_9b7d_4c53_8e21_d4a7_3f90_b5e8);

/// Flatten any payload shape into a list of items.
///
/// - array → its items
/// - object → a one-element list
/// - string → parsed as JSON and normalized again; if it is not JSON it is a
///   single bare item
/// - anything else → empty
pub fn normalize_collection(payload: &Value) -> Vec<Value> {
    normalize_at(payload, 0)
}

fn normalize_at(payload: &Value, depth: usize) -> Vec<Value> {
    match payload {
        Value::Array(items) => items.clone(),
        Value::Object(_) => vec![payload.clone()],
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Vec::new();
            }
            if depth < MAX_DECODE_DEPTH {
                if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                    return match parsed {
                        Value::Array(_) | Value::Object(_) | Value::String(_) => {
                            normalize_at(&parsed, depth + 1)
                        }
                        other => {
                            warn!(payload = %other, "Unexpected JSON format in string payload");
                            Vec::new()
                        }
                    };
                }
            }
            vec![Value::String(trimmed.to_string())]
        }
        Value::Null => Vec::new(),
        other => {
            warn!(payload = %other, "Unexpected payload type");
            Vec::new()
        }
    }
}

enum Item {
    Fields(Map<String, Value>),
    Bare(String),
}

fn decode_item(item: &Value) -> Option<Item> {
    match item {
        Value::Object(map) => Some(Item::Fields(map.clone())),
        Value::String(s) => Some(decode_string_item(s, 0)),
        _ => None,
    }
}

fn decode_string_item(s: &str, depth: usize) -> Item {
    if depth < MAX_DECODE_DEPTH {
        match serde_json::from_str::<Value>(s.trim()) {
            Ok(Value::Object(map)) => return Item::Fields(map),
            Ok(Value::String(inner)) => return decode_string_item(&inner, depth + 1),
            _ => {}
        }
    }
    Item::Bare(s.trim().to_string())
}

/// First of `keys` that holds a non-empty string or a number.
fn str_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRecord {
    pub id: String,
    pub description: Option<String>,
}

impl AgentRecord {
    pub fn from_item(item: &Value) -> Option<Self> {
        match decode_item(item)? {
            Item::Fields(map) => Some(Self {
                id: str_field(&map, &["agentId", "id"])?,
                description: str_field(&map, &["agentDescription", "description"]),
            }),
            Item::Bare(id) if !id.is_empty() => Some(Self {
                id,
                description: Some(UNKNOWN_AGENT_DESCRIPTION.to_string()),
            }),
            Item::Bare(_) => None,
        }
    }

    pub fn collect(payload: &Value) -> Vec<Self> {
        normalize_collection(payload)
            .iter()
            .filter_map(Self::from_item)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadRecord {
    pub id: String,
    pub name: String,
}

impl ThreadRecord {
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: format!("Thread {id}"),
        }
    }

    pub fn from_item(item: &Value) -> Option<Self> {
        match decode_item(item)? {
            Item::Fields(map) => {
                let id = str_field(&map, &["threadId", "id"])?;
                match str_field(&map, &["name"]) {
                    Some(name) => Some(Self { id, name }),
                    None => Some(Self::placeholder(&id)),
                }
            }
            Item::Bare(id) if !id.is_empty() => Some(Self::placeholder(&id)),
            Item::Bare(_) => None,
        }
    }

    pub fn collect(payload: &Value) -> Vec<Self> {
        normalize_collection(payload)
            .iter()
            .filter_map(Self::from_item)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    /// Id assigned by the Coral server, when the payload carries one.
    pub source_id: Option<String>,
    pub thread_id: String,
    pub sender_id: Option<String>,
    /// First entry of `mentions`.
    pub receiver_id: Option<String>,
    /// Content as it appeared in the payload.
    pub content: Value,
    pub message_type: String,
    pub source_timestamp: Option<String>,
}

impl MessageRecord {
    pub fn from_item(item: &Value) -> Option<Self> {
        match decode_item(item)? {
            Item::Fields(map) => {
                let thread_id = str_field(&map, &["threadId"])?;
                let content = map.get("content").cloned().unwrap_or(Value::Null);
                let receiver_id = map
                    .get("mentions")
                    .and_then(Value::as_array)
                    .and_then(|m| m.first())
                    .and_then(|first| match first {
                        Value::String(s) => Some(s.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    });
                Some(Self {
                    source_id: str_field(&map, &["messageId", "id"]),
                    thread_id,
                    sender_id: str_field(&map, &["senderId"]),
                    receiver_id,
                    message_type: detect_message_type(&content),
                    content,
                    source_timestamp: str_field(&map, &["timestamp"]),
                })
            }
            Item::Bare(text) if !text.is_empty() => Some(Self {
                source_id: None,
                thread_id: UNKNOWN_THREAD.to_string(),
                sender_id: Some(UNKNOWN_SENDER.to_string()),
                receiver_id: None,
                message_type: detect_message_type(&Value::String(text.clone())),
                content: Value::String(text),
                source_timestamp: None,
            }),
            Item::Bare(_) => None,
        }
    }

    pub fn collect(payload: &Value) -> Vec<Self> {
        normalize_collection(payload)
            .iter()
            .filter_map(Self::from_item)
            .collect()
    }

    /// Text stored in the `content` column: strings verbatim, structured
    /// content as compact JSON.
    pub fn content_text(&self) -> Option<String> {
        match &self.content {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Stable row id so that re-polling the same backlog never duplicates it.
    pub fn fingerprint(&self) -> String {
        let name = match self.source_id {
            Some(ref id) => format!("id\u{1f}{}\u{1f}{}", self.thread_id, id),
            None => [
                "fields",
                self.thread_id.as_str(),
                self.sender_id.as_deref().unwrap_or(""),
                self.receiver_id.as_deref().unwrap_or(""),
                self.content_text().as_deref().unwrap_or(""),
                self.source_timestamp.as_deref().unwrap_or(""),
            ]
            .join("\u{1f}"),
        };
        Uuid::new_v5(&MESSAGE_NAMESPACE, name.as_bytes()).to_string()
    }
}

/// `type` of structured content, or of string content that holds a JSON object.
pub fn detect_message_type(content: &Value) -> String {
    let from_map = |map: &Map<String, Value>| match map.get("type") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };
    match content {
        Value::Object(map) => from_map(map),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => from_map(&map),
            _ => None,
        },
        _ => None,
    }
    .unwrap_or_else(|| UNKNOWN_TYPE.to_string())
}
