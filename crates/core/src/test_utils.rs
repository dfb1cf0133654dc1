use async_trait::async_trait;
use coral_shared::{CoralError, CoralResult, SessionCoordinates};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::config::{AppConfig, CorsOrigins};
use crate::coral::{CoralCheck, CoralSource, Resource};

/// In-memory [`CoralSource`]. Resources without a payload fail with a
/// network error.
#[derive(Default)]
pub struct StaticSource {
    payloads: Mutex<HashMap<Resource, Value>>,
}

impl StaticSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, resource: Resource, payload: Value) -> Self {
        self.set(resource, payload);
        self
    }

    pub fn set(&self, resource: Resource, payload: Value) {
        if let Ok(mut map) = self.payloads.lock() {
            map.insert(resource, payload);
        }
    }

    pub fn clear(&self, resource: Resource) {
        if let Ok(mut map) = self.payloads.lock() {
            map.remove(&resource);
        }
    }
}

#[async_trait]
impl CoralSource for StaticSource {
    fn endpoint(&self, resource: Resource) -> String {
        format!("memory://coral/{}", resource.path())
    }

    async fn fetch(&self, resource: Resource) -> CoralResult<Value> {
        self.payloads
            .lock()
            .ok()
            .and_then(|map| map.get(&resource).cloned())
            .ok_or_else(|| CoralError::Network(format!("{} unavailable", resource.path())))
    }

    async fn check(&self) -> CoralCheck {
        let url = self.endpoint(Resource::Agents);
        match self.fetch(Resource::Agents).await {
            Ok(_) => CoralCheck {
                status: "success".to_string(),
                status_code: Some(200),
                message: "Coral server is accessible".to_string(),
                url,
            },
            Err(e) => CoralCheck {
                status: "error".to_string(),
                status_code: None,
                message: format!("Cannot connect to Coral server: {e}"),
                url,
            },
        }
    }
}

#[must_use]
pub fn test_config() -> AppConfig {
    AppConfig {
        coral: SessionCoordinates::new("localhost:5555", "app", "key", "session-1")
            .with_devmode(true),
        polling_interval_secs: 1,
        request_timeout_secs: 1,
        database_url: "sqlite::memory:".to_string(),
        port: 0,
        bind_address: "127.0.0.1".to_string(),
        cors_origins: CorsOrigins::Any,
        event_channel_capacity: 64,
    }
}

pub async fn create_test_app_state(source: Arc<dyn CoralSource>) -> Arc<crate::AppState> {
    let pool = crate::memory_pool().await.unwrap();
    let (tx, _rx) = broadcast::channel(64);

    Arc::new(crate::AppState {
        pool,
        tx,
        source,
        config: test_config(),
    })
}
