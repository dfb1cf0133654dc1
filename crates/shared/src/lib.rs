pub mod payload;
pub mod protocol;
pub mod session;

pub use payload::{normalize_collection, AgentRecord, MessageRecord, ThreadRecord};
pub use protocol::CoralTool;
pub use session::{AgentConnectParams, SessionCoordinates};

use serde::{Deserialize, Serialize};

/// Client name reported during the MCP handshake.
pub const CLIENT_NAME: &str = "coral-monitor";

/// Version constant for consistent version reporting across crates.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum CoralError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Unexpected payload: {0}")]
    Payload(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Timeout occurred: {0}")]
    Timeout(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

pub type CoralResult<T> = std::result::Result<T, CoralError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization_is_tagged() {
        let err = CoralError::Rpc {
            code: -32601,
            message: "Method not found".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "Rpc");
        assert_eq!(json["detail"]["code"], -32601);
        assert_eq!(err.to_string(), "RPC error -32601: Method not found");
    }
}
