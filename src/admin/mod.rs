pub mod client;
pub mod unix_socket;

pub use client::AdminClient;
pub use unix_socket::UnixSocketServer;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line on the admin socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Replace the live configuration with this canonical document.
    Reload { config: Value },
    Stop,
    Status,
    Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl ControlResponse {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data,
        }
    }

    /// `exit_code` is what the requesting CLI should exit with.
    pub fn failure(message: impl Into<String>, exit_code: u8) -> Self {
        Self {
            ok: false,
            message: message.into(),
            data: serde_json::json!({ "exit_code": exit_code }),
        }
    }

    pub fn exit_code(&self) -> u8 {
        if self.ok {
            return 0;
        }
        self.data
            .get("exit_code")
            .and_then(Value::as_u64)
            .and_then(|c| u8::try_from(c).ok())
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let req: ControlRequest =
            serde_json::from_str(r#"{"command":"reload","config":{"apps":[]}}"#).unwrap();
        assert_eq!(req, ControlRequest::Reload { config: json!({"apps": []}) });

        assert_eq!(
            serde_json::to_string(&ControlRequest::Stop).unwrap(),
            r#"{"command":"stop"}"#
        );
        assert!(serde_json::from_str::<ControlRequest>(r#"{"command":"restart"}"#).is_err());
    }

    #[test]
    fn test_response_exit_code() {
        assert_eq!(ControlResponse::success("ok", Value::Null).exit_code(), 0);
        assert_eq!(ControlResponse::failure("bad", 2).exit_code(), 2);

        let bare: ControlResponse = serde_json::from_str(r#"{"ok":false,"message":"x"}"#).unwrap();
        assert_eq!(bare.exit_code(), 1);
    }
}
