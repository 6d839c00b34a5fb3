use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::BusStats;
use crate::supervisor::SupervisorStats;

// ============================================================================
// Inbound websocket frames
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Stop,
}

/// Frame sent by a websocket client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    Command {
        action: ControlAction,
    },
    UserMessage {
        content: Value,
    },
    Chat {
        content: String,
        #[serde(default)]
        agent: Option<String>,
    },
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub running: bool,
    pub uptime_secs: i64,
    pub agents: Vec<SupervisorStats>,
    pub bus: BusStats,
}

/// Error frame returned to the client that sent an unusable frame
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: String,
}

impl ErrorFrame {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            kind: "error",
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_frames() {
        let start: ClientAction =
            serde_json::from_str(r#"{"type":"command","action":"start"}"#).unwrap();
        assert_eq!(
            start,
            ClientAction::Command {
                action: ControlAction::Start
            }
        );

        let user: ClientAction =
            serde_json::from_str(r#"{"type":"user_message","content":{"ticker":"msft"}}"#)
                .unwrap();
        assert!(matches!(
            user,
            ClientAction::UserMessage { content } if content["ticker"] == "msft"
        ));

        let chat: ClientAction =
            serde_json::from_str(r#"{"type":"chat","content":"why hold?","agent":"risk"}"#)
                .unwrap();
        assert_eq!(
            chat,
            ClientAction::Chat {
                content: "why hold?".into(),
                agent: Some("risk".into())
            }
        );
    }

    #[test]
    fn test_unknown_frame_rejected() {
        assert!(serde_json::from_str::<ClientAction>(r#"{"type":"reboot"}"#).is_err());
        assert!(
            serde_json::from_str::<ClientAction>(r#"{"type":"command","action":"pause"}"#)
                .is_err()
        );
    }
}
