use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStatus {
    pub running: bool,
    /// USDT wallet balance
    pub balance: f64,
    /// "long" / "short", null when flat
    pub position: Option<String>,
    pub entry_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
}

impl ControlAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }

    /// Server reply for an accepted command
    pub fn reply(self) -> &'static str {
        match self {
            Self::Start => "bot started",
            Self::Stop => "bot stopped",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for ControlAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownAction(s.to_string()))
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ControlAction> for ControlRequest {
    fn from(action: ControlAction) -> Self {
        Self {
            action: action.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: String,
}

impl ControlResponse {
    pub const UNKNOWN_ACTION: &'static str = "unknown action";

    pub fn accepted(action: ControlAction) -> Self {
        Self {
            status: action.reply().to_string(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            status: Self::UNKNOWN_ACTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
}

/// Frames pushed over `/bot/ws`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Snapshot { status: BotStatus, logs: Vec<String> },
    Status { status: BotStatus },
    Log { line: String },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flat() -> BotStatus {
        BotStatus {
            running: false,
            balance: 50.0,
            position: None,
            entry_price: None,
        }
    }

    #[test]
    fn flat_status_serialises_nulls() {
        let v = serde_json::to_value(flat()).unwrap();
        assert_eq!(
            v,
            json!({"running": false, "balance": 50.0, "position": null, "entry_price": null})
        );
    }

    #[test]
    fn control_actions() {
        assert_eq!(ControlAction::parse("start"), Some(ControlAction::Start));
        assert_eq!(ControlAction::parse("stop"), Some(ControlAction::Stop));
        assert_eq!(ControlAction::parse("START"), None);
        let err = "restart".parse::<ControlAction>().unwrap_err();
        assert_eq!(err, UnknownAction("restart".to_string()));
        assert_eq!(err.to_string(), "unknown action: restart");
        assert_eq!(ControlResponse::accepted(ControlAction::Stop).status, "bot stopped");
        assert_eq!(ControlResponse::unknown().status, "unknown action");
    }

    #[test]
    fn stream_frames_are_tagged() {
        let v = serde_json::to_value(StreamMessage::Log {
            line: "[2024-01-01 09:00:00] ✅ bot started".into(),
        })
        .unwrap();
        assert_eq!(v["type"], "log");

        let snap = StreamMessage::Snapshot {
            status: flat(),
            logs: vec![],
        };
        let text = serde_json::to_string(&snap).unwrap();
        assert!(text.starts_with(r#"{"type":"snapshot""#));
        let back: StreamMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, snap);
    }
}
