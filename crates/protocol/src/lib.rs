//! JSON wire models shared by the control server and the dashboard.

pub mod emotion;
pub mod models;

pub use emotion::{Emotion, emotion_for_balance};
pub use models::{
    BotStatus, ControlAction, ControlRequest, ControlResponse, LogsResponse, StreamMessage,
    UnknownAction,
};

pub const CONTROL_PATH: &str = "/bot/control";
pub const STATUS_PATH: &str = "/bot/status";
pub const LOGS_PATH: &str = "/bot/logs";
pub const STREAM_PATH: &str = "/bot/ws";
pub const HEALTH_PATH: &str = "/health";

/// Lines returned by `GET /bot/logs`
pub const LOGS_LIMIT: usize = 100;
