use std::env;

use crate::error::BinanceError;

pub const DEFAULT_REST_URL: &str = "https://fapi.binance.com";
pub const DEFAULT_WS_URL: &str = "wss://fstream.binance.com";

#[derive(Clone)]
pub struct BinanceConfig {
    pub rest_url: String,
    pub ws_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub recv_window: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            rest_url: DEFAULT_REST_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            api_key: None,
            api_secret: None,
            recv_window: 5_000,
        }
    }
}

impl BinanceConfig {
    pub fn from_env() -> Result<Self, BinanceError> {
        let defaults = Self::default();

        let recv_window = match env::var("BINANCE_RECV_WINDOW") {
            Ok(v) => v
                .trim()
                .parse()
                .map_err(|_| BinanceError::Config(format!("invalid BINANCE_RECV_WINDOW: {}", v)))?,
            Err(_) => defaults.recv_window,
        };

        Ok(Self {
            rest_url: env::var("BINANCE_BASE_URL").unwrap_or(defaults.rest_url),
            ws_url: env::var("BINANCE_WS_URL").unwrap_or(defaults.ws_url),
            api_key: non_empty(env::var("BINANCE_API_KEY").ok()),
            api_secret: non_empty(env::var("BINANCE_API_SECRET").ok()),
            recv_window,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }
}

// keep the secret out of logs
impl std::fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceConfig")
            .field("rest_url", &self.rest_url)
            .field("ws_url", &self.ws_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("recv_window", &self.recv_window)
            .finish()
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_credentials() {
        let c = BinanceConfig::default();
        assert!(!c.has_credentials());
        assert_eq!(c.rest_url, DEFAULT_REST_URL);
    }

    #[test]
    fn debug_hides_key() {
        let c = BinanceConfig {
            api_key: Some("abc".into()),
            api_secret: Some("def".into()),
            ..BinanceConfig::default()
        };
        let s = format!("{:?}", c);
        assert!(!s.contains("abc"));
        assert!(!s.contains("def"));
    }

    #[test]
    fn blank_values_are_missing() {
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(non_empty(Some(" k ".into())), Some("k".into()));
    }
}
