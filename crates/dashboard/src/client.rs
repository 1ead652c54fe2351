use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Client;

use protocol::{
    BotStatus, CONTROL_PATH, ControlAction, ControlRequest, ControlResponse, LOGS_PATH,
    LogsResponse, STATUS_PATH, STREAM_PATH,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the bot control API
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn status(&self) -> Result<BotStatus> {
        let res = self
            .http
            .get(format!("{}{}", self.base, STATUS_PATH))
            .send()
            .await
            .context("status request failed")?;
        if !res.status().is_success() {
            bail!("status: {} {}", res.status(), res.text().await.unwrap_or_default());
        }
        Ok(res.json().await?)
    }

    pub async fn logs(&self) -> Result<Vec<String>> {
        let res = self
            .http
            .get(format!("{}{}", self.base, LOGS_PATH))
            .send()
            .await
            .context("logs request failed")?;
        if !res.status().is_success() {
            bail!("logs: {}", res.status());
        }
        Ok(res.json::<LogsResponse>().await?.logs)
    }

    /// Non-2xx replies are errors carrying the server's status text
    pub async fn control(&self, action: ControlAction) -> Result<ControlResponse> {
        let res = self
            .http
            .post(format!("{}{}", self.base, CONTROL_PATH))
            .json(&ControlRequest::from(action))
            .send()
            .await
            .context("control request failed")?;

        let code = res.status();
        let body = res.text().await.unwrap_or_default();
        if !code.is_success() {
            let reason = serde_json::from_str::<ControlResponse>(&body)
                .map(|r| r.status)
                .unwrap_or(body);
            bail!("{} rejected ({}): {}", action, code, reason);
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub fn stream_url(&self) -> String {
        stream_url(&self.base)
    }
}

/// http(s)://host -> ws(s)://host/bot/ws
pub fn stream_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        format!("ws://{}", base)
    };
    format!("{}{}", ws, STREAM_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_follows_the_scheme() {
        assert_eq!(stream_url("http://127.0.0.1:8000"), "ws://127.0.0.1:8000/bot/ws");
        assert_eq!(stream_url("https://bot.example.com/"), "wss://bot.example.com/bot/ws");
        assert_eq!(stream_url("localhost:8000"), "ws://localhost:8000/bot/ws");
    }

    #[test]
    fn base_is_normalised() {
        let c = ApiClient::new("http://127.0.0.1:8000/").unwrap();
        assert_eq!(c.base(), "http://127.0.0.1:8000");
        assert_eq!(c.stream_url(), "ws://127.0.0.1:8000/bot/ws");
    }
}
