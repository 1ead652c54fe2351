use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use domain::{Price, Qty, TimestampMs};
use indicators::{Candle, Interval};

use crate::config::BinanceConfig;
use crate::rest::parse_num;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Market data events
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// Kline update; `closed` is false while the candle is still forming
    Kline { candle: Candle, closed: bool },
    LastPrice(Price),
}

#[derive(Debug, Deserialize)]
struct KlineEnvelope {
    #[serde(rename = "e")]
    event: String,
    #[serde(rename = "k")]
    kline: KlineData,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(rename = "t")]
    start: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    closed: bool,
}

pub fn stream_url(config: &BinanceConfig, symbol: &str, interval: Interval) -> String {
    format!(
        "{}/ws/{}@kline_{}",
        config.ws_url.trim_end_matches('/'),
        symbol.to_lowercase(),
        interval.as_str()
    )
}

/// Decode one text frame into market events
pub fn parse_message(text: &str) -> Vec<MarketEvent> {
    let Ok(env) = serde_json::from_str::<KlineEnvelope>(text) else {
        return Vec::new();
    };
    if env.event != "kline" {
        return Vec::new();
    }

    let k = env.kline;
    let fields = (
        parse_num(&k.open),
        parse_num(&k.high),
        parse_num(&k.low),
        parse_num(&k.close),
        parse_num(&k.volume),
    );
    let (Ok(open), Ok(high), Ok(low), Ok(close), Ok(volume)) = fields else {
        return Vec::new();
    };

    let candle = Candle {
        ts: TimestampMs(k.start),
        open: Price(open),
        high: Price(high),
        low: Price(low),
        close: Price(close),
        volume: Qty(volume),
    };

    vec![
        MarketEvent::LastPrice(candle.close),
        MarketEvent::Kline {
            candle,
            closed: k.closed,
        },
    ]
}

/// Stream klines into `tx`, reconnecting on drops. Returns once the receiver is gone.
pub async fn run_kline_stream(
    config: BinanceConfig,
    symbol: String,
    interval: Interval,
    tx: Sender<MarketEvent>,
) {
    let url = stream_url(&config, &symbol, interval);

    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                info!("kline stream connected: {}", url);
                let (mut write, mut read) = ws.split();

                while let Some(msg) = read.next().await {
                    let msg = match msg {
                        Ok(m) => m,
                        Err(e) => {
                            warn!("kline stream read error: {}", e);
                            break;
                        }
                    };

                    match msg {
                        Message::Text(text) => {
                            for ev in parse_message(&text) {
                                if tx.send(ev).await.is_err() {
                                    debug!("kline stream receiver dropped");
                                    return;
                                }
                            }
                        }
                        Message::Ping(payload) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                debug!("kline stream pong failed: {}", e);
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            }
            Err(e) => warn!("kline stream connect failed: {}", e),
        }

        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
