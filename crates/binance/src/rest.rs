use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use domain::{Money, Position, PositionSide, Price, Qty, Side, TimestampMs};
use indicators::{Candle, Interval};
use policy::risk::{round_down_to_step, step_decimals};

use crate::config::BinanceConfig;
use crate::error::BinanceError;

type HmacSha256 = Hmac<Sha256>;

/// Max klines per request on USDT-M futures
const KLINE_PAGE: u16 = 1500;

/// Quantity and price steps of a symbol
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SymbolFilters {
    pub step_size: Qty,
    pub tick_size: Price,
}

/// Order types used for entries and brackets
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    TakeProfitMarket,
    StopMarket,
}

impl OrderKind {
    fn as_str(self) -> &'static str {
        match self {
            OrderKind::Market => "MARKET",
            OrderKind::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            OrderKind::StopMarket => "STOP_MARKET",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub side: Side,
    pub kind: OrderKind,
    /// None for closePosition triggers
    pub qty: Option<Qty>,
    pub stop_price: Option<Price>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    #[serde(default)]
    pub client_order_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub avg_price: Option<String>,
}

/// USDT-M futures REST client
#[derive(Clone)]
pub struct BinanceFutures {
    client: reqwest::Client,
    config: BinanceConfig,
}

impl BinanceFutures {
    pub fn new(config: BinanceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &BinanceConfig {
        &self.config
    }

    //
    // --- public ---------------------------------------------------------------
    //

    /// Latest `limit` klines, oldest first
    pub async fn klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u16,
    ) -> Result<Vec<Candle>, BinanceError> {
        let rows: Vec<Vec<Value>> = self
            .public(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.as_str().to_string()),
                    ("limit", limit.min(KLINE_PAGE).to_string()),
                ],
            )
            .await?;

        rows.iter().map(|r| parse_kline_row(r)).collect()
    }

    /// One page of klines starting at `start_ms`
    pub async fn klines_from(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, BinanceError> {
        let rows: Vec<Vec<Value>> = self
            .public(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.as_str().to_string()),
                    ("startTime", start_ms.to_string()),
                    ("endTime", end_ms.to_string()),
                    ("limit", KLINE_PAGE.to_string()),
                ],
            )
            .await?;

        rows.iter().map(|r| parse_kline_row(r)).collect()
    }

    pub async fn ticker_price(&self, symbol: &str) -> Result<Price, BinanceError> {
        #[derive(Deserialize)]
        struct Ticker {
            price: String,
        }

        let t: Ticker = self
            .public("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;

        Ok(Price(parse_num(&t.price)?))
    }

    pub async fn symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, BinanceError> {
        let info: ExchangeInfo = self.public("/fapi/v1/exchangeInfo", &[]).await?;

        let entry = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| BinanceError::UnknownSymbol(symbol.to_string()))?;

        filters_from(&entry.filters)
    }

    async fn public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, BinanceError> {
        let url = format!("{}{}", self.config.rest_url, path);
        let resp = self.client.get(url).query(params).send().await?;
        read_json(resp, path).await
    }

    //
    // --- signed ---------------------------------------------------------------
    //

    pub async fn usdt_balance(&self) -> Result<Money, BinanceError> {
        #[derive(Deserialize)]
        struct AssetBalance {
            asset: String,
            balance: String,
        }

        let rows: Vec<AssetBalance> = self
            .signed(reqwest::Method::GET, "/fapi/v2/balance", Vec::new())
            .await?;

        // no USDT row means an empty wallet
        match rows.iter().find(|b| b.asset == "USDT") {
            Some(b) => Ok(Money(parse_num(&b.balance)?)),
            None => Ok(Money(0.0)),
        }
    }

    pub async fn position(&self, symbol: &str) -> Result<Option<Position>, BinanceError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PositionRisk {
            symbol: String,
            position_amt: String,
            entry_price: String,
        }

        let rows: Vec<PositionRisk> = self
            .signed(
                reqwest::Method::GET,
                "/fapi/v2/positionRisk",
                vec![("symbol", symbol.to_string())],
            )
            .await?;

        for r in rows.iter().filter(|r| r.symbol == symbol) {
            let amt = parse_num(&r.position_amt)?;
            if amt == 0.0 {
                continue;
            }
            return Ok(Some(Position {
                side: if amt > 0.0 {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                },
                qty: Qty(amt.abs()),
                entry_price: Price(parse_num(&r.entry_price)?),
            }));
        }

        Ok(None)
    }

    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), BinanceError> {
        let _: Value = self
            .signed(
                reqwest::Method::POST,
                "/fapi/v1/leverage",
                vec![
                    ("symbol", symbol.to_string()),
                    ("leverage", leverage.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn place_order(
        &self,
        symbol: &str,
        req: &OrderRequest,
        filters: SymbolFilters,
    ) -> Result<OrderResponse, BinanceError> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", req.side.as_exchange_str().to_string()),
            ("type", req.kind.as_str().to_string()),
            ("newClientOrderId", Uuid::new_v4().simple().to_string()),
        ];

        if let Some(qty) = req.qty {
            params.push(("quantity", format_step(qty.0, filters.step_size.0)));
        }

        if let Some(stop) = req.stop_price {
            params.push(("stopPrice", format_tick(stop.0, filters.tick_size.0)));
            params.push(("closePosition", "true".to_string()));
            params.push(("workingType", "MARK_PRICE".to_string()));
        }

        debug!("placing {} {} {}", symbol, req.side, req.kind.as_str());
        self.signed(reqwest::Method::POST, "/fapi/v1/order", params)
            .await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T, BinanceError> {
        let (Some(key), Some(secret)) = (&self.config.api_key, &self.config.api_secret) else {
            return Err(BinanceError::MissingCredentials);
        };

        params.push(("recvWindow", self.config.recv_window.to_string()));
        params.push(("timestamp", now_ms().to_string()));

        let query = encode_query(&params);
        let signature = sign(&query, secret)?;
        let url = format!(
            "{}{}?{}&signature={}",
            self.config.rest_url, path, query, signature
        );

        let resp = self
            .client
            .request(method, url)
            .header("X-MBX-APIKEY", key)
            .send()
            .await?;

        read_json(resp, path).await
    }
}

/// Non-2xx replies become `Api` errors carrying Binance's `{code, msg}`
async fn read_json<T: DeserializeOwned>(
    resp: reqwest::Response,
    path: &str,
) -> Result<T, BinanceError> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(api_error(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| BinanceError::Decode(format!("{}: {}", path, e)))
}

/// Fetch `[start_ms, end_ms]` page by page (ascending, deduplicated)
pub async fn download_range(
    api: &BinanceFutures,
    symbol: &str,
    interval: Interval,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<Candle>, BinanceError> {
    let mut all: Vec<Candle> = Vec::new();
    let mut cursor = start_ms;

    while cursor <= end_ms {
        let page = api.klines_from(symbol, interval, cursor, end_ms).await?;
        let Some(last) = page.last() else { break };

        let next = last.ts.0 + interval.as_millis();
        all.extend(page);
        if next <= cursor {
            break;
        }
        cursor = next;

        // stay well below the request weight limit
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
    }

    all.sort_by_key(|c| c.ts.0);
    all.dedup_by_key(|c| c.ts.0);
    all.retain(|c| c.ts.0 >= start_ms && c.ts.0 <= end_ms);

    Ok(all)
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

fn api_error(status: u16, body: &str) -> BinanceError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(e) => BinanceError::Api {
            code: e.code,
            msg: e.msg,
        },
        Err(_) => BinanceError::Api {
            code: -(status as i64),
            msg: body.chars().take(200).collect(),
        },
    }
}

fn filters_from(filters: &[Value]) -> Result<SymbolFilters, BinanceError> {
    let find = |kind: &str, field: &str| -> Result<f64, BinanceError> {
        filters
            .iter()
            .find(|f| f.get("filterType").and_then(Value::as_str) == Some(kind))
            .and_then(|f| f.get(field))
            .and_then(Value::as_str)
            .ok_or_else(|| BinanceError::Decode(format!("missing {}.{}", kind, field)))
            .and_then(parse_num)
    };

    Ok(SymbolFilters {
        step_size: Qty(find("LOT_SIZE", "stepSize")?),
        tick_size: Price(find("PRICE_FILTER", "tickSize")?),
    })
}

/// `[openTime, open, high, low, close, volume, closeTime, ...]`
pub(crate) fn parse_kline_row(row: &[Value]) -> Result<Candle, BinanceError> {
    if row.len() < 6 {
        return Err(BinanceError::Decode(format!("short kline row: {} fields", row.len())));
    }

    let ts = row[0]
        .as_i64()
        .ok_or_else(|| BinanceError::Decode("kline open time".into()))?;
    let field = |i: usize| -> Result<f64, BinanceError> {
        row[i]
            .as_str()
            .ok_or_else(|| BinanceError::Decode(format!("kline field {}", i)))
            .and_then(parse_num)
    };

    Ok(Candle {
        ts: TimestampMs(ts),
        open: Price(field(1)?),
        high: Price(field(2)?),
        low: Price(field(3)?),
        close: Price(field(4)?),
        volume: Qty(field(5)?),
    })
}

pub(crate) fn parse_num(s: &str) -> Result<f64, BinanceError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| BinanceError::Decode(format!("not a number: {:?}", s)))
}

pub(crate) fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Hex HMAC-SHA256 of the query string
pub(crate) fn sign(payload: &str, secret: &str) -> Result<String, BinanceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BinanceError::Config(format!("bad api secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Quantity rounded down to the step, printed with the step's precision
pub(crate) fn format_step(value: f64, step: f64) -> String {
    let q = round_down_to_step(Qty(value), Qty(step));
    format!("{:.*}", step_decimals(step), q.0)
}

/// Price rounded to the nearest tick
pub(crate) fn format_tick(value: f64, tick: f64) -> String {
    if tick <= 0.0 {
        return value.to_string();
    }
    let v = (value / tick).round() * tick;
    format!("{:.*}", step_decimals(tick), v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use execution::ExchangeError;
    use serde_json::json;

    #[test]
    fn signature_matches_binance_docs_example() {
        // example from the Binance API documentation (SIGNED endpoint security)
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        assert_eq!(
            sign(query, secret).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn parses_kline_row() {
        let row = vec![
            json!(1_700_000_000_000i64),
            json!("100.5"),
            json!("101.0"),
            json!("99.0"),
            json!("100.0"),
            json!("12.5"),
            json!(1_700_000_059_999i64),
        ];
        let c = parse_kline_row(&row).unwrap();
        assert_eq!(c.ts, TimestampMs(1_700_000_000_000));
        assert_eq!(c.high, Price(101.0));
        assert_eq!(c.volume, Qty(12.5));
    }

    #[test]
    fn rejects_malformed_kline() {
        assert!(parse_kline_row(&[json!(1), json!("x")]).is_err());
        let row = vec![json!(1), json!("a"), json!("1"), json!("1"), json!("1"), json!("1")];
        assert!(parse_kline_row(&row).is_err());
    }

    #[test]
    fn reads_lot_and_price_filters() {
        let filters = vec![
            json!({"filterType": "PRICE_FILTER", "tickSize": "0.10", "minPrice": "556.80"}),
            json!({"filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.001"}),
        ];
        let f = filters_from(&filters).unwrap();
        assert_eq!(f.step_size, Qty(0.001));
        assert_eq!(f.tick_size, Price(0.1));
    }

    #[test]
    fn formats_quantity_and_price() {
        assert_eq!(format_step(0.01979, 0.001), "0.019");
        assert_eq!(format_tick(60123.456, 0.1), "60123.5");
        assert_eq!(format_step(3.0, 1.0), "3");
    }

    #[test]
    fn api_error_body_is_decoded() {
        match api_error(400, r#"{"code":-2019,"msg":"Margin is insufficient."}"#) {
            BinanceError::Api { code, msg } => {
                assert_eq!(code, -2019);
                assert_eq!(msg, "Margin is insufficient.");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    /// One-shot HTTP server answering every request with `status` and `body`
    async fn reply_once(status: &str, body: &'static str) -> BinanceFutures {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(body.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
        });

        BinanceFutures::new(BinanceConfig {
            rest_url: format!("http://{}", addr),
            ..BinanceConfig::default()
        })
    }

    #[tokio::test]
    async fn public_error_keeps_binance_code() {
        let api = reply_once("400 Bad Request", r#"{"code":-1121,"msg":"Invalid symbol."}"#).await;

        let err = api.ticker_price("NOPEUSDT").await.unwrap_err();
        match &err {
            BinanceError::Api { code, msg } => {
                assert_eq!(*code, -1121);
                assert_eq!(msg, "Invalid symbol.");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            ExchangeError::from(err),
            ExchangeError::Rejected { code: -1121, .. }
        ));
    }

    #[tokio::test]
    async fn public_success_is_decoded() {
        let api = reply_once("200 OK", r#"{"symbol":"BTCUSDT","price":"60123.40","time":1}"#).await;
        assert_eq!(api.ticker_price("BTCUSDT").await.unwrap(), Price(60123.4));
    }

    #[tokio::test]
    async fn signed_calls_need_credentials() {
        let api = BinanceFutures::new(BinanceConfig::default());
        assert!(matches!(
            api.usdt_balance().await,
            Err(BinanceError::MissingCredentials)
        ));
    }
}
