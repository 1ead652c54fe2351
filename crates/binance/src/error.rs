use thiserror::Error;

use execution::ExchangeError;

#[derive(Error, Debug)]
pub enum BinanceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("binance api error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("api key and secret are required for signed endpoints")]
    MissingCredentials,

    #[error("symbol not listed: {0}")]
    UnknownSymbol(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl From<BinanceError> for ExchangeError {
    fn from(e: BinanceError) -> Self {
        match e {
            BinanceError::Api { code, msg } => ExchangeError::Rejected { code, msg },
            BinanceError::Http(e) => ExchangeError::Transport(e.to_string()),
            BinanceError::WebSocket(e) => ExchangeError::Transport(e),
            other => ExchangeError::Decode(other.to_string()),
        }
    }
}
