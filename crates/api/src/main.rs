mod config;
mod server;
mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use binance::{BinanceConfig, BinanceExchange, BinanceFutures, StreamFeed};
use domain::Money;
use engine::{Bot, Settings, TradeLog, TradingMode};
use execution::{Exchange, PaperExchange};

use crate::config::ServerConfig;
use crate::server::{AppState, build_router, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,engine=info,binance=info,tower_http=info".into()),
        )
        .init();

    let settings = Settings::from_env().context("invalid bot settings")?;
    let server = ServerConfig::from_env().context("invalid server settings")?;
    let binance = BinanceConfig::from_env()?;

    let exchange = connect_exchange(&settings, binance).await?;
    let log = TradeLog::new(settings.log_capacity, settings.log_offset()?);
    let start_running = settings.start_running;

    let bot = Arc::new(Bot::new(exchange, settings, log));
    if start_running {
        bot.start();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bot_loop = tokio::spawn(bot.clone().run(shutdown_rx));

    let state = AppState {
        bot,
        status_push: server.status_push,
    };
    let app = build_router(state, &server);

    info!("api listening on {}", server.bind_addr);
    let listener = tokio::net::TcpListener::bind(server.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send(true).ok();
    bot_loop.await.context("bot loop panicked")?;
    info!("api stopped");
    Ok(())
}

async fn connect_exchange(settings: &Settings, config: BinanceConfig) -> Result<Arc<dyn Exchange>> {
    let api = BinanceFutures::new(config);

    match settings.mode {
        TradingMode::Live => {
            let live = BinanceExchange::connect(
                api,
                &settings.symbol,
                settings.interval,
                settings.leverage,
            )
            .await
            .context("binance live setup failed")?;
            info!("live trading {} on binance futures", settings.symbol);
            Ok(Arc::new(live))
        }
        TradingMode::Paper => {
            let filters = api
                .symbol_filters(&settings.symbol)
                .await
                .with_context(|| format!("exchange info for {}", settings.symbol))?;
            let feed = StreamFeed::spawn(api, &settings.symbol, settings.interval, settings.kline_limit)
                .await
                .context("kline feed setup failed")?;
            let paper = PaperExchange::new(feed, Money(settings.paper_balance))
                .with_leverage(f64::from(settings.leverage))
                .with_step(filters.step_size);
            info!(
                "paper trading {} with {} USDT",
                settings.symbol, settings.paper_balance
            );
            Ok(Arc::new(paper))
        }
    }
}
