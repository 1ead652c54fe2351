use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Parser;
use tracing::info;

use binance::BinanceConfig;
use binance::rest::{BinanceFutures, download_range};
use domain::{Money, Price, Qty, TimestampMs};
use engine::{CycleOutcome, Settings, TradeLog, Trader};
use execution::{Exchange, ExecutionModel, PaperExchange, ReplayFeed};
use indicators::{Candle, Interval};

/// Replay historical klines through the trading cycle on a paper account.
/// Strategy settings come from the same environment variables as the server.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "BTCUSDT")]
    symbol: String,
    #[arg(long, default_value = "1m")]
    interval: Interval,
    /// first day, YYYY-MM-DD (UTC)
    #[arg(long)]
    start: String,
    /// last day, inclusive
    #[arg(long)]
    end: String,
    #[arg(long, default_value = "data/backtest.csv")]
    cache: String,
    /// download even when the cache exists
    #[arg(long, default_value_t = false)]
    refresh: bool,
    #[arg(long, default_value_t = 50.0)]
    balance: f64,
    #[arg(long, default_value_t = 4.0)]
    fee_bps: f64,
    #[arg(long, default_value_t = 1.0)]
    spread_bps: f64,
    #[arg(long, default_value_t = 1.0)]
    slippage_bps: f64,
    #[arg(long, default_value = "0.001")]
    step: f64,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CandleRow {
    ts: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn date_to_ms(date: &str) -> Result<i64> {
    let d = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("bad date: {}", date))?;
    let dt = Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN));
    Ok(dt.timestamp_millis())
}

fn read_cache(path: &str) -> Result<Vec<Candle>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut out = Vec::new();

    for r in rdr.deserialize::<CandleRow>() {
        let row = r?;
        out.push(Candle {
            ts: TimestampMs(row.ts),
            open: Price(row.open),
            high: Price(row.high),
            low: Price(row.low),
            close: Price(row.close),
            volume: Qty(row.volume),
        });
    }

    Ok(out)
}

fn write_cache(path: &str, candles: &[Candle]) -> Result<()> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::Writer::from_path(path)?;
    for c in candles {
        wtr.serialize(CandleRow {
            ts: c.ts.0,
            open: c.open.0,
            high: c.high.0,
            low: c.low.0,
            close: c.close.0,
            volume: c.volume.0,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backtest=info".into()),
        )
        .init();

    let args = Args::parse();

    let start_ms = date_to_ms(&args.start)?;
    let end_ms = date_to_ms(&args.end)? + 24 * 60 * 60 * 1000 - 1;

    let candles = if !args.refresh && std::path::Path::new(&args.cache).exists() {
        read_cache(&args.cache).context("read cache failed")?
    } else {
        let api = BinanceFutures::new(BinanceConfig::from_env()?);
        let data = download_range(&api, &args.symbol, args.interval, start_ms, end_ms)
            .await
            .context("download range failed")?;
        write_cache(&args.cache, &data).context("write cache failed")?;
        data
    };

    let settings = Settings {
        symbol: args.symbol.clone(),
        interval: args.interval,
        order_settle: Duration::ZERO,
        ..Settings::from_env().context("invalid settings")?
    };

    let warmup = settings.warmup();
    if candles.len() <= warmup {
        anyhow::bail!("not enough candles: {} (need more than {})", candles.len(), warmup);
    }
    info!("loaded {} candles from {}", candles.len(), args.cache);

    let feed = Arc::new(ReplayFeed::new(candles));
    let paper = Arc::new(
        PaperExchange::new(feed.clone(), Money(args.balance))
            .with_model(ExecutionModel {
                fee_bps: args.fee_bps,
                spread_bps: args.spread_bps,
                slippage_bps: args.slippage_bps,
            })
            .with_leverage(f64::from(settings.leverage))
            .with_step(Qty(args.step)),
    );

    let log = TradeLog::new(settings.log_capacity, settings.log_offset()?);
    let mut trader = Trader::new(paper.clone(), settings, log);

    let mut cycles = 0usize;
    let mut entries = 0usize;
    let mut failed = 0usize;

    feed.seek(warmup - 1);
    loop {
        match trader.run_cycle().await? {
            CycleOutcome::Entered { .. } => entries += 1,
            CycleOutcome::OrderFailed => failed += 1,
            _ => {}
        }
        cycles += 1;

        if !feed.advance() {
            break;
        }
    }

    // settles brackets touched by the last candle
    let final_balance = paper.balance().await?;
    let open = paper.position().await?;
    let stats = paper.stats().await;
    let return_pct = (final_balance.0 - args.balance) / args.balance * 100.0;

    println!("cycles={}", cycles);
    println!("entries={}", entries);
    println!("failed_orders={}", failed);
    println!("trades={}", stats.trades);
    println!("wins={}", stats.wins);
    println!("losses={}", stats.losses);
    println!("fees={:.4}", stats.fees.0);
    println!("realized_pnl={:.4}", stats.realized_pnl.0);
    println!("open_position={}", open.map(|p| p.side.to_string()).unwrap_or_else(|| "none".into()));
    println!("final_balance={:.4}", final_balance.0);
    println!("return_pct={:.2}", return_pct);
    Ok(())
}
