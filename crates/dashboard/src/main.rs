mod client;
mod render;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};

use protocol::{ControlAction, LOGS_LIMIT};

use crate::client::ApiClient;
use crate::render::{View, log_panel};
use crate::watch::WatchOptions;

/// Terminal dashboard for the trading bot control API
#[derive(Parser, Debug)]
#[command(name = "dashboard")]
struct Cli {
    #[arg(long, env = "DASHBOARD_API_URL", default_value = "http://127.0.0.1:8000")]
    api_url: String,
    /// balance the mood is measured against
    #[arg(long, default_value_t = 50.0)]
    init_balance: f64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the status card once
    Status,
    Start,
    Stop,
    /// Print recent trade logs
    Logs {
        #[arg(long, default_value_t = LOGS_LIMIT)]
        limit: usize,
    },
    /// Live view (`q` to quit): polls by default, `--stream` follows the WebSocket
    Watch {
        #[arg(long, default_value_t = false)]
        stream: bool,
        #[arg(long, default_value_t = 15)]
        log_rows: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = ApiClient::new(&cli.api_url)?;
    tracing::debug!("api at {}", client.base());

    match cli.command {
        Command::Status => {
            let mut view = View::new(cli.init_balance);
            view.apply_status(client.status().await);
            watch::print_once(&view, cli.init_balance)?;
        }
        Command::Start => {
            let res = client.control(ControlAction::Start).await?;
            println!("{}", res.status);
        }
        Command::Stop => {
            let res = client.control(ControlAction::Stop).await?;
            println!("{}", res.status);
        }
        Command::Logs { limit } => {
            let logs = client.logs().await?;
            let skip = logs.len().saturating_sub(limit);
            print!("{}", log_panel(&logs[skip..]));
            if logs.is_empty() {
                println!();
            }
        }
        Command::Watch { stream, log_rows } => {
            let opts = WatchOptions {
                init_balance: cli.init_balance,
                log_rows,
            };
            if stream {
                watch::stream(client, opts).await?;
            } else {
                watch::poll(client, opts).await?;
            }
        }
    }

    Ok(())
}
