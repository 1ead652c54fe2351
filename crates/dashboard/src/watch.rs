use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::{Terminal, TerminalOptions, Viewport};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use protocol::StreamMessage;

use crate::client::ApiClient;
use crate::render::{View, draw};

const STATUS_EVERY: Duration = Duration::from_secs(5);
const LOGS_EVERY: Duration = Duration::from_secs(10);
const FRAME_EVERY: Duration = Duration::from_millis(250);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[derive(Debug, Copy, Clone)]
pub struct WatchOptions {
    pub init_balance: f64,
    pub log_rows: usize,
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn teardown_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// `q`, Esc or Ctrl+C (raw mode swallows SIGINT)
fn is_quit(event: &Event) -> bool {
    let Event::Key(KeyEvent {
        code,
        modifiers,
        kind,
        ..
    }) = event
    else {
        return false;
    };
    if *kind != KeyEventKind::Press {
        return false;
    }
    match code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// A closed event stream also ends the view
fn quit_requested(event: Option<io::Result<Event>>) -> Result<bool> {
    match event {
        Some(Ok(e)) => Ok(is_quit(&e)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(true),
    }
}

fn interval(every: Duration) -> tokio::time::Interval {
    let mut i = tokio::time::interval(every);
    i.set_missed_tick_behavior(MissedTickBehavior::Skip);
    i
}

/// Draw the status panels once, inline below the prompt
pub fn print_once(view: &View, init_balance: f64) -> Result<()> {
    let mut terminal = Terminal::with_options(
        CrosstermBackend::new(io::stdout()),
        TerminalOptions {
            viewport: Viewport::Inline(view.panels_height()),
        },
    )?;
    terminal.draw(|f| draw(f, view, init_balance, 0))?;
    println!();
    Ok(())
}

/// Poll status every 5 s and logs every 10 s until `q`
pub async fn poll(client: ApiClient, opts: WatchOptions) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let res = poll_loop(&mut terminal, &client, opts).await;
    teardown_terminal(&mut terminal)?;
    res
}

async fn poll_loop(terminal: &mut Tui, client: &ApiClient, opts: WatchOptions) -> Result<()> {
    let mut view = View::new(opts.init_balance);
    let mut status_tick = interval(STATUS_EVERY);
    let mut logs_tick = interval(LOGS_EVERY);
    let mut frame_tick = interval(FRAME_EVERY);
    let mut events = EventStream::new();

    loop {
        terminal.draw(|f| draw(f, &view, opts.init_balance, opts.log_rows))?;

        tokio::select! {
            _ = status_tick.tick() => view.apply_status(client.status().await),
            _ = logs_tick.tick() => match client.logs().await {
                Ok(logs) => view.logs = logs,
                Err(e) => debug!("logs fetch failed: {}", e),
            },
            _ = frame_tick.tick() => view.tick(),
            event = events.next() => {
                if quit_requested(event)? {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Follow the server's WebSocket push, reconnecting when it drops
pub async fn stream(client: ApiClient, opts: WatchOptions) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let res = stream_loop(&mut terminal, &client, opts).await;
    teardown_terminal(&mut terminal)?;
    res
}

async fn stream_loop(terminal: &mut Tui, client: &ApiClient, opts: WatchOptions) -> Result<()> {
    let url = client.stream_url();
    let mut view = View::new(opts.init_balance);
    let mut frame_tick = interval(FRAME_EVERY);
    let mut events = EventStream::new();

    'outer: loop {
        terminal.draw(|f| draw(f, &view, opts.init_balance, opts.log_rows))?;

        let connected = tokio::select! {
            res = tokio_tungstenite::connect_async(url.as_str()) => res,
            event = events.next() => {
                if quit_requested(event)? {
                    break 'outer;
                }
                continue;
            }
        };

        match connected {
            Ok((ws, _)) => {
                debug!("stream connected: {}", url);
                let (_, mut read) = ws.split();

                loop {
                    terminal.draw(|f| draw(f, &view, opts.init_balance, opts.log_rows))?;

                    tokio::select! {
                        msg = read.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<StreamMessage>(&text) {
                                    Ok(m) => view.apply_stream(m),
                                    Err(e) => warn!("bad stream frame: {}", e),
                                }
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                                view.disconnected("stream disconnected");
                                break;
                            }
                            Some(Ok(_)) => {}
                        },
                        _ = frame_tick.tick() => view.tick(),
                        event = events.next() => {
                            if quit_requested(event)? {
                                break 'outer;
                            }
                        }
                    }
                }
            }
            Err(e) => view.disconnected(format!("cannot reach {}: {}", url, e)),
        }

        let retry = tokio::time::sleep(RECONNECT_DELAY);
        tokio::pin!(retry);
        loop {
            terminal.draw(|f| draw(f, &view, opts.init_balance, opts.log_rows))?;

            tokio::select! {
                _ = &mut retry => break,
                _ = frame_tick.tick() => view.tick(),
                event = events.next() => {
                    if quit_requested(event)? {
                        break 'outer;
                    }
                }
            }
        }
    }

    Ok(())
}
