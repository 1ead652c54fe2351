//! Dashboard panels: view state mirrored from the server and the ratatui
//! widgets drawn from it.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use protocol::{BotStatus, LOGS_LIMIT, StreamMessage, emotion_for_balance};

pub const HEADER: &str = "🚀 TRADE BOT 🚀";

/// Spinner frames shown next to the gear while running
pub const GEAR_FRAMES: [&str; 4] = ["◐", "◓", "◑", "◒"];
pub const GEAR_STOPPED: &str = "◯";

const BALANCE_ROWS: u16 = 4;
const POSITION_ROWS: u16 = 3;

/// What the screen shows; mirrors the server status
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub running: bool,
    pub balance: f64,
    pub position: Option<String>,
    pub entry_price: Option<f64>,
    pub logs: Vec<String>,
    pub error: Option<String>,
    frame: usize,
}

impl View {
    pub fn new(init_balance: f64) -> Self {
        Self {
            running: false,
            balance: init_balance,
            position: None,
            entry_price: None,
            logs: Vec::new(),
            error: None,
            frame: 0,
        }
    }

    /// A failed fetch shows the bot as stopped and keeps the last balance
    pub fn apply_status<E: std::fmt::Display>(&mut self, status: Result<BotStatus, E>) {
        match status {
            Ok(s) => {
                self.running = s.running;
                self.balance = s.balance;
                self.position = s.position;
                self.entry_price = s.entry_price;
                self.error = None;
            }
            Err(e) => {
                self.running = false;
                self.error = Some(e.to_string());
            }
        }
    }

    pub fn apply_stream(&mut self, msg: StreamMessage) {
        match msg {
            StreamMessage::Snapshot { status, logs } => {
                self.apply_status::<String>(Ok(status));
                self.logs = logs;
            }
            StreamMessage::Status { status } => self.apply_status::<String>(Ok(status)),
            StreamMessage::Log { line } => {
                self.logs.push(line);
                if self.logs.len() > LOGS_LIMIT {
                    let excess = self.logs.len() - LOGS_LIMIT;
                    self.logs.drain(0..excess);
                }
            }
            StreamMessage::Error { message } => self.apply_status::<String>(Err(message)),
        }
    }

    pub fn disconnected(&mut self, reason: impl Into<String>) {
        self.apply_status::<String>(Err(reason.into()));
    }

    pub fn tick(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    fn status_rows(&self) -> u16 {
        if self.error.is_some() { 4 } else { 3 }
    }

    /// Height of the status, balance and position panels
    pub fn panels_height(&self) -> u16 {
        self.status_rows() + BALANCE_ROWS + POSITION_ROWS
    }
}

pub fn gear(running: bool, frame: usize) -> String {
    if running {
        format!("⚙ {}", GEAR_FRAMES[frame % GEAR_FRAMES.len()])
    } else {
        format!("⚙ {}", GEAR_STOPPED)
    }
}

pub fn status_line(running: bool, frame: usize) -> String {
    let text = if running { "Bot Running" } else { "Bot Stopped" };
    format!("{}  {}", text, gear(running, frame))
}

pub fn balance_card(init_balance: f64, balance: f64) -> String {
    let mood = emotion_for_balance(init_balance, balance);
    format!(
        "💵 Balance : {:.2} USDT\n   mood    : {} {}",
        balance,
        mood.face(),
        mood.label()
    )
}

pub fn position_line(position: Option<&str>, entry_price: Option<f64>) -> Option<String> {
    let side = position?;
    Some(match entry_price {
        Some(p) => format!("📌 Position : {} @ {:.2}", side, p),
        None => format!("📌 Position : {}", side),
    })
}

/// Plain-text log listing for the one-shot `logs` command
pub fn log_panel(logs: &[String]) -> String {
    if logs.is_empty() {
        return "no logs yet.".to_string();
    }
    let mut out = String::from("📊 recent trade logs\n");
    for line in logs {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Whole screen; the newest `log_rows` log lines go in the bottom panel
/// (no panel when 0)
pub fn draw(f: &mut Frame<'_>, view: &View, init_balance: f64, log_rows: usize) {
    let mut constraints = vec![
        Constraint::Length(view.status_rows()),
        Constraint::Length(BALANCE_ROWS),
        Constraint::Length(POSITION_ROWS),
    ];
    if log_rows > 0 {
        constraints.push(Constraint::Min(3));
    }
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(f.area());

    f.render_widget(status_panel(view), areas[0]);
    f.render_widget(
        Paragraph::new(balance_card(init_balance, view.balance))
            .block(Block::default().title(" Balance ").borders(Borders::ALL)),
        areas[1],
    );
    let position = position_line(view.position.as_deref(), view.entry_price)
        .unwrap_or_else(|| "📌 Position : none".to_string());
    f.render_widget(
        Paragraph::new(position).block(Block::default().title(" Position ").borders(Borders::ALL)),
        areas[2],
    );

    if log_rows > 0 {
        let fits = areas[3].height.saturating_sub(2) as usize;
        f.render_widget(log_list(&view.logs, log_rows.min(fits)), areas[3]);
    }
}

fn status_panel(view: &View) -> Paragraph<'static> {
    let color = if view.running { Color::Green } else { Color::Red };
    let mut lines = vec![Line::from(Span::styled(
        status_line(view.running, view.frame),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))];
    if let Some(err) = &view.error {
        lines.push(Line::from(Span::styled(
            format!("⚠️  {}", err),
            Style::default().fg(Color::Yellow),
        )));
    }

    Paragraph::new(lines).block(
        Block::default()
            .title(format!(" {} ", HEADER))
            .borders(Borders::ALL),
    )
}

fn log_list(logs: &[String], rows: usize) -> Paragraph<'static> {
    let block = Block::default()
        .title(" 📊 recent trade logs ")
        .borders(Borders::ALL);

    if logs.is_empty() {
        return Paragraph::new("no logs yet.").block(block);
    }

    let skip = logs.len().saturating_sub(rows);
    let lines: Vec<Line> = logs[skip..]
        .iter()
        .map(|l| Line::from(l.clone()))
        .collect();
    Paragraph::new(lines).block(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{Terminal, backend::TestBackend};

    fn status(running: bool, balance: f64) -> BotStatus {
        BotStatus {
            running,
            balance,
            position: None,
            entry_price: None,
        }
    }

    /// Draw into an 80x30 test buffer and return its rows as text
    fn rendered(view: &View, init_balance: f64, log_rows: usize) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 30)).unwrap();
        terminal
            .draw(|f| draw(f, view, init_balance, log_rows))
            .unwrap();

        let buf = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buf.area.height {
            for x in 0..buf.area.width {
                out.push_str(buf[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn gear_spins_only_while_running() {
        assert_eq!(gear(true, 0), "⚙ ◐");
        assert_eq!(gear(true, 5), "⚙ ◓");
        assert_eq!(gear(false, 3), gear(false, 0));
        assert_eq!(status_line(false, 0), "Bot Stopped  ⚙ ◯");
    }

    #[test]
    fn balance_card_shows_mood() {
        let card = balance_card(50.0, 52.1);
        assert!(card.starts_with("💵 Balance : 52.10 USDT"));
        assert!(card.contains("NEUTRAL"));
        assert!(balance_card(50.0, 55.0).contains("MANIC"));
        assert!(balance_card(50.0, 30.0).contains("DEPRESSED"));
    }

    #[test]
    fn position_line_only_when_open() {
        assert_eq!(position_line(None, None), None);
        assert_eq!(
            position_line(Some("long"), Some(101.5)).unwrap(),
            "📌 Position : long @ 101.50"
        );
    }

    #[test]
    fn empty_log_panel() {
        assert_eq!(log_panel(&[]), "no logs yet.");
        let panel = log_panel(&["[2024-01-01 09:00:00] ✅ bot started".to_string()]);
        assert!(panel.starts_with("📊 recent trade logs\n"));
        assert!(panel.contains("✅ bot started"));
    }

    #[test]
    fn screen_shows_every_panel() {
        let mut v = View::new(50.0);
        v.apply_status::<String>(Ok(BotStatus {
            running: true,
            balance: 52.1,
            position: Some("long".into()),
            entry_price: Some(101.5),
        }));

        let screen = rendered(&v, 50.0, 5);
        assert!(screen.contains("TRADE BOT"));
        assert!(screen.contains("Bot Running"));
        assert!(screen.contains("52.10 USDT"));
        assert!(screen.contains("NEUTRAL"));
        assert!(screen.contains("long @ 101.50"));
        assert!(screen.contains("no logs yet."));
    }

    #[test]
    fn failed_fetch_shows_stopped_and_keeps_balance() {
        let mut v = View::new(50.0);
        v.apply_status::<String>(Ok(status(true, 61.0)));
        assert!(v.running);

        v.apply_status(Err("connection refused"));
        assert!(!v.running);
        assert_eq!(v.balance, 61.0);

        let screen = rendered(&v, 50.0, 10);
        assert!(screen.contains("Bot Stopped"));
        assert!(screen.contains("connection refused"));
        assert!(screen.contains("61.00 USDT"));
    }

    #[test]
    fn stream_messages_update_the_view() {
        let mut v = View::new(50.0);
        v.apply_stream(StreamMessage::Snapshot {
            status: status(false, 50.0),
            logs: vec!["a".into()],
        });
        v.apply_stream(StreamMessage::Log { line: "b".into() });
        v.apply_stream(StreamMessage::Status {
            status: status(true, 55.0),
        });
        assert!(v.running);
        assert_eq!(v.logs, vec!["a".to_string(), "b".to_string()]);

        v.apply_stream(StreamMessage::Error {
            message: "exchange down".into(),
        });
        assert!(!v.running);
        assert_eq!(v.balance, 55.0);
    }

    #[test]
    fn log_panel_keeps_the_newest_rows() {
        let mut v = View::new(50.0);
        v.logs = (0..20).map(|i| format!("line {}", i)).collect();

        let screen = rendered(&v, 50.0, 3);
        assert!(screen.contains("line 19"));
        assert!(screen.contains("line 17"));
        assert!(!screen.contains("line 16"));

        let without_logs = rendered(&v, 50.0, 0);
        assert!(!without_logs.contains("line 19"));
        assert!(!without_logs.contains("recent trade logs"));
    }

    #[test]
    fn error_line_grows_the_status_panel() {
        let mut v = View::new(50.0);
        assert_eq!(v.panels_height(), 10);
        v.disconnected("stream disconnected");
        assert_eq!(v.panels_height(), 11);
    }
}
