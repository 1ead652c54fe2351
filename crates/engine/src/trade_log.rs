use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::broadcast;
use tracing::info;

const SUBSCRIBER_BUFFER: usize = 256;

/// Bounded list of timestamped lines describing what the bot did.
///
/// Cheap to clone; clones share the same buffer and subscribers.
#[derive(Clone)]
pub struct TradeLog {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
    offset: FixedOffset,
    tx: broadcast::Sender<String>,
}

impl TradeLog {
    pub fn new(capacity: usize, offset: FixedOffset) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            offset,
            tx,
        }
    }

    /// Append a line stamped with the current time. Returns the stored line.
    pub fn push(&self, message: impl AsRef<str>) -> String {
        self.push_at(Utc::now(), message)
    }

    pub fn push_at(&self, at: DateTime<Utc>, message: impl AsRef<str>) -> String {
        let line = format!(
            "[{}] {}",
            at.with_timezone(&self.offset).format("%Y-%m-%d %H:%M:%S"),
            message.as_ref()
        );
        info!(target: "engine::trade_log", "{}", line);

        {
            let mut lines = self.lock();
            lines.push_back(line.clone());
            while lines.len() > self.capacity {
                lines.pop_front();
            }
        }

        // no subscribers is fine
        let _ = self.tx.send(line.clone());
        line
    }

    /// Last `n` lines, oldest first
    pub fn recent(&self, n: usize) -> Vec<String> {
        let lines = self.lock();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// New lines as they are pushed. Slow receivers get `Lagged` and skip ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn seoul() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn lines_are_stamped_in_the_configured_offset() {
        let log = TradeLog::new(10, seoul());
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 5).unwrap();
        let line = log.push_at(at, "✅ bot started");
        assert_eq!(line, "[2024-03-02 08:30:05] ✅ bot started");
        assert_eq!(log.recent(1), vec![line]);
    }

    #[test]
    fn oldest_lines_are_dropped_past_capacity() {
        let log = TradeLog::new(3, seoul());
        for i in 0..5 {
            log.push(format!("line {}", i));
        }
        assert_eq!(log.len(), 3);
        let recent = log.recent(100);
        assert!(recent[0].ends_with("line 2"));
        assert!(recent[2].ends_with("line 4"));

        let last_two = log.recent(2);
        assert!(last_two[0].ends_with("line 3"));
    }

    #[tokio::test]
    async fn subscribers_receive_new_lines() {
        let log = TradeLog::new(10, seoul());
        let mut rx = log.subscribe();
        let pushed = log.clone().push("🚀 starting a new cycle...");
        assert_eq!(rx.recv().await.unwrap(), pushed);
    }
}
