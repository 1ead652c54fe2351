use std::collections::VecDeque;

use domain::Price;

/// Bollinger bands of the latest close
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bands {
    pub upper: Price,
    pub middle: Price,
    pub lower: Price,
}

impl Bands {
    /// (upper - lower) / middle
    pub fn width(&self) -> Option<f64> {
        if self.middle.0 == 0.0 {
            return None;
        }
        Some((self.upper.0 - self.lower.0) / self.middle.0)
    }
}

/// SMA(period) ± std_dev * sample standard deviation (n - 1)
pub fn bollinger_bands(closes: &[f64], period: usize, std_dev: f64) -> Option<Bands> {
    if period < 2 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let n = period as f64;
    let mean = window.iter().sum::<f64>() / n;
    let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let band = std_dev * var.sqrt();

    Some(Bands {
        upper: Price(mean + band),
        middle: Price(mean),
        lower: Price(mean - band),
    })
}

/// Band width history for squeeze detection.
///
/// Holds the most recent `capacity` widths.
#[derive(Debug, Clone)]
pub struct WidthHistory {
    capacity: usize,
    widths: VecDeque<f64>,
}

impl WidthHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            widths: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, width: f64) {
        if !width.is_finite() {
            return;
        }
        self.widths.push_back(width);
        while self.widths.len() > self.capacity {
            self.widths.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.widths.len() >= self.capacity
    }

    pub fn mean(&self) -> Option<f64> {
        if self.widths.is_empty() {
            return None;
        }
        Some(self.widths.iter().sum::<f64>() / self.widths.len() as f64)
    }

    /// `width` is at or below `ratio` of the historical mean.
    /// Only answers once the history is full.
    pub fn is_squeeze(&self, width: f64, ratio: f64) -> bool {
        if !self.is_full() {
            return false;
        }
        match self.mean() {
            Some(mean) => width <= mean * ratio,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_use_sample_std() {
        // mean = 3, sample variance = 2.5
        let b = bollinger_bands(&[1.0, 2.0, 3.0, 4.0, 5.0], 5, 2.0).unwrap();
        let sd = 2.5f64.sqrt();
        assert!((b.middle.0 - 3.0).abs() < 1e-12);
        assert!((b.upper.0 - (3.0 + 2.0 * sd)).abs() < 1e-12);
        assert!((b.lower.0 - (3.0 - 2.0 * sd)).abs() < 1e-12);
    }

    #[test]
    fn bands_only_look_at_the_tail() {
        let closes = [1000.0, 10.0, 10.0, 10.0];
        let b = bollinger_bands(&closes, 3, 2.0).unwrap();
        assert_eq!(b.upper, b.lower);
        assert_eq!(b.width(), Some(0.0));
    }

    #[test]
    fn bands_need_full_window() {
        assert!(bollinger_bands(&[1.0, 2.0], 3, 2.0).is_none());
    }

    #[test]
    fn squeeze_needs_full_history() {
        let mut h = WidthHistory::new(3);
        h.push(0.10);
        h.push(0.10);
        assert!(!h.is_squeeze(0.01, 0.8));

        h.push(0.10);
        assert!(h.is_squeeze(0.08, 0.8));
        assert!(!h.is_squeeze(0.09, 0.8));
    }

    #[test]
    fn history_drops_oldest() {
        let mut h = WidthHistory::new(2);
        h.push(1.0);
        h.push(2.0);
        h.push(4.0);
        assert_eq!(h.len(), 2);
        assert_eq!(h.mean(), Some(3.0));
    }
}
