#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PositionCause {
    LongFilled,
    ShortFilled,
    /// TP, SL or an exchange-side close
    Closed,
}
