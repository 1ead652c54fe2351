pub mod types;

pub use types::{Bps, Money, Position, PositionSide, Price, Qty, Ratio, Side, TimestampMs};
