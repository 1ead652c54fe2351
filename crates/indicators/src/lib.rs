pub mod atr;
pub mod bollinger;
pub mod candle;
pub mod rsi;

pub use bollinger::{Bands, WidthHistory};
pub use candle::{Candle, Interval, UnknownInterval};
