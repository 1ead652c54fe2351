pub mod exchange;
pub mod paper;
pub mod replay;
pub mod sim;

pub use exchange::{Exchange, ExchangeError, MarketData, OrderAck};
pub use paper::{PaperExchange, PaperStats};
pub use replay::ReplayFeed;
pub use sim::ExecutionModel;
