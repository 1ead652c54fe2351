pub mod risk;
pub mod signal;
