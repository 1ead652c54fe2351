pub mod cause;
pub mod position_cause;
pub mod position_state;
pub mod position_transition;
pub mod state;
pub mod transition;

#[cfg(test)]
mod position_tests;
#[cfg(test)]
mod tests;
