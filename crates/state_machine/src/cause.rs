/// Operator commands that move the bot between stopped and running
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunCause {
    StartRequested,
    StopRequested,
}
