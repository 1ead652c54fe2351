use crate::cause::RunCause;
use crate::state::RunState;

#[derive(Debug, PartialEq, Eq)]
pub enum RunTransitionError {
    IllegalTransition { from: RunState, cause: RunCause },
}

pub fn run_transition(state: RunState, cause: RunCause) -> Result<RunState, RunTransitionError> {
    let next = match (state, cause) {
        (RunState::Stopped, RunCause::StartRequested) => RunState::Running,
        (RunState::Running, RunCause::StopRequested) => RunState::Stopped,

        // repeated command
        _ => return Err(RunTransitionError::IllegalTransition { from: state, cause }),
    };

    Ok(next)
}
