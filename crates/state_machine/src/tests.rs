use crate::cause::RunCause;
use crate::state::RunState;
use crate::transition::{RunTransitionError, run_transition};

#[test]
fn start_then_stop() {
    let mut s = RunState::default();
    assert_eq!(s, RunState::Stopped);

    s = run_transition(s, RunCause::StartRequested).unwrap();
    assert!(s.is_running());

    s = run_transition(s, RunCause::StopRequested).unwrap();
    assert_eq!(s, RunState::Stopped);
}

#[test]
fn repeated_start_is_rejected() {
    assert_eq!(
        run_transition(RunState::Running, RunCause::StartRequested),
        Err(RunTransitionError::IllegalTransition {
            from: RunState::Running,
            cause: RunCause::StartRequested,
        })
    );
}

#[test]
fn stop_while_stopped_is_rejected() {
    assert!(run_transition(RunState::Stopped, RunCause::StopRequested).is_err());
}
