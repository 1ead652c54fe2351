use policy::signal::EntrySignal;
use state_machine::cause::RunCause;
use state_machine::position_cause::PositionCause;
use state_machine::position_state::PositionState;
use state_machine::state::RunState;

use crate::trader::CycleOutcome;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    RunTransition {
        from: RunState,
        cause: RunCause,
        to: RunState,
    },
    PositionTransition {
        from: PositionState,
        cause: PositionCause,
        to: PositionState,
    },
    Entry(EntrySignal),
    Cycle(CycleOutcome),
}
