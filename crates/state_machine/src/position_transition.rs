use crate::position_cause::PositionCause;
use crate::position_state::PositionState;

#[derive(Debug, PartialEq, Eq)]
pub enum PositionTransitionError {
    IllegalTransition {
        from: PositionState,
        cause: PositionCause,
    },
}

pub fn position_transition(
    state: PositionState,
    cause: PositionCause,
) -> Result<PositionState, PositionTransitionError> {
    let next = match (state, cause) {
        (PositionState::Flat, PositionCause::LongFilled) => PositionState::Long,
        (PositionState::Flat, PositionCause::ShortFilled) => PositionState::Short,

        (PositionState::Long, PositionCause::Closed) => PositionState::Flat,
        (PositionState::Short, PositionCause::Closed) => PositionState::Flat,

        _ => {
            return Err(PositionTransitionError::IllegalTransition {
                from: state,
                cause,
            });
        }
    };

    Ok(next)
}
