use domain::{Position, PositionSide};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Long,
    Short,
}

impl PositionState {
    /// State as reported by the exchange
    pub fn from_position(position: Option<&Position>) -> Self {
        match position.map(|p| p.side) {
            None => PositionState::Flat,
            Some(PositionSide::Long) => PositionState::Long,
            Some(PositionSide::Short) => PositionState::Short,
        }
    }

    pub fn is_flat(self) -> bool {
        self == PositionState::Flat
    }
}
