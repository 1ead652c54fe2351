use domain::{Position, PositionSide, Price, Qty};

use crate::position_cause::PositionCause;
use crate::position_state::PositionState;
use crate::position_transition::position_transition;

#[test]
fn long_round_trip() {
    let mut s = PositionState::Flat;
    s = position_transition(s, PositionCause::LongFilled).unwrap();
    assert_eq!(s, PositionState::Long);
    s = position_transition(s, PositionCause::Closed).unwrap();
    assert!(s.is_flat());
}

#[test]
fn short_round_trip() {
    let mut s = PositionState::Flat;
    s = position_transition(s, PositionCause::ShortFilled).unwrap();
    s = position_transition(s, PositionCause::Closed).unwrap();
    assert_eq!(s, PositionState::Flat);
}

#[test]
fn cannot_pyramid_or_flip() {
    assert!(position_transition(PositionState::Long, PositionCause::LongFilled).is_err());
    assert!(position_transition(PositionState::Long, PositionCause::ShortFilled).is_err());
    assert!(position_transition(PositionState::Flat, PositionCause::Closed).is_err());
}

#[test]
fn resync_from_exchange_position() {
    let p = Position {
        side: PositionSide::Short,
        qty: Qty(0.01),
        entry_price: Price(60_000.0),
    };
    assert_eq!(PositionState::from_position(Some(&p)), PositionState::Short);
    assert_eq!(PositionState::from_position(None), PositionState::Flat);
}
