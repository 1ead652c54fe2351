use tracing::{debug, info};

use crate::event::EngineEvent;

pub fn consume(events: Vec<EngineEvent>) {
    for e in events {
        match e {
            EngineEvent::RunTransition { from, cause, to } => {
                info!("run: {:?} --({:?})-> {:?}", from, cause, to);
            }
            EngineEvent::PositionTransition { from, cause, to } => {
                info!("position: {:?} --({:?})-> {:?}", from, cause, to);
            }
            EngineEvent::Entry(signal) => {
                info!("entry: {} ({:?})", signal, signal.side);
            }
            EngineEvent::Cycle(outcome) => {
                debug!("cycle: {:?}", outcome);
            }
        }
    }
}
