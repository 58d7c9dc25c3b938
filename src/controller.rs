//! Reads and drives the actuator on behalf of authorized users.
//!
//! [`ResourceController::set`] is the only path that changes the physical
//! output and the only writer of the activity ledger.

use crate::actuator::{Actuator, ActuatorState};
use crate::clock::Tick;
use crate::error::{AccessError, AccessResult};
use crate::ledger::ActivityLedger;

/// Map a requested-state literal to a state. Only `"1"` and `"0"` are accepted.
pub fn parse_state(literal: &str) -> AccessResult<ActuatorState> {
    match literal {
        "1" => Ok(ActuatorState::On),
        "0" => Ok(ActuatorState::Off),
        _ => Err(AccessError::InvalidState),
    }
}

pub struct ResourceController<A: Actuator> {
    actuator: A,
}

impl<A: Actuator> ResourceController<A> {
    pub fn new(actuator: A) -> Self {
        Self { actuator }
    }

    /// Current output level. Reads are not transitions and are not logged.
    pub fn get(&self) -> ActuatorState {
        ActuatorState::from(self.actuator.read_state())
    }

    /// Drive the output to `requested` and record the change.
    pub fn set(
        &mut self,
        ledger: &mut ActivityLedger,
        username: &str,
        requested: &str,
        now: Tick,
    ) -> AccessResult<ActuatorState> {
        let state = parse_state(requested)?;

        self.actuator.write_state(state.is_on());
        ledger.record(username, state, now);
        tracing::info!(
            username = username,
            state = state.as_str(),
            actuator = self.actuator.name(),
            "Actuator state changed"
        );
        Ok(state)
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }
}
