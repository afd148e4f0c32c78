//! Repositioning strategies: move idle cars ahead of demand.
//!
//! Strategies are run on every status update and return commands for the
//! dispatcher to forward to car task topics. A strategy owns whatever memory
//! it needs to avoid resending commands.

use std::collections::BTreeSet;

use crate::calls::{Direction, Floor};
use crate::ecs::CarMotionState;
use crate::gcs::CarStatusSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositionCommand {
    /// Send the car to a floor with no direction preference.
    Move { car: String, floor: Floor },
    /// Send the car to a floor and present the given direction on arrival.
    ForcedMove { car: String, floor: Floor, direction: Direction },
}

pub trait RepositioningStrategy: Send + Sync {
    /// Called after each status update of `car`. Commands may target any car.
    fn evaluate(
        &mut self,
        car: &str,
        status: &CarStatusSnapshot,
        all: &[(String, CarStatusSnapshot)],
    ) -> Vec<RepositionCommand>;

    fn name(&self) -> &'static str;
}

/// Leaves idle cars where they are.
#[derive(Debug, Default)]
pub struct NoRepositioning;

impl RepositioningStrategy for NoRepositioning {
    fn evaluate(
        &mut self,
        _car: &str,
        _status: &CarStatusSnapshot,
        _all: &[(String, CarStatusSnapshot)],
    ) -> Vec<RepositionCommand> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "None"
    }
}

/// Forces a car back to its home floor with its main direction whenever it
/// goes idle somewhere else. One command per idle period.
#[derive(Debug, Default)]
pub struct ReturnToHome {
    sent: BTreeSet<String>,
}

impl RepositioningStrategy for ReturnToHome {
    fn evaluate(
        &mut self,
        car: &str,
        status: &CarStatusSnapshot,
        _all: &[(String, CarStatusSnapshot)],
    ) -> Vec<RepositionCommand> {
        if status.state != CarMotionState::Idle {
            self.sent.remove(car);
            return Vec::new();
        }
        if self.sent.contains(car) {
            return Vec::new();
        }
        self.sent.insert(car.to_string());
        if status.current_floor == status.home_floor {
            return Vec::new();
        }
        vec![RepositionCommand::ForcedMove {
            car: car.to_string(),
            floor: status.home_floor,
            direction: status.main_direction,
        }]
    }

    fn name(&self) -> &'static str {
        "ReturnToHome"
    }
}
