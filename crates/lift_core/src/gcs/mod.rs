//! Group control: car registry, shadow status table, and the pluggable
//! allocation / repositioning strategies.

pub mod allocation;
pub mod earliest_arrival;
pub mod nearest_car;
pub mod predictor;
pub mod repositioning;

use std::collections::BTreeSet;

use bevy_ecs::prelude::{Entity, Resource};

use crate::calls::{Direction, Floor};
use crate::ecs::CarMotionState;

pub use allocation::{AllocationStrategy, DispatchContext};
pub use earliest_arrival::EarliestArrival;
pub use nearest_car::NearestCar;
pub use predictor::{ArrivalTimePredictor, StopPrediction};
pub use repositioning::{NoRepositioning, RepositionCommand, RepositioningStrategy, ReturnToHome};

/// Cars known to the installation, in registration order. Names are the wire
/// identity ("Elevator_1"...); entities address the ECS.
#[derive(Debug, Default, Resource)]
pub struct CarRegistry {
    cars: Vec<(Entity, String)>,
}

impl CarRegistry {
    pub fn register(&mut self, entity: Entity, name: String) {
        self.cars.push((entity, name));
    }

    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.cars
            .iter()
            .find(|(_, n)| n == name)
            .map(|(entity, _)| *entity)
    }

    pub fn name_of(&self, entity: Entity) -> Option<&str> {
        self.cars
            .iter()
            .find(|(e, _)| *e == entity)
            .map(|(_, name)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &str)> {
        self.cars.iter().map(|(e, n)| (*e, n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }

    /// First registered car: the dispatcher's fallback assignment.
    pub fn first_name(&self) -> Option<&str> {
        self.cars.first().map(|(_, name)| name.as_str())
    }
}

/// Last published status of one car, as the dispatcher sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CarStatusSnapshot {
    pub current_floor: Floor,
    pub advanced_position: Floor,
    pub state: CarMotionState,
    pub direction: Option<Direction>,
    pub passengers: usize,
    pub max_capacity: usize,
    pub car_calls: BTreeSet<Floor>,
    pub hall_calls_up: BTreeSet<Floor>,
    pub hall_calls_down: BTreeSet<Floor>,
    pub home_floor: Floor,
    pub main_direction: Direction,
}

impl CarStatusSnapshot {
    pub fn is_full(&self) -> bool {
        self.passengers >= self.max_capacity
    }

    pub fn assigned_call_count(&self) -> usize {
        self.car_calls.len() + self.hall_calls_up.len() + self.hall_calls_down.len()
    }
}

/// The dispatcher's own state: strategies plus the shadow table, kept in car
/// registration order so strategy tie-breaking follows it.
#[derive(Resource)]
pub struct GroupControl {
    pub allocation: Box<dyn AllocationStrategy>,
    pub repositioning: Box<dyn RepositioningStrategy>,
    statuses: Vec<(String, CarStatusSnapshot)>,
}

impl GroupControl {
    pub fn new(
        allocation: Box<dyn AllocationStrategy>,
        repositioning: Box<dyn RepositioningStrategy>,
    ) -> Self {
        Self {
            allocation,
            repositioning,
            statuses: Vec::new(),
        }
    }

    pub fn update_status(&mut self, car: &str, snapshot: CarStatusSnapshot) {
        match self.statuses.iter_mut().find(|(name, _)| name == car) {
            Some((_, existing)) => *existing = snapshot,
            None => self.statuses.push((car.to_string(), snapshot)),
        }
    }

    pub fn status_of(&self, car: &str) -> Option<&CarStatusSnapshot> {
        self.statuses
            .iter()
            .find(|(name, _)| name == car)
            .map(|(_, snapshot)| snapshot)
    }

    /// Shadow-table snapshot in registration order.
    pub fn statuses(&self) -> &[(String, CarStatusSnapshot)] {
        &self.statuses
    }
}

#[cfg(test)]
pub(crate) fn snapshot_at(floor: Floor) -> CarStatusSnapshot {
    CarStatusSnapshot {
        current_floor: floor,
        advanced_position: floor,
        state: CarMotionState::Idle,
        direction: None,
        passengers: 0,
        max_capacity: 10,
        car_calls: BTreeSet::new(),
        hall_calls_up: BTreeSet::new(),
        hall_calls_down: BTreeSet::new(),
        home_floor: 1,
        main_direction: Direction::Up,
    }
}

