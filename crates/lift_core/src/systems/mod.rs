//! ECS systems: event-driven logic that reacts to simulation events.
//!
//! Systems query and mutate the world based on the `CurrentEvent` resource,
//! which the runner inserts before each schedule execution. Each event kind
//! has exactly one handling system, so per-event execution is deterministic.

pub mod car_motion;
pub mod car_step;
pub mod car_task;
pub mod door_step;
pub mod gcs;
pub mod passenger;
pub mod spawner;

use crate::bus::{car_status_topic, MessageBus, Message};
use crate::calls::heading_label;
use crate::clock::SimulationClock;
use crate::ecs::Elevator;

/// Publish a car's status update; doubles as the `elevator_status` log record
/// and feeds the dispatcher's shadow table.
pub(crate) fn publish_status(bus: &mut MessageBus, clock: &mut SimulationClock, car: &Elevator) {
    let message = Message::CarStatus {
        elevator: car.name.clone(),
        current_floor: car.current_floor,
        advanced_position: car.advanced_position,
        state: car.state.label(),
        direction: heading_label(car.direction),
        passengers: car.onboard.len(),
        max_capacity: car.max_capacity,
        car_calls: car.car_calls.iter().copied().collect(),
        hall_calls_up: car.hall_calls_up.iter().copied().collect(),
        hall_calls_down: car.hall_calls_down.iter().copied().collect(),
        home_floor: car.home_floor,
        main_direction: car.main_direction,
    };
    bus.publish(clock, &car_status_topic(&car.name), message);
}
