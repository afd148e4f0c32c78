//! Interruptible motion: cruise segment boundaries and the final brake.
//!
//! Motion events carry the car's motion token; an interrupt bumps the token
//! so in-flight timers die silently and the main loop re-plans. Safety
//! invariants are enforced at every segment boundary: the floor number never
//! moves against the held direction.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::error;

use crate::calls::Direction;
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::bus::MessageBus;
use crate::ecs::{CarMotionState, Elevator};
use crate::physics::FlightTables;
use crate::stats::SimStats;
use crate::systems::publish_status;

/// CarSegment: the car finished one cruise slice and is passing a floor.
pub fn car_segment_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    tables: Res<FlightTables>,
    mut stats: ResMut<SimStats>,
    mut cars: Query<(Entity, &mut Elevator)>,
) {
    if event.0.kind != EventKind::CarSegment {
        return;
    }
    let Some(EventSubject::Car(entity)) = event.0.subject else {
        return;
    };
    let Ok((car_entity, mut elevator)) = cars.get_mut(entity) else {
        return;
    };
    if event.0.token != elevator.motion_token || elevator.state != CarMotionState::Moving {
        return;
    }
    let Some(destination) = elevator.current_destination else {
        return;
    };

    let old_floor = elevator.current_floor;
    let next_floor = if destination > old_floor {
        old_floor + 1
    } else {
        old_floor - 1
    };
    elevator.current_floor = next_floor;
    elevator.advanced_position = next_floor;

    // Reverse-movement guard.
    let violated = match elevator.direction {
        Some(Direction::Up) => next_floor < old_floor,
        Some(Direction::Down) => next_floor > old_floor,
        None => false,
    };
    if violated {
        error!(
            car = %elevator.name,
            from = old_floor,
            to = next_floor,
            "reverse movement detected, aborting move"
        );
        stats.safety_violations += 1;
        abort_move(car_entity, &mut elevator, &mut clock);
        return;
    }

    publish_status(&mut bus, &mut clock, &elevator);

    if next_floor == destination {
        // Final brake: the direction is re-evaluated exactly once here; an
        // inversion of the committed direction aborts the move.
        elevator.state = CarMotionState::Decelerating;
        publish_status(&mut bus, &mut clock, &elevator);

        let committed = Direction::between(elevator.trip_start, destination);
        let decided = elevator.decide_next_direction();
        if decided != elevator.direction {
            elevator.direction = decided;
            publish_status(&mut bus, &mut clock, &elevator);
        }
        if let (Some(committed), Some(decided)) = (committed, elevator.direction) {
            if decided == committed.opposite() {
                abort_move(car_entity, &mut elevator, &mut clock);
                return;
            }
        }

        let brake_ms = tables.brake_ms(elevator.trip_start, destination);
        clock.schedule_in_with_token(
            brake_ms,
            EventKind::CarArrive,
            Some(EventSubject::Car(car_entity)),
            elevator.motion_token,
        );
    } else {
        let upcoming = if destination > next_floor {
            next_floor + 1
        } else {
            next_floor - 1
        };
        let cruise_ms = tables.cruise_ms(elevator.trip_start, upcoming);
        clock.schedule_in_with_token(
            cruise_ms,
            EventKind::CarSegment,
            Some(EventSubject::Car(car_entity)),
            elevator.motion_token,
        );
    }
}

/// CarArrive: the brake ran out; the car is level with its destination. The
/// main loop takes over (stop test, next plan) at the same timestamp.
pub fn car_arrive_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut cars: Query<(Entity, &mut Elevator)>,
) {
    if event.0.kind != EventKind::CarArrive {
        return;
    }
    let Some(EventSubject::Car(entity)) = event.0.subject else {
        return;
    };
    let Ok((car_entity, mut elevator)) = cars.get_mut(entity) else {
        return;
    };
    if event.0.token != elevator.motion_token || elevator.state != CarMotionState::Decelerating {
        return;
    }
    elevator.current_destination = None;
    clock.schedule_in(0, EventKind::CarStep, Some(EventSubject::Car(car_entity)));
}

/// A clean abort: no arrival is emitted, the outer loop re-plans.
fn abort_move(car_entity: Entity, elevator: &mut Elevator, clock: &mut SimulationClock) {
    elevator.motion_token += 1;
    elevator.current_destination = None;
    clock.schedule_in(0, EventKind::CarStep, Some(EventSubject::Car(car_entity)));
}
