//! Car main loop: one iteration per CarStep event.
//!
//! At the head of each iteration the car is either at a floor boundary or
//! parked. The iteration runs the stop test (opening the door when it
//! holds), recomputes the direction, and either parks or commits to the next
//! destination and starts an interruptible move.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::warn;

use crate::bus::{Message, MessageBus};
use crate::call_system::CallSystem;
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{CarMotionState, Door, DoorPhase, Elevator, Passenger, StopDecision, StopWork};
use crate::physics::FlightTables;
use crate::queues::FloorQueues;
use crate::stats::SimStats;
use crate::systems::door_step::begin_stop;
use crate::systems::publish_status;

#[allow(clippy::type_complexity)]
pub fn car_step_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    queues: Res<FloorQueues>,
    call_system: Res<CallSystem>,
    tables: Res<FlightTables>,
    mut stats: ResMut<SimStats>,
    passengers: Query<&mut Passenger>,
    mut cars: Query<(Entity, &mut Elevator, &mut Door, &mut StopWork)>,
) {
    if event.0.kind != EventKind::CarStep {
        return;
    }
    let Some(EventSubject::Car(entity)) = event.0.subject else {
        return;
    };
    let Ok((car_entity, mut elevator, mut door, mut stop)) = cars.get_mut(entity) else {
        return;
    };

    // A door cycle owns the car until it completes.
    if stop.phase != DoorPhase::Idle {
        return;
    }
    // An untouched move is still in flight; this wake is stale.
    if elevator.current_destination.is_some()
        && matches!(elevator.state, CarMotionState::Moving | CarMotionState::Decelerating)
    {
        return;
    }

    match elevator.should_stop_here() {
        StopDecision::Stop => {
            begin_stop(
                car_entity, &mut elevator, &mut door, &mut stop, &queues, &call_system,
                &passengers, &mut bus, &mut clock,
            );
            return;
        }
        StopDecision::Bypass(direction) => {
            stats.full_load_bypasses += 1;
            bus.publish(
                &mut clock,
                "elevator/full_load_bypass",
                Message::FullLoadBypass {
                    elevator: elevator.name.clone(),
                    floor: elevator.current_floor,
                    direction,
                    passengers: elevator.onboard.len(),
                    capacity: elevator.max_capacity,
                },
            );
        }
        StopDecision::Pass => {}
    }

    let previous_direction = elevator.direction;
    let next_direction = elevator.decide_next_direction();
    if next_direction != elevator.direction {
        elevator.direction = next_direction;
        publish_status(&mut bus, &mut clock, &elevator);
    }

    if elevator.direction.is_none() {
        park(&mut elevator, &mut bus, &mut clock);
        return;
    }

    let Some(destination) = elevator.next_stop_floor() else {
        park(&mut elevator, &mut bus, &mut clock);
        return;
    };

    if destination == elevator.current_floor {
        if elevator.direction == previous_direction {
            // The remaining call at this floor is not serviceable; going
            // around again would spin forever.
            warn!(car = %elevator.name, floor = destination, "unserviceable call at current floor");
            stats.safety_violations += 1;
            park(&mut elevator, &mut bus, &mut clock);
        } else {
            // Direction flipped onto a call at this very floor: re-run the
            // stop test under the new direction.
            clock.schedule_in(0, EventKind::CarStep, Some(EventSubject::Car(car_entity)));
        }
        return;
    }

    // Commit to the move: one cruise slice per floor, keyed by the departure
    // floor of this trip.
    elevator.current_destination = Some(destination);
    elevator.trip_start = elevator.current_floor;
    elevator.motion_token += 1;
    if elevator.state != CarMotionState::Moving {
        elevator.state = CarMotionState::Moving;
        publish_status(&mut bus, &mut clock, &elevator);
    }
    let next_floor = if destination > elevator.current_floor {
        elevator.current_floor + 1
    } else {
        elevator.current_floor - 1
    };
    let cruise_ms = tables.cruise_ms(elevator.trip_start, next_floor);
    clock.schedule_in_with_token(
        cruise_ms,
        EventKind::CarSegment,
        Some(EventSubject::Car(car_entity)),
        elevator.motion_token,
    );
}

fn park(elevator: &mut Elevator, bus: &mut MessageBus, clock: &mut SimulationClock) {
    elevator.current_destination = None;
    if elevator.state != CarMotionState::Idle || elevator.direction.is_some() {
        elevator.direction = None;
        elevator.state = CarMotionState::Idle;
        publish_status(bus, clock, elevator);
    }
}
