//! Car-side listeners: the task topic (hall-call assignments, repositioning
//! commands) and the car-call topic.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::warn;

use crate::bus::{car_call_topic, car_task_topic, Message, MessageBus};
use crate::call_system::CallSystem;
use crate::calls::{Direction, Floor};
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{CarMotionState, Elevator};
use crate::stats::SimStats;
use crate::systems::publish_status;

/// CarTask: drain the task topic and register the commands on the car's call
/// sets. A call landing on the way interrupts the active move; a call landing
/// on an idle car wakes its main loop.
pub fn car_task_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    call_system: Res<CallSystem>,
    mut stats: ResMut<SimStats>,
    mut cars: Query<(Entity, &mut Elevator)>,
) {
    if event.0.kind != EventKind::CarTask {
        return;
    }
    let Some(EventSubject::Car(entity)) = event.0.subject else {
        return;
    };
    let Ok((car_entity, mut elevator)) = cars.get_mut(entity) else {
        return;
    };
    let topic = car_task_topic(&elevator.name);

    while let Some(message) = bus.try_receive(&topic) {
        match message {
            Message::AssignHallCall { floor, direction }
            | Message::ForcedMove { floor, direction } => {
                register_hall_call(
                    car_entity, &mut elevator, floor, direction, &call_system, &mut bus,
                    &mut clock, &mut stats,
                );
            }
            Message::MoveTo { floor } => {
                if !call_system_bounds_ok(&call_system, floor) || !elevator.serves(floor) {
                    warn!(car = %elevator.name, floor, "move command to an unserved floor dropped");
                    continue;
                }
                // A plain repositioning move behaves like a car call: stop at
                // the floor, no boarding direction presented.
                if floor != elevator.current_floor && elevator.car_calls.insert(floor) {
                    wake_car(car_entity, &mut elevator, &mut bus, &mut clock);
                }
            }
            other => {
                warn!(car = %elevator.name, ?other, "unknown message on task topic");
                stats.safety_violations += 1;
            }
        }
    }
}

fn call_system_bounds_ok(call_system: &CallSystem, floor: Floor) -> bool {
    floor >= 1 && floor <= call_system.num_floors()
}

#[allow(clippy::too_many_arguments)]
fn register_hall_call(
    car_entity: Entity,
    elevator: &mut Elevator,
    floor: Floor,
    direction: Direction,
    call_system: &CallSystem,
    bus: &mut MessageBus,
    clock: &mut SimulationClock,
    stats: &mut SimStats,
) {
    if !call_system_bounds_ok(call_system, floor) {
        warn!(car = %elevator.name, floor, "hall call outside the building dropped");
        stats.safety_violations += 1;
        return;
    }
    if !elevator.serves(floor) {
        warn!(car = %elevator.name, floor, "hall call for an unserved floor dropped");
        return;
    }
    elevator.hall_calls_mut(direction).insert(floor);

    if elevator.direction.is_none() {
        if let Some(new_direction) = elevator.direction_on_new_call() {
            elevator.direction = Some(new_direction);
            publish_status(bus, clock, elevator);
        }
    }

    if elevator.should_interrupt(floor, direction) {
        // Cancel the in-flight move; the main loop re-plans immediately.
        elevator.motion_token += 1;
        elevator.current_destination = None;
        clock.schedule_in(0, EventKind::CarStep, Some(EventSubject::Car(car_entity)));
    } else {
        wake_car(car_entity, elevator, bus, clock);
    }
}

/// Wake an idle car's main loop; cars that are moving or mid-stop pick the
/// call up at their next iteration.
fn wake_car(
    car_entity: Entity,
    elevator: &mut Elevator,
    bus: &mut MessageBus,
    clock: &mut SimulationClock,
) {
    if elevator.state == CarMotionState::Idle {
        if elevator.direction.is_none() {
            if let Some(new_direction) = elevator.direction_on_new_call() {
                elevator.direction = Some(new_direction);
                publish_status(bus, clock, elevator);
            }
        }
        clock.schedule_in(0, EventKind::CarStep, Some(EventSubject::Car(car_entity)));
    }
}

/// CarCallDelivery: drain the car-call topic. Duplicate destinations are
/// dropped without a record, the way a lit button absorbs another press.
pub fn car_call_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    mut stats: ResMut<SimStats>,
    mut cars: Query<(Entity, &mut Elevator)>,
) {
    if event.0.kind != EventKind::CarCallDelivery {
        return;
    }
    let Some(EventSubject::Car(entity)) = event.0.subject else {
        return;
    };
    let Ok((car_entity, mut elevator)) = cars.get_mut(entity) else {
        return;
    };
    let topic = car_call_topic(&elevator.name);

    while let Some(message) = bus.try_receive(&topic) {
        let Message::CarCallPress { destination, passenger, auto_registered } = message else {
            warn!(car = %elevator.name, "unknown message on car-call topic");
            stats.safety_violations += 1;
            continue;
        };
        // Never register the floor the car currently serves.
        if destination == elevator.current_floor {
            continue;
        }
        if !elevator.car_calls.insert(destination) {
            // Button already lit.
            continue;
        }
        bus.publish(
            &mut clock,
            &format!("elevator/{}/car_call_registered", elevator.name),
            Message::CarCallRegistered {
                elevator: elevator.name.clone(),
                destination,
                passenger,
                auto_registered,
            },
        );
        wake_car(car_entity, &mut elevator, &mut bus, &mut clock);
    }
}
