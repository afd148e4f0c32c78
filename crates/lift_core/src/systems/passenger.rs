//! Passenger journey systems: hall-side workflow dispatch.
//!
//! Each journey runs the workflow its origin floor's call type demands:
//! traditional floors press a direction button and join the direction queue,
//! DCS floors register the destination with the dispatcher and join the
//! assigned car's queue. Boarding and alighting are driven by the door
//! (see `door_step`); this module owns everything that happens in the hall.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::warn;

use crate::bus::{Message, MessageBus, GCS_HALL_CALL};
use crate::buttons::{HallButtons, PressResult};
use crate::call_system::CallSystem;
use crate::calls::{CallType, Direction};
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{Door, DoorState, Elevator, Passenger, PassengerPhase, StopWork};
use crate::gcs::CarRegistry;
use crate::queues::{FloorQueues, QueueKey};
use crate::stats::SimStats;
use crate::systems::door_step::try_reopen;

const LEFT_BEHIND: &str = "LEFT_BEHIND";

/// PassengerStep: begin the current journey, continue a multi-stop itinerary,
/// or re-register after being left behind at a DCS floor.
#[allow(clippy::too_many_arguments, clippy::type_complexity)]
pub fn passenger_step_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    mut queues: ResMut<FloorQueues>,
    mut buttons: ResMut<HallButtons>,
    call_system: Res<CallSystem>,
    mut stats: ResMut<SimStats>,
    mut passengers: Query<&mut Passenger>,
    mut cars: Query<(Entity, &Elevator, &mut Door, &mut StopWork)>,
) {
    if event.0.kind != EventKind::PassengerStep {
        return;
    }
    let Some(EventSubject::Passenger(entity)) = event.0.subject else {
        return;
    };
    let Ok(mut passenger) = passengers.get_mut(entity) else {
        return;
    };

    match passenger.phase {
        PassengerPhase::Pending => {}
        PassengerPhase::BetweenJourneys => {
            passenger.journey_idx += 1;
            passenger.reset_journey_metrics();
            passenger.phase = PassengerPhase::Pending;
        }
        PassengerPhase::ReRegistering => {
            re_register(&mut clock, &mut bus, &mut passenger);
            return;
        }
        _ => return,
    }

    // Skip degenerate journeys outright.
    while passenger.current_journey().from == passenger.current_journey().to {
        if passenger.journey_idx + 1 >= passenger.journeys.len() {
            passenger.phase = PassengerPhase::Done;
            return;
        }
        passenger.journey_idx += 1;
    }

    let journey = passenger.current_journey();
    let now = clock.now();
    passenger.waiting_start_ms = Some(now);

    match call_system.floor_call_type(journey.from) {
        CallType::Traditional => {
            let Some(direction) = Direction::between(journey.from, journey.to) else {
                return;
            };
            bus.publish(
                &mut clock,
                "passenger/waiting",
                Message::PassengerWaiting {
                    passenger: passenger.name.clone(),
                    floor: journey.from,
                    direction: Some(direction),
                    destination: None,
                },
            );
            match buttons.press(journey.from, direction) {
                PressResult::NewlyLit => {
                    bus.publish(
                        &mut clock,
                        &format!("hall_button/floor_{}/new_hall_call", journey.from),
                        Message::HallCallRegistered {
                            floor: journey.from,
                            direction: Some(direction),
                            destination: None,
                            passenger: passenger.name.clone(),
                            reason: None,
                        },
                    );
                    bus.publish(
                        &mut clock,
                        GCS_HALL_CALL,
                        Message::HallCall {
                            floor: journey.from,
                            direction: Some(direction),
                            destination: None,
                            passenger: passenger.name.clone(),
                            call_type: CallType::Traditional,
                            reason: None,
                        },
                    );
                }
                PressResult::AlreadyLit => {}
                PressResult::NoButton => {
                    warn!(
                        passenger = %passenger.name,
                        floor = journey.from,
                        direction = direction.label(),
                        "direction call rejected: no button at this floor"
                    );
                    passenger.phase = PassengerPhase::Done;
                    return;
                }
            }
            let key = QueueKey::Direction(direction);
            if let Err(error) = queues.push_back(journey.from, key, entity) {
                warn!(%error, "failed to enqueue passenger");
                stats.safety_violations += 1;
                return;
            }
            passenger.phase = PassengerPhase::Waiting;

            // A boarder showing up while the door is already closing on this
            // queue asks for a reopen.
            for (car_entity, elevator, mut door, mut stop) in cars.iter_mut() {
                if elevator.current_floor == journey.from && door.state == DoorState::Closing {
                    if try_reopen(
                        car_entity, elevator, &mut door, &mut stop, key, &mut bus, &mut clock,
                        &mut stats,
                    ) {
                        break;
                    }
                }
            }
        }
        CallType::Dcs => {
            bus.publish(
                &mut clock,
                "passenger/waiting",
                Message::PassengerWaiting {
                    passenger: passenger.name.clone(),
                    floor: journey.from,
                    direction: None,
                    destination: Some(journey.to),
                },
            );
            bus.publish(
                &mut clock,
                &format!("dcs_panel/floor_{}/registered", journey.from),
                Message::HallCallRegistered {
                    floor: journey.from,
                    direction: None,
                    destination: Some(journey.to),
                    passenger: passenger.name.clone(),
                    reason: None,
                },
            );
            bus.publish(
                &mut clock,
                GCS_HALL_CALL,
                Message::HallCall {
                    floor: journey.from,
                    direction: None,
                    destination: Some(journey.to),
                    passenger: passenger.name.clone(),
                    call_type: CallType::Dcs,
                    reason: None,
                },
            );
            passenger.phase = PassengerPhase::AwaitingAssignment;
        }
    }
}

/// Left-behind DCS passengers go back to the panel: same message shape with a
/// reason, then wait for a fresh assignment.
fn re_register(clock: &mut SimulationClock, bus: &mut MessageBus, passenger: &mut Passenger) {
    let journey = passenger.current_journey();
    bus.publish(
        clock,
        &format!("dcs_panel/floor_{}/registered", journey.from),
        Message::HallCallRegistered {
            floor: journey.from,
            direction: None,
            destination: Some(journey.to),
            passenger: passenger.name.clone(),
            reason: Some(LEFT_BEHIND.to_string()),
        },
    );
    bus.publish(
        clock,
        GCS_HALL_CALL,
        Message::HallCall {
            floor: journey.from,
            direction: None,
            destination: Some(journey.to),
            passenger: passenger.name.clone(),
            call_type: CallType::Dcs,
            reason: Some(LEFT_BEHIND.to_string()),
        },
    );
    passenger.phase = PassengerPhase::AwaitingAssignment;
}

/// AssignmentDelivered: read the assignment from the passenger's own topic
/// and join (or move to) the assigned car's queue.
#[allow(clippy::too_many_arguments, clippy::type_complexity)]
pub fn assignment_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    mut queues: ResMut<FloorQueues>,
    registry: Res<CarRegistry>,
    mut stats: ResMut<SimStats>,
    mut passengers: Query<&mut Passenger>,
    mut cars: Query<(Entity, &Elevator, &mut Door, &mut StopWork)>,
) {
    if event.0.kind != EventKind::AssignmentDelivered {
        return;
    }
    let Some(EventSubject::Passenger(entity)) = event.0.subject else {
        return;
    };
    let Ok(mut passenger) = passengers.get_mut(entity) else {
        return;
    };
    let topic = crate::bus::assignment_topic(&passenger.name);

    while let Some(message) = bus.try_receive(&topic) {
        let Message::Assignment { floor, assigned_elevator, .. } = message else {
            warn!(passenger = %passenger.name, "unexpected message on assignment topic");
            stats.safety_violations += 1;
            continue;
        };
        if passenger.phase != PassengerPhase::AwaitingAssignment {
            continue;
        }
        let Some(car_entity) = registry.entity_by_name(&assigned_elevator) else {
            warn!(%assigned_elevator, "assignment names an unknown car");
            stats.safety_violations += 1;
            continue;
        };

        let key = QueueKey::Car(car_entity);
        let result = match queues.position_of(floor, entity) {
            Some(previous) if previous == key => Ok(()),
            Some(previous) => queues.move_passenger(entity, floor, previous, key),
            None => queues.push_back(floor, key, entity),
        };
        if let Err(error) = result {
            warn!(%error, "assignment queue update failed");
            stats.safety_violations += 1;
            continue;
        }
        passenger.assigned_car = Some(car_entity);
        passenger.phase = PassengerPhase::Waiting;

        if let Ok((car_entity, elevator, mut door, mut stop)) = cars.get_mut(car_entity) {
            if elevator.current_floor == floor && door.state == DoorState::Closing {
                try_reopen(
                    car_entity, elevator, &mut door, &mut stop, key, &mut bus, &mut clock,
                    &mut stats,
                );
            }
        }
    }
}
