//! Door protocol: the boarding/alighting cycle at a stop.
//!
//! `begin_stop` snapshots the waiting queues and opens the door; the phase
//! machine then lets passengers out in reverse boarding order, drains the
//! presented queues one boarder at a time (photocell grace when a queue looks
//! empty, boarding-failed signals on capacity refusal, DCS auto-registration
//! per boarder), and closes with a bounded reopen budget. The close
//! completion clears the served calls and hands control back to the car loop.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::warn;

use crate::bus::{car_call_topic, DoorEventKind, Message, MessageBus};
use crate::buttons::HallButtons;
use crate::call_system::CallSystem;
use crate::calls::{Direction, Floor};
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{
    CarMotionState, Door, DoorPhase, DoorState, Elevator, Passenger, PassengerPhase, StopWork,
};
use crate::queues::{FloorQueues, QueueKey};
use crate::stats::{JourneyRecord, SimStats};
use crate::systems::publish_status;

fn door_topic(car: &str) -> String {
    format!("elevator/{car}/door_events")
}

fn publish_door_event(
    bus: &mut MessageBus,
    clock: &mut SimulationClock,
    car: &str,
    event_type: DoorEventKind,
    floor: Floor,
    waiting_passengers: Option<Vec<String>>,
    reopen_limit_reached: Option<bool>,
) {
    bus.publish(
        clock,
        &door_topic(car),
        Message::DoorEvent {
            elevator: car.to_string(),
            event_type,
            floor,
            waiting_passengers,
            reopen_limit_reached,
        },
    );
}

/// Start the door cycle for a stop at the car's current floor. Called by the
/// car's main loop when the stop test holds.
#[allow(clippy::too_many_arguments)]
pub(crate) fn begin_stop(
    car_entity: Entity,
    elevator: &mut Elevator,
    door: &mut Door,
    stop: &mut StopWork,
    queues: &FloorQueues,
    call_system: &CallSystem,
    passengers: &Query<&mut Passenger>,
    bus: &mut MessageBus,
    clock: &mut SimulationClock,
) {
    let floor = elevator.current_floor;
    elevator.state = CarMotionState::Stopping;
    publish_status(bus, clock, elevator);

    // Which side of the landing this stop serves.
    let mut served_up = false;
    let mut served_down = false;
    match elevator.direction {
        Some(Direction::Up) => {
            if elevator.hall_calls_up.contains(&floor) {
                served_up = true;
            } else if elevator.hall_calls_down.contains(&floor) && !elevator.has_calls_above() {
                served_down = true;
            }
        }
        Some(Direction::Down) => {
            if elevator.hall_calls_down.contains(&floor) {
                served_down = true;
            } else if elevator.hall_calls_up.contains(&floor) && !elevator.has_calls_below() {
                served_up = true;
            }
        }
        None => {
            let up_here = elevator.hall_calls_up.contains(&floor);
            let down_here = elevator.hall_calls_down.contains(&floor);
            if elevator.has_calls_above() && up_here {
                served_up = true;
            } else if elevator.has_calls_below() && down_here {
                served_down = true;
            } else if up_here {
                served_up = true;
            } else if down_here {
                served_down = true;
            }
        }
    }

    let is_dcs_floor = call_system.is_dcs_floor(floor);
    let queue_keys: Vec<QueueKey> = if is_dcs_floor {
        if served_up || served_down {
            vec![QueueKey::Car(car_entity)]
        } else {
            Vec::new()
        }
    } else {
        let mut keys = Vec::new();
        if served_up {
            keys.push(QueueKey::Direction(Direction::Up));
        }
        if served_down {
            keys.push(QueueKey::Direction(Direction::Down));
        }
        keys
    };

    // Snapshot before the door opens: the waiting list carried on the
    // opening record.
    let snapshot: Vec<Entity> = queue_keys
        .iter()
        .flat_map(|&key| queues.members(floor, key))
        .collect();
    let waiting_names: Vec<String> = snapshot
        .iter()
        .filter_map(|&p| passengers.get(p).ok().map(|p| p.name.clone()))
        .collect();

    // Exits in reverse boarding order.
    let exits: Vec<Entity> = elevator
        .onboard
        .iter()
        .copied()
        .filter(|&p| {
            passengers
                .get(p)
                .map(|p| p.destination() == floor)
                .unwrap_or(false)
        })
        .rev()
        .collect();

    let has_car_call_here = elevator.car_calls.contains(&floor);

    door.reset_for_stop();
    door.state = DoorState::Opening;
    *stop = StopWork {
        phase: DoorPhase::Opening,
        floor,
        exits,
        queues: queue_keys,
        queue_idx: 0,
        snapshot,
        boarded: Vec::new(),
        failed: Vec::new(),
        served_up,
        served_down,
        has_car_call_here,
        is_dcs_floor,
        door_opened_at_ms: clock.now(),
        reopen_denied: false,
    };

    publish_door_event(
        bus,
        clock,
        &elevator.name,
        DoorEventKind::OpeningStart,
        floor,
        Some(waiting_names),
        None,
    );
    // The car-call light goes out at door-open, not at arrival.
    if has_car_call_here {
        bus.publish(
            clock,
            &format!("elevator/{}/car_call_off", elevator.name),
            Message::CarCallOff {
                elevator: elevator.name.clone(),
                floor,
            },
        );
    }
    clock.schedule_in(
        door.open_time_ms,
        EventKind::DoorStep,
        Some(EventSubject::Car(car_entity)),
    );
}

/// Reopen request on behalf of a passenger that reached a presented queue
/// while the door was closing. Returns whether the reopen was granted.
#[allow(clippy::too_many_arguments)]
pub(crate) fn try_reopen(
    car_entity: Entity,
    elevator: &Elevator,
    door: &mut Door,
    stop: &mut StopWork,
    key: QueueKey,
    bus: &mut MessageBus,
    clock: &mut SimulationClock,
    stats: &mut SimStats,
) -> bool {
    if door.state != DoorState::Closing || stop.phase != DoorPhase::Closing {
        return false;
    }
    if !stop.queues.contains(&key) {
        return false;
    }
    if !door.request_reopen() {
        stop.reopen_denied = true;
        stats.reopen_denials += 1;
        return false;
    }
    // Interrupt the close timer and run an opening cycle.
    door.close_token += 1;
    door.state = DoorState::Opening;
    stop.phase = DoorPhase::Reopening;
    publish_door_event(
        bus,
        clock,
        &elevator.name,
        DoorEventKind::Reopening,
        stop.floor,
        None,
        None,
    );
    clock.schedule_in(
        door.open_time_ms,
        EventKind::DoorStep,
        Some(EventSubject::Car(car_entity)),
    );
    true
}

/// DoorStep: advance the door phase machine.
#[allow(clippy::type_complexity)]
pub fn door_step_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    mut queues: ResMut<FloorQueues>,
    mut stats: ResMut<SimStats>,
    mut passengers: Query<&mut Passenger>,
    mut cars: Query<(Entity, &mut Elevator, &mut Door, &mut StopWork)>,
) {
    if event.0.kind != EventKind::DoorStep {
        return;
    }
    let Some(EventSubject::Car(entity)) = event.0.subject else {
        return;
    };
    let Ok((car_entity, mut elevator, mut door, mut stop)) = cars.get_mut(entity) else {
        return;
    };

    match stop.phase {
        DoorPhase::Opening => {
            door.state = DoorState::Open;
            publish_door_event(
                &mut bus,
                &mut clock,
                &elevator.name,
                DoorEventKind::OpeningComplete,
                stop.floor,
                None,
                None,
            );
            stop.phase = DoorPhase::Exiting;
            continue_exits(&mut stop, &mut passengers, &mut clock);
            if stop.phase == DoorPhase::Boarding {
                continue_boarding(
                    car_entity, &mut elevator, &mut door, &mut stop, &mut queues,
                    &mut passengers, &mut bus, &mut clock, &mut stats,
                );
            }
        }
        DoorPhase::Reopening => {
            door.state = DoorState::Open;
            publish_door_event(
                &mut bus,
                &mut clock,
                &elevator.name,
                DoorEventKind::ReopenComplete,
                stop.floor,
                None,
                None,
            );
            // Resume boarding from the first presented queue.
            stop.queue_idx = 0;
            stop.phase = DoorPhase::Boarding;
            continue_boarding(
                car_entity, &mut elevator, &mut door, &mut stop, &mut queues,
                &mut passengers, &mut bus, &mut clock, &mut stats,
            );
        }
        DoorPhase::Exiting => {
            continue_exits(&mut stop, &mut passengers, &mut clock);
            if stop.phase == DoorPhase::Boarding {
                continue_boarding(
                    car_entity, &mut elevator, &mut door, &mut stop, &mut queues,
                    &mut passengers, &mut bus, &mut clock, &mut stats,
                );
            }
        }
        DoorPhase::Boarding => {
            continue_boarding(
                car_entity, &mut elevator, &mut door, &mut stop, &mut queues,
                &mut passengers, &mut bus, &mut clock, &mut stats,
            );
        }
        DoorPhase::Photocell => {
            // Grace period over: anyone new in the queue keeps boarding,
            // otherwise move on to the next queue.
            let key = stop.queues[stop.queue_idx];
            if queues.is_empty(stop.floor, key) {
                stop.queue_idx += 1;
            }
            stop.phase = DoorPhase::Boarding;
            continue_boarding(
                car_entity, &mut elevator, &mut door, &mut stop, &mut queues,
                &mut passengers, &mut bus, &mut clock, &mut stats,
            );
        }
        DoorPhase::AwaitBoarder | DoorPhase::Closing | DoorPhase::Idle => {}
    }
}

/// Grant the next exit permission, or hand over to boarding.
fn continue_exits(
    stop: &mut StopWork,
    passengers: &mut Query<&mut Passenger>,
    clock: &mut SimulationClock,
) {
    while !stop.exits.is_empty() {
        let exit = stop.exits.remove(0);
        let Ok(mut passenger) = passengers.get_mut(exit) else {
            continue;
        };
        passenger.phase = PassengerPhase::Alighting;
        let move_ms = passenger.move_speed_ms;
        clock.schedule_in(
            move_ms,
            EventKind::AlightComplete,
            Some(EventSubject::Passenger(exit)),
        );
        return;
    }
    stop.phase = DoorPhase::Boarding;
    stop.queue_idx = 0;
}

/// Drain the presented queues one boarder at a time.
#[allow(clippy::too_many_arguments)]
fn continue_boarding(
    car_entity: Entity,
    elevator: &mut Elevator,
    door: &mut Door,
    stop: &mut StopWork,
    queues: &mut FloorQueues,
    passengers: &mut Query<&mut Passenger>,
    bus: &mut MessageBus,
    clock: &mut SimulationClock,
    stats: &mut SimStats,
) {
    loop {
        if stop.queue_idx >= stop.queues.len() {
            start_closing(car_entity, elevator, door, stop, bus, clock);
            return;
        }
        let key = stop.queues[stop.queue_idx];

        if queues.is_empty(stop.floor, key) {
            // Photocell: wait a moment for further boarders.
            stop.phase = DoorPhase::Photocell;
            clock.schedule_in(
                door.sensor_timeout_ms,
                EventKind::DoorStep,
                Some(EventSubject::Car(car_entity)),
            );
            return;
        }

        if elevator.onboard.len() >= elevator.max_capacity {
            // Capacity refusal: everyone left in this queue gets exactly one
            // boarding-failed signal; the hall call stays for a later car.
            fail_queue_members(stop, queues, passengers, clock, stats, key);
            stop.queue_idx += 1;
            continue;
        }

        let Some(head) = queues.pop_front(stop.floor, key) else {
            continue;
        };
        let Ok(mut passenger) = passengers.get_mut(head) else {
            continue;
        };
        passenger.phase = PassengerPhase::Boarding;
        passenger.boarded_car = Some(car_entity);
        passenger.door_open_ms = Some(stop.door_opened_at_ms);
        let wait_time = passenger.wait_to_door_open_secs();
        bus.publish(
            clock,
            "passenger/boarding",
            Message::PassengerBoarding {
                passenger: passenger.name.clone(),
                floor: stop.floor,
                elevator: elevator.name.clone(),
                destination: passenger.destination(),
                wait_time,
            },
        );
        let move_ms = passenger.move_speed_ms;
        clock.schedule_in(
            move_ms,
            EventKind::BoardComplete,
            Some(EventSubject::Passenger(head)),
        );
        stop.phase = DoorPhase::AwaitBoarder;
        return;
    }
}

/// Boarding-failed to every passenger still in the queue, once per stop.
fn fail_queue_members(
    stop: &mut StopWork,
    queues: &FloorQueues,
    passengers: &mut Query<&mut Passenger>,
    clock: &mut SimulationClock,
    stats: &mut SimStats,
    key: QueueKey,
) {
    for member in queues.members(stop.floor, key) {
        if stop.failed.contains(&member) {
            continue;
        }
        stop.failed.push(member);
        stats.boarding_failures += 1;
        let Ok(mut passenger) = passengers.get_mut(member) else {
            continue;
        };
        if passenger.assigned_car.is_some() {
            // DCS: left-behind passengers must re-register at the panel.
            passenger.phase = PassengerPhase::ReRegistering;
            clock.schedule_in(0, EventKind::PassengerStep, Some(EventSubject::Passenger(member)));
        }
        // Traditional passengers stay in the queue and keep waiting.
    }
}

fn start_closing(
    car_entity: Entity,
    elevator: &Elevator,
    door: &mut Door,
    stop: &mut StopWork,
    bus: &mut MessageBus,
    clock: &mut SimulationClock,
) {
    door.state = DoorState::Closing;
    stop.phase = DoorPhase::Closing;
    publish_door_event(
        bus,
        clock,
        &elevator.name,
        DoorEventKind::ClosingStart,
        stop.floor,
        None,
        None,
    );
    door.close_token += 1;
    clock.schedule_in_with_token(
        door.close_time_ms,
        EventKind::DoorCloseDone,
        Some(EventSubject::Car(car_entity)),
        door.close_token,
    );
}

/// DoorCloseDone: the close timer ran out (a stale token means a reopen beat
/// it). Completes the stop: served calls are cleared only when someone
/// actually boarded or nobody is left waiting.
#[allow(clippy::type_complexity)]
pub fn door_close_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    mut queues: ResMut<FloorQueues>,
    mut buttons: ResMut<HallButtons>,
    mut stats: ResMut<SimStats>,
    mut passengers: Query<&mut Passenger>,
    mut cars: Query<(Entity, &mut Elevator, &mut Door, &mut StopWork)>,
) {
    if event.0.kind != EventKind::DoorCloseDone {
        return;
    }
    let Some(EventSubject::Car(entity)) = event.0.subject else {
        return;
    };
    let Ok((car_entity, mut elevator, mut door, mut stop)) = cars.get_mut(entity) else {
        return;
    };
    if event.0.token != door.close_token || stop.phase != DoorPhase::Closing {
        return;
    }

    door.state = DoorState::Closed;

    // A denied reopen converts into boarding-failed for everyone still in a
    // presented queue: this door will not open again at this stop.
    if stop.reopen_denied {
        for idx in 0..stop.queues.len() {
            let key = stop.queues[idx];
            fail_queue_members(&mut stop, &queues, &mut passengers, &mut clock, &mut stats, key);
        }
    }

    publish_door_event(
        &mut bus,
        &mut clock,
        &elevator.name,
        DoorEventKind::ClosingComplete,
        stop.floor,
        None,
        Some(stop.reopen_denied),
    );

    // Serve the floor's calls.
    let floor = stop.floor;
    elevator.car_calls.remove(&floor);
    let boarded_any = !stop.boarded.is_empty();
    for (direction, served) in [
        (Direction::Up, stop.served_up),
        (Direction::Down, stop.served_down),
    ] {
        if !served {
            continue;
        }
        let key = if stop.is_dcs_floor {
            QueueKey::Car(car_entity)
        } else {
            QueueKey::Direction(direction)
        };
        // A hall call survives the stop only while refused passengers are
        // still waiting in its queue.
        if !boarded_any && !queues.is_empty(floor, key) {
            continue;
        }
        if elevator.hall_calls_mut(direction).remove(&floor) {
            buttons.serve(floor, direction);
            bus.publish(
                &mut clock,
                &format!("hall_button/floor_{floor}/call_off"),
                Message::HallCallOff {
                    floor,
                    direction,
                    serviced_by: elevator.name.clone(),
                },
            );
        }

        // Refused traditional passengers are still at the landing; the head
        // of the queue presses the freshly cleared button again.
        if !stop.is_dcs_floor {
            if let Some(head) = queues.head(floor, key) {
                if let Ok(passenger) = passengers.get(head) {
                    if buttons.press(floor, direction) == crate::buttons::PressResult::NewlyLit {
                        bus.publish(
                            &mut clock,
                            &format!("hall_button/floor_{floor}/new_hall_call"),
                            Message::HallCallRegistered {
                                floor,
                                direction: Some(direction),
                                destination: None,
                                passenger: passenger.name.clone(),
                                reason: None,
                            },
                        );
                        bus.publish(
                            &mut clock,
                            crate::bus::GCS_HALL_CALL,
                            Message::HallCall {
                                floor,
                                direction: Some(direction),
                                destination: None,
                                passenger: passenger.name.clone(),
                                call_type: crate::calls::CallType::Traditional,
                                reason: None,
                            },
                        );
                    }
                }
            }
        }
    }

    stop.phase = DoorPhase::Idle;
    stop.exits.clear();
    stop.snapshot.clear();
    stop.boarded.clear();
    stop.failed.clear();

    publish_status(&mut bus, &mut clock, &elevator);
    clock.schedule_in(0, EventKind::CarStep, Some(EventSubject::Car(car_entity)));
}

/// BoardComplete: the granted boarder finished stepping in. Registers their
/// car call (pressed on traditional floors, sensed on DCS floors) and
/// resumes the boarding loop.
#[allow(clippy::type_complexity)]
pub fn board_complete_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    call_system: Res<CallSystem>,
    mut passengers: Query<&mut Passenger>,
    mut cars: Query<(Entity, &mut Elevator, &mut Door, &mut StopWork)>,
) {
    if event.0.kind != EventKind::BoardComplete {
        return;
    }
    let Some(EventSubject::Passenger(p_entity)) = event.0.subject else {
        return;
    };

    let (p_name, p_destination, boarded_car) = {
        let Ok(mut passenger) = passengers.get_mut(p_entity) else {
            return;
        };
        if passenger.phase != PassengerPhase::Boarding {
            return;
        }
        passenger.boarding_ms = Some(clock.now());
        passenger.phase = PassengerPhase::Riding;
        (passenger.name.clone(), passenger.destination(), passenger.boarded_car)
    };
    let Some(car) = boarded_car else {
        return;
    };
    let Ok((car_entity, mut elevator, _door, mut stop)) = cars.get_mut(car) else {
        return;
    };

    elevator.onboard.push(p_entity);
    stop.boarded.push(p_entity);

    if !stop.is_dcs_floor && call_system.has_car_buttons() && p_destination != stop.floor {
        bus.publish(
            &mut clock,
            &car_call_topic(&elevator.name),
            Message::CarCallPress {
                destination: p_destination,
                passenger: p_name.clone(),
                auto_registered: false,
            },
        );
    }

    // DCS: the photocell sensing each boarder registers that boarder's
    // destination. Only passengers who actually step in get a car call, so a
    // left-behind registration never produces a phantom stop; duplicate
    // destinations are absorbed by the car-call listener.
    if stop.is_dcs_floor && p_destination != stop.floor {
        bus.publish(
            &mut clock,
            &car_call_topic(&elevator.name),
            Message::CarCallPress {
                destination: p_destination,
                passenger: p_name,
                auto_registered: true,
            },
        );
    }

    publish_status(&mut bus, &mut clock, &elevator);
    stop.phase = DoorPhase::Boarding;
    clock.schedule_in(0, EventKind::DoorStep, Some(EventSubject::Car(car_entity)));
}

/// AlightComplete: the exiting passenger is out. Records the journey, frees
/// the car slot, and resumes the exit sequence.
#[allow(clippy::type_complexity)]
pub fn alight_complete_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    mut stats: ResMut<SimStats>,
    mut passengers: Query<&mut Passenger>,
    mut cars: Query<(Entity, &mut Elevator, &mut Door, &mut StopWork)>,
) {
    if event.0.kind != EventKind::AlightComplete {
        return;
    }
    let Some(EventSubject::Passenger(p_entity)) = event.0.subject else {
        return;
    };

    let (record, boarded_car, has_more_journeys) = {
        let Ok(mut passenger) = passengers.get_mut(p_entity) else {
            return;
        };
        if passenger.phase != PassengerPhase::Alighting {
            return;
        }
        passenger.alighting_ms = Some(clock.now());
        let journey = passenger.current_journey();
        let boarded_car = passenger.boarded_car;
        let has_more = passenger.journey_idx + 1 < passenger.journeys.len();
        passenger.phase = if has_more {
            PassengerPhase::BetweenJourneys
        } else {
            PassengerPhase::Done
        };
        (
            JourneyRecord {
                passenger: passenger.name.clone(),
                from: journey.from,
                to: journey.to,
                elevator: String::new(),
                wait_to_door_open_secs: passenger.wait_to_door_open_secs(),
                wait_to_boarding_secs: passenger.wait_to_boarding_secs(),
                riding_secs: passenger.riding_time_secs(),
                total_secs: passenger.total_journey_secs(),
            },
            boarded_car,
            has_more,
        )
    };

    if has_more_journeys {
        // Brief pause while the passenger walks to their next origin.
        clock.schedule_in(500, EventKind::PassengerStep, Some(EventSubject::Passenger(p_entity)));
    }

    let Some(car) = boarded_car else {
        warn!(passenger = %record.passenger, "alighting passenger has no car");
        return;
    };
    let Ok((car_entity, mut elevator, _door, mut stop)) = cars.get_mut(car) else {
        return;
    };
    elevator.onboard.retain(|&p| p != p_entity);

    bus.publish(
        &mut clock,
        "passenger/alighting",
        Message::PassengerAlighting {
            passenger: record.passenger.clone(),
            floor: record.to,
            elevator: elevator.name.clone(),
            riding_time: record.riding_secs,
            total_journey_time: record.total_secs,
            wait_time: record.wait_to_door_open_secs,
        },
    );
    publish_status(&mut bus, &mut clock, &elevator);

    stats.journeys.push(JourneyRecord {
        elevator: elevator.name.clone(),
        ..record
    });

    if stop.phase == DoorPhase::Exiting {
        clock.schedule_in(0, EventKind::DoorStep, Some(EventSubject::Car(car_entity)));
    }
}
