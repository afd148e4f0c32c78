//! Dispatcher systems: hall-call allocation and the shadow status table.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::warn;

use crate::bus::{car_status_topic, car_task_topic, Message, MessageBus, GCS_HALL_CALL};
use crate::call_system::CallSystem;
use crate::calls::{CallData, CallType, Direction};
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{direction_from_label, CarMotionState, Elevator};
use crate::gcs::{CarRegistry, CarStatusSnapshot, DispatchContext, GroupControl, RepositionCommand};
use crate::physics::FlightTables;
use crate::stats::SimStats;

/// GcsHallCall: drain the dispatcher's hall-call topic, pick a car per call,
/// and publish both the task assignment and the assignment record.
#[allow(clippy::too_many_arguments)]
pub fn gcs_hall_call_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    registry: Res<CarRegistry>,
    mut gc: ResMut<GroupControl>,
    tables: Res<FlightTables>,
    call_system: Res<CallSystem>,
    mut stats: ResMut<SimStats>,
    cars: Query<&Elevator>,
) {
    if event.0.kind != EventKind::GcsHallCall {
        return;
    }

    while let Some(message) = bus.try_receive(GCS_HALL_CALL) {
        let Message::HallCall { floor, direction, destination, passenger, call_type, reason: _ } =
            message
        else {
            warn!("unknown message on the hall-call topic");
            stats.safety_violations += 1;
            continue;
        };
        if registry.is_empty() {
            warn!("hall call received with no registered cars");
            continue;
        }

        let call = CallData {
            floor,
            direction,
            destination,
            call_type,
            timestamp_ms: clock.now(),
        };

        // Only cars whose service-floor whitelist admits the call floor are
        // candidates.
        let candidates: Vec<(String, CarStatusSnapshot)> = gc
            .statuses()
            .iter()
            .filter(|(name, _)| {
                registry
                    .entity_by_name(name)
                    .and_then(|entity| cars.get(entity).ok())
                    .map(|car| car.serves(floor))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let ctx = DispatchContext {
            tables: &tables,
            num_floors: call_system.num_floors(),
            now_ms: clock.now(),
        };
        let selected = gc
            .allocation
            .select_car(&call, &candidates, &ctx)
            .filter(|name| registry.entity_by_name(name).is_some())
            .or_else(|| registry.first_name().map(str::to_string));
        let Some(car_name) = selected else {
            continue;
        };

        let service_direction = call.service_direction().unwrap_or(Direction::Up);
        bus.publish(
            &mut clock,
            &car_task_topic(&car_name),
            Message::AssignHallCall { floor, direction: service_direction },
        );

        let assignment = Message::Assignment {
            floor,
            direction,
            destination,
            passenger: Some(passenger.clone()),
            assigned_elevator: car_name,
        };
        match call_type {
            // DCS passengers wait on their own topic for the pick.
            CallType::Dcs => {
                bus.publish(&mut clock, &crate::bus::assignment_topic(&passenger), assignment);
            }
            // Directional assignments are only correlated by the log.
            CallType::Traditional => {
                bus.publish(&mut clock, "gcs/hall_call_assignment", assignment);
            }
        }
    }
}

/// GcsStatus: refresh the shadow table from a car's status topic, then let
/// the repositioning strategy react.
pub fn gcs_status_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    registry: Res<CarRegistry>,
    mut gc: ResMut<GroupControl>,
    mut stats: ResMut<SimStats>,
) {
    if event.0.kind != EventKind::GcsStatus {
        return;
    }
    let Some(EventSubject::Car(entity)) = event.0.subject else {
        return;
    };
    let Some(car_name) = registry.name_of(entity).map(str::to_string) else {
        return;
    };
    let topic = car_status_topic(&car_name);

    let mut updated = None;
    while let Some(message) = bus.try_receive(&topic) {
        let Message::CarStatus {
            current_floor,
            advanced_position,
            state,
            direction,
            passengers,
            max_capacity,
            car_calls,
            hall_calls_up,
            hall_calls_down,
            home_floor,
            main_direction,
            ..
        } = message
        else {
            warn!(car = %car_name, "unknown message on status topic");
            stats.safety_violations += 1;
            continue;
        };
        let (Some(state), Some(direction)) =
            (CarMotionState::from_label(state), direction_from_label(direction))
        else {
            warn!(car = %car_name, "malformed status message");
            stats.safety_violations += 1;
            continue;
        };
        let snapshot = CarStatusSnapshot {
            current_floor,
            advanced_position,
            state,
            direction,
            passengers,
            max_capacity,
            car_calls: car_calls.into_iter().collect(),
            hall_calls_up: hall_calls_up.into_iter().collect(),
            hall_calls_down: hall_calls_down.into_iter().collect(),
            home_floor,
            main_direction,
        };
        gc.update_status(&car_name, snapshot.clone());
        updated = Some(snapshot);
    }

    let Some(snapshot) = updated else {
        return;
    };
    let all = gc.statuses().to_vec();
    let commands = gc.repositioning.evaluate(&car_name, &snapshot, &all);
    for command in commands {
        match command {
            RepositionCommand::ForcedMove { car, floor, direction } => {
                bus.publish(
                    &mut clock,
                    &car_task_topic(&car),
                    Message::ForcedMove { floor, direction },
                );
            }
            RepositionCommand::Move { car, floor } => {
                bus.publish(&mut clock, &car_task_topic(&car), Message::MoveTo { floor });
            }
        }
    }
}
