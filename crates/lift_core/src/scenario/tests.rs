//! End-to-end scenarios driven through the public runner, asserting against
//! the event-log mirror. Fixed-time injections, seed 42, throttle off.

use bevy_ecs::prelude::Entity;

use crate::config::GroupControlConfig;
use crate::ecs::{Elevator, Journey};
use crate::gcs::CarRegistry;
use crate::scenario::inject_passenger;
use crate::stats::SimStats;
use crate::test_helpers::{
    assert_door_protocol, assert_monotonic_times, build_ready_world, lobby_dcs, log_as_ndjson,
    log_records, records_of, run_all, test_sim_config,
};

const MOVE_MS: u64 = 1000;

fn opening_floors(world: &bevy_ecs::prelude::World, car: &str) -> Vec<u64> {
    records_of(world, "door_event")
        .into_iter()
        .filter(|(_, data)| data["elevator"] == car && data["event_type"] == "OPENING_START")
        .map(|(_, data)| data["floor"].as_u64().expect("floor"))
        .collect()
}

fn sole_car(world: &mut bevy_ecs::prelude::World) -> Entity {
    let registry = world.resource::<CarRegistry>();
    registry.entity_by_name("Elevator_1").expect("Elevator_1")
}

#[test]
fn single_up_trip() {
    let sim = test_sim_config(10, 1, 10);
    let gc = GroupControlConfig::default();
    let (mut world, mut schedule) = build_ready_world(&sim, &gc);
    inject_passenger(&mut world, 5_000, "Passenger_A", MOVE_MS, vec![Journey { from: 2, to: 10 }]);

    run_all(&mut world, &mut schedule);

    // Metadata leads the log.
    let records = log_records(&world);
    assert_eq!(records.first().map(|(ty, _, _)| ty.as_str()), Some("metadata"));

    // Hall call registered one second after the passenger appears.
    let registered = records_of(&world, "hall_call_registered");
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].0, 6.0);
    assert_eq!(registered[0].1["floor"], 2);
    assert_eq!(registered[0].1["direction"], "UP");

    let assignments = records_of(&world, "hall_call_assignment");
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].1["assigned_elevator"], "Elevator_1");

    // One car call for floor 10, switched off when the door opens up there.
    let car_calls = records_of(&world, "car_call_registered");
    assert_eq!(car_calls.len(), 1);
    assert_eq!(car_calls[0].1["destination"], 10);
    let car_call_offs = records_of(&world, "car_call_off");
    assert_eq!(car_call_offs.len(), 1);
    assert_eq!(car_call_offs[0].1["floor"], 10);

    // The hall call clears with the boarding stop.
    let hall_offs = records_of(&world, "hall_call_off");
    assert_eq!(hall_offs.len(), 1);
    assert_eq!(hall_offs[0].1["floor"], 2);
    assert_eq!(hall_offs[0].1["direction"], "UP");

    let boardings = records_of(&world, "passenger_boarding");
    assert_eq!(boardings.len(), 1);
    assert_eq!(boardings[0].1["floor"], 2);
    let alightings = records_of(&world, "passenger_alighting");
    assert_eq!(alightings.len(), 1);
    assert_eq!(alightings[0].1["floor"], 10);

    assert_eq!(opening_floors(&world, "Elevator_1"), vec![2, 10]);
    assert!(records_of(&world, "door_event")
        .iter()
        .all(|(_, data)| data["event_type"] != "REOPENING"));
    assert_door_protocol(&world, "Elevator_1");
    assert_monotonic_times(&world);

    let car = sole_car(&mut world);
    let elevator = world.get::<Elevator>(car).expect("elevator");
    assert_eq!(elevator.direction, None);
    assert!(elevator.onboard.is_empty());
    assert!(!elevator.has_any_calls());
}

#[test]
fn in_flight_interrupt_inserts_intermediate_stop() {
    let sim = test_sim_config(10, 1, 10);
    let gc = GroupControlConfig::default();
    let (mut world, mut schedule) = build_ready_world(&sim, &gc);
    inject_passenger(&mut world, 5_000, "Passenger_A", MOVE_MS, vec![Journey { from: 2, to: 10 }]);
    // Appears while the car is between floors on its way 2 -> 10.
    inject_passenger(&mut world, 17_000, "Passenger_B", MOVE_MS, vec![Journey { from: 6, to: 9 }]);

    run_all(&mut world, &mut schedule);

    let registered = records_of(&world, "hall_call_registered");
    assert!(registered
        .iter()
        .any(|(time, data)| *time == 18.0 && data["floor"] == 6 && data["direction"] == "UP"));

    // Revised stop sequence: pick B up at 6, drop B at 9, then A at 10.
    assert_eq!(opening_floors(&world, "Elevator_1"), vec![2, 6, 9, 10]);

    let alightings = records_of(&world, "passenger_alighting");
    assert_eq!(alightings.len(), 2);
    assert_eq!(alightings[0].1["passenger"], "Passenger_B");
    assert_eq!(alightings[0].1["floor"], 9);
    assert_eq!(alightings[1].1["passenger"], "Passenger_A");
    assert_eq!(alightings[1].1["floor"], 10);

    assert_door_protocol(&world, "Elevator_1");
    assert_monotonic_times(&world);

    let car = sole_car(&mut world);
    let elevator = world.get::<Elevator>(car).expect("elevator");
    assert_eq!(elevator.direction, None);
}

#[test]
fn full_load_bypass_skips_hall_call_and_returns() {
    let sim = test_sim_config(10, 1, 2);
    let gc = GroupControlConfig::default();
    let (mut world, mut schedule) = build_ready_world(&sim, &gc);
    inject_passenger(&mut world, 5_000, "Passenger_1", MOVE_MS, vec![Journey { from: 1, to: 10 }]);
    inject_passenger(&mut world, 5_000, "Passenger_2", MOVE_MS, vec![Journey { from: 1, to: 10 }]);
    // Appears mid-flight; the car is already at capacity.
    inject_passenger(&mut world, 12_000, "Passenger_3", MOVE_MS, vec![Journey { from: 5, to: 9 }]);

    run_all(&mut world, &mut schedule);

    let bypasses = records_of(&world, "full_load_bypass");
    assert!(!bypasses.is_empty());
    assert_eq!(bypasses[0].1["floor"], 5);
    assert_eq!(bypasses[0].1["passengers"], 2);

    // The bypassed floor is served after the car unloads at the top.
    assert_eq!(opening_floors(&world, "Elevator_1"), vec![1, 10, 5, 9]);

    let alightings = records_of(&world, "passenger_alighting");
    assert!(alightings
        .iter()
        .any(|(_, data)| data["passenger"] == "Passenger_3" && data["floor"] == 9));

    // Nobody was refused: the bypass never opened the door on them.
    assert_eq!(world.resource::<SimStats>().boarding_failures, 0);

    // Both passengers pressed 10; the second press registered nothing.
    let car_calls = records_of(&world, "car_call_registered");
    assert_eq!(
        car_calls
            .iter()
            .filter(|(_, data)| data["destination"] == 10)
            .count(),
        1
    );

    assert_door_protocol(&world, "Elevator_1");
    assert_monotonic_times(&world);
}

#[test]
fn reopen_budget_is_enforced_per_stop() {
    let mut sim = test_sim_config(10, 1, 10);
    sim.door.max_reopens_per_stop = Some(1);
    let gc = GroupControlConfig::default();
    let (mut world, mut schedule) = build_ready_world(&sim, &gc);
    inject_passenger(&mut world, 5_000, "Passenger_1", MOVE_MS, vec![Journey { from: 3, to: 8 }]);
    inject_passenger(&mut world, 5_000, "Passenger_2", MOVE_MS, vec![Journey { from: 3, to: 8 }]);
    // Arrives while the door is closing: granted the one reopen.
    inject_passenger(&mut world, 16_000, "Passenger_4", MOVE_MS, vec![Journey { from: 3, to: 8 }]);
    // Arrives during the second closing: denied.
    inject_passenger(&mut world, 20_000, "Passenger_5", MOVE_MS, vec![Journey { from: 3, to: 8 }]);

    run_all(&mut world, &mut schedule);

    let door_events = records_of(&world, "door_event");
    let reopens = door_events
        .iter()
        .filter(|(_, data)| data["event_type"] == "REOPENING")
        .count();
    assert_eq!(reopens, 1);
    assert!(door_events
        .iter()
        .any(|(_, data)| data["event_type"] == "CLOSING_COMPLETE"
            && data["reopen_limit_reached"] == true));

    let stats = world.resource::<SimStats>();
    assert_eq!(stats.reopen_denials, 1);
    assert_eq!(stats.boarding_failures, 1);

    // The granted reopen boarded Passenger_4 within the same stop.
    let boardings = records_of(&world, "passenger_boarding");
    assert!(boardings
        .iter()
        .any(|(time, data)| data["passenger"] == "Passenger_4" && *time < 22.5));

    // The refused passenger re-pressed; the car was already committed to its
    // drop-off run, so a fresh stop at 3 follows the unload at 8.
    assert_eq!(opening_floors(&world, "Elevator_1"), vec![3, 8, 3, 8]);
    let alightings = records_of(&world, "passenger_alighting");
    assert!(alightings
        .iter()
        .any(|(_, data)| data["passenger"] == "Passenger_5" && data["floor"] == 8));

    assert_door_protocol(&world, "Elevator_1");
    assert_monotonic_times(&world);
}

#[test]
fn dcs_left_behind_passenger_reregisters_and_switches_cars() {
    let sim = lobby_dcs(test_sim_config(10, 2, 1));
    let gc = GroupControlConfig::default();
    let (mut world, mut schedule) = build_ready_world(&sim, &gc);
    inject_passenger(&mut world, 1_000, "Passenger_0", MOVE_MS, vec![Journey { from: 1, to: 5 }]);
    inject_passenger(&mut world, 1_200, "Passenger_P", MOVE_MS, vec![Journey { from: 1, to: 8 }]);

    run_all(&mut world, &mut schedule);

    // P registered twice: first plain, then flagged as left behind.
    let registrations: Vec<_> = records_of(&world, "hall_call_registered")
        .into_iter()
        .filter(|(_, data)| data["passenger"] == "Passenger_P")
        .collect();
    assert_eq!(registrations.len(), 2);
    assert!(registrations[0].1["reason"].is_null());
    assert_eq!(registrations[1].1["reason"], "LEFT_BEHIND");

    let assignments: Vec<_> = records_of(&world, "hall_call_assignment")
        .into_iter()
        .filter(|(_, data)| data["passenger"] == "Passenger_P")
        .collect();
    assert_eq!(assignments.len(), 2);
    assert_eq!(assignments[0].1["assigned_elevator"], "Elevator_1");
    assert_eq!(assignments[1].1["assigned_elevator"], "Elevator_2");

    assert_eq!(world.resource::<SimStats>().boarding_failures, 1);

    // The second car's door auto-registered P's destination; P never pressed
    // a car button.
    let car_calls = records_of(&world, "car_call_registered");
    let on_second: Vec<_> = car_calls
        .iter()
        .filter(|(_, data)| data["elevator"] == "Elevator_2")
        .collect();
    assert_eq!(on_second.len(), 1);
    assert_eq!(on_second[0].1["destination"], 8);
    assert_eq!(on_second[0].1["auto_registered"], true);
    assert!(car_calls.iter().all(|(_, data)| data["auto_registered"] == true));

    // The first car only ever registered its actual boarder's floor: P's
    // destination must not leak onto it, and it makes no phantom stop at 8.
    assert!(car_calls
        .iter()
        .all(|(_, data)| !(data["elevator"] == "Elevator_1" && data["destination"] == 8)));
    assert_eq!(opening_floors(&world, "Elevator_1"), vec![1, 5]);
    assert_eq!(opening_floors(&world, "Elevator_2"), vec![1, 8]);

    let alightings = records_of(&world, "passenger_alighting");
    assert!(alightings
        .iter()
        .any(|(_, data)| data["passenger"] == "Passenger_P"
            && data["floor"] == 8
            && data["elevator"] == "Elevator_2"));

    assert_door_protocol(&world, "Elevator_1");
    assert_door_protocol(&world, "Elevator_2");
    assert_monotonic_times(&world);
}

#[test]
fn identical_seeds_produce_identical_logs() {
    let run = || {
        let mut sim = test_sim_config(10, 2, 10);
        sim.traffic.passenger_generation_rate = 0.05;
        sim.traffic.simulation_duration = 120.0;
        let gc = GroupControlConfig::default();
        let (mut world, mut schedule) = build_ready_world(&sim, &gc);
        inject_passenger(&mut world, 5_000, "Passenger_A", MOVE_MS, vec![Journey { from: 2, to: 10 }]);
        run_all(&mut world, &mut schedule);
        log_as_ndjson(&mut world)
    };

    let first = run();
    let second = run();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn multi_stop_journey_runs_both_legs() {
    let sim = test_sim_config(10, 1, 10);
    let gc = GroupControlConfig::default();
    let (mut world, mut schedule) = build_ready_world(&sim, &gc);
    inject_passenger(
        &mut world,
        5_000,
        "Passenger_A",
        MOVE_MS,
        vec![Journey { from: 2, to: 5 }, Journey { from: 5, to: 3 }],
    );

    run_all(&mut world, &mut schedule);

    let alightings = records_of(&world, "passenger_alighting");
    assert_eq!(alightings.len(), 2);
    assert_eq!(alightings[0].1["floor"], 5);
    assert_eq!(alightings[1].1["floor"], 3);

    let stats = world.resource::<SimStats>();
    assert_eq!(stats.journeys.len(), 2);
    assert_monotonic_times(&world);
}

#[test]
fn return_to_home_repositions_idle_cars() {
    let sim = test_sim_config(10, 1, 10);
    let mut gc = GroupControlConfig::default();
    gc.repositioning_strategy.name = "ReturnToHome".to_string();
    let (mut world, mut schedule) = build_ready_world(&sim, &gc);
    inject_passenger(&mut world, 5_000, "Passenger_A", MOVE_MS, vec![Journey { from: 2, to: 6 }]);

    run_all(&mut world, &mut schedule);

    let car = sole_car(&mut world);
    let elevator = world.get::<Elevator>(car).expect("elevator");
    assert_eq!(elevator.current_floor, 1);
    assert_eq!(elevator.direction, None);
    assert!(!elevator.has_any_calls());

    // The forced move ends with an empty courtesy stop at the home floor.
    let floors = opening_floors(&world, "Elevator_1");
    assert_eq!(floors.last(), Some(&1));
    assert_door_protocol(&world, "Elevator_1");
}

#[test]
fn invalid_configuration_is_rejected_before_running() {
    let mut sim = test_sim_config(10, 1, 10);
    sim.building.num_floors = 1;
    assert!(crate::scenario::build_world(&sim, &GroupControlConfig::default()).is_err());

    let sim = test_sim_config(10, 1, 10);
    let mut gc = GroupControlConfig::default();
    gc.allocation_strategy.name = "NoSuchStrategy".to_string();
    assert!(crate::scenario::build_world(&sim, &gc).is_err());
}
