//! Shared helpers for scenario tests: compact configs, world construction,
//! and record extraction from the bus mirror.

use bevy_ecs::prelude::{Schedule, World};

use crate::calls::Floor;
use crate::config::{CallSystemKind, GroupControlConfig, SimulationConfig};
use crate::log::record_type;
use crate::runner::{initialize_simulation, run_until_empty, simulation_schedule};
use crate::scenario::build_world;

/// The reference test plant: seed 42, no stochastic traffic, 1.5 s doors,
/// 1 s photocell, as used by the end-to-end scenarios.
pub fn test_sim_config(num_floors: Floor, num_elevators: usize, max_capacity: usize) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.building.num_floors = num_floors;
    config.elevator.num_elevators = num_elevators;
    config.elevator.max_capacity = max_capacity;
    config.door.open_time = 1.5;
    config.door.close_time = 1.5;
    config.door.sensor_timeout = 1.0;
    config.traffic.passenger_generation_rate = 0.0;
    config.traffic.avg_boarding_time = 1.0;
    config.random_seed = Some(42);
    config
}

pub fn lobby_dcs(mut config: SimulationConfig) -> SimulationConfig {
    config.call_system.kind = CallSystemKind::LobbyDcs;
    config.call_system.lobby_floor = Some(1);
    config
}

pub fn build_ready_world(sim: &SimulationConfig, gc: &GroupControlConfig) -> (World, Schedule) {
    let mut world = build_world(sim, gc).expect("valid test config");
    initialize_simulation(&mut world);
    (world, simulation_schedule())
}

/// Drive the world until the event queue drains.
pub fn run_all(world: &mut World, schedule: &mut Schedule) -> usize {
    let steps = run_until_empty(world, schedule, 1_000_000);
    assert!(steps < 1_000_000, "simulation did not quiesce");
    steps
}

/// Every loggable record in mirror order as (type, time_secs, data).
pub fn log_records(world: &World) -> Vec<(String, f64, serde_json::Value)> {
    world
        .resource::<crate::bus::MessageBus>()
        .mirror()
        .iter()
        .filter_map(|record| {
            record_type(&record.message).map(|ty| {
                (
                    ty.to_string(),
                    crate::clock::ms_to_secs(record.time_ms),
                    serde_json::to_value(&record.message).expect("serializable message"),
                )
            })
        })
        .collect()
}

/// Records of one type, in order.
pub fn records_of(world: &World, ty: &str) -> Vec<(f64, serde_json::Value)> {
    log_records(world)
        .into_iter()
        .filter(|(t, _, _)| t == ty)
        .map(|(_, time, data)| (time, data))
        .collect()
}

/// Serialize the full event log to an NDJSON string (determinism checks).
pub fn log_as_ndjson(world: &mut World) -> String {
    let records = world
        .resource_mut::<crate::bus::MessageBus>()
        .mirror()
        .to_vec();
    let mut writer = crate::log::EventLogWriter::new(Vec::new());
    writer.write_records(&records).expect("write log");
    String::from_utf8(writer.into_inner()).expect("utf8 log")
}

/// Door-event protocol check: per car, the sequence per stop must be
/// OPENING_START, OPENING_COMPLETE, then closing attempts where each
/// REOPENING/REOPEN_COMPLETE pair is followed by another CLOSING_START,
/// ending in CLOSING_COMPLETE.
pub fn assert_door_protocol(world: &World, car: &str) {
    #[derive(PartialEq, Debug)]
    enum Expect {
        OpeningStart,
        OpeningComplete,
        ClosingStart,
        AfterClosingStart,
        ReopenComplete,
    }
    let mut state = Expect::OpeningStart;
    for (_, data) in records_of(world, "door_event") {
        if data["elevator"] != car {
            continue;
        }
        let event = data["event_type"].as_str().expect("event type");
        state = match (state, event) {
            (Expect::OpeningStart, "OPENING_START") => Expect::OpeningComplete,
            (Expect::OpeningComplete, "OPENING_COMPLETE") => Expect::ClosingStart,
            (Expect::ClosingStart, "CLOSING_START") => Expect::AfterClosingStart,
            (Expect::AfterClosingStart, "CLOSING_COMPLETE") => Expect::OpeningStart,
            (Expect::AfterClosingStart, "REOPENING") => Expect::ReopenComplete,
            (Expect::ReopenComplete, "REOPEN_COMPLETE") => Expect::ClosingStart,
            (state, event) => panic!("door protocol violated: {event} while expecting {state:?}"),
        };
    }
    assert_eq!(state, Expect::OpeningStart, "unfinished door cycle for {car}");
}

/// Log-wide invariant: record timestamps never decrease.
pub fn assert_monotonic_times(world: &World) {
    let mut last = 0.0_f64;
    for (ty, time, _) in log_records(world) {
        assert!(time >= last, "{ty} record went back in time: {time} < {last}");
        last = time;
    }
}
