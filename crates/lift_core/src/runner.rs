//! Simulation runner: advances the clock and routes events into the ECS.
//!
//! Each step pops the next event from [`SimulationClock`], inserts it as
//! [`CurrentEvent`], then runs the schedule. Every event kind is handled by
//! exactly one system, gated with a `run_if` condition, so a step executes
//! deterministically.

use std::time::{Duration, Instant};

use bevy_ecs::prelude::{Res, Resource};
use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};

use crate::clock::{CurrentEvent, Event, EventKind, SimulationClock};
use crate::systems::{
    car_motion::{car_arrive_system, car_segment_system},
    car_step::car_step_system,
    car_task::{car_call_system, car_task_system},
    door_step::{alight_complete_system, board_complete_system, door_close_system, door_step_system},
    gcs::{gcs_hall_call_system, gcs_status_system},
    passenger::{assignment_system, passenger_step_system},
    spawner::{simulation_started_system, spawn_passenger_system},
};

/// Hard stop: the runner refuses to pop events at or past this timestamp.
#[derive(Debug, Clone, Copy, Resource)]
pub struct SimulationEndTimeMs(pub u64);

fn is_kind(kind: EventKind) -> impl Fn(Option<Res<CurrentEvent>>) -> bool + Clone {
    move |event: Option<Res<CurrentEvent>>| event.map(|e| e.0.kind == kind).unwrap_or(false)
}

/// Builds the simulation schedule: one conditional system per event kind plus
/// [`apply_deferred`] so spawned passengers are visible before the next step.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((
        simulation_started_system.run_if(is_kind(EventKind::SimulationStarted)),
        spawn_passenger_system.run_if(is_kind(EventKind::SpawnPassenger)),
        passenger_step_system.run_if(is_kind(EventKind::PassengerStep)),
        assignment_system.run_if(is_kind(EventKind::AssignmentDelivered)),
        board_complete_system.run_if(is_kind(EventKind::BoardComplete)),
        alight_complete_system.run_if(is_kind(EventKind::AlightComplete)),
        car_task_system.run_if(is_kind(EventKind::CarTask)),
        car_call_system.run_if(is_kind(EventKind::CarCallDelivery)),
        car_step_system.run_if(is_kind(EventKind::CarStep)),
        car_segment_system.run_if(is_kind(EventKind::CarSegment)),
        car_arrive_system.run_if(is_kind(EventKind::CarArrive)),
        door_step_system.run_if(is_kind(EventKind::DoorStep)),
        door_close_system.run_if(is_kind(EventKind::DoorCloseDone)),
        gcs_hall_call_system.run_if(is_kind(EventKind::GcsHallCall)),
        gcs_status_system.run_if(is_kind(EventKind::GcsStatus)),
        apply_deferred,
    ));
    schedule
}

/// Schedules the SimulationStarted event at time 0. Call after building the
/// world and before running events.
pub fn initialize_simulation(world: &mut World) {
    let mut clock = world.resource_mut::<SimulationClock>();
    clock.schedule_at(0, EventKind::SimulationStarted, None);
}

/// Runs one step: pops the next event, inserts it as [`CurrentEvent`], runs
/// the schedule. Returns `false` when the clock is empty or the next event is
/// at or past [`SimulationEndTimeMs`].
pub fn run_next_event(world: &mut World, schedule: &mut Schedule) -> bool {
    let stop_at = world.get_resource::<SimulationEndTimeMs>().map(|e| e.0);
    let next_ts = world
        .get_resource::<SimulationClock>()
        .and_then(|c| c.next_event_time());
    if let (Some(end_ms), Some(ts)) = (stop_at, next_ts) {
        if ts >= end_ms {
            return false;
        }
    }

    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
    true
}

/// Runs one step and invokes `hook` after the schedule completes.
pub fn run_next_event_with_hook<F>(world: &mut World, schedule: &mut Schedule, hook: &mut F) -> bool
where
    F: FnMut(&mut World, &Event),
{
    let stop_at = world.get_resource::<SimulationEndTimeMs>().map(|e| e.0);
    let next_ts = world
        .get_resource::<SimulationClock>()
        .and_then(|c| c.next_event_time());
    if let (Some(end_ms), Some(ts)) = (stop_at, next_ts) {
        if ts >= end_ms {
            return false;
        }
    }

    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
    hook(world, &event);
    true
}

/// Runs until the event queue drains or `max_steps` is reached. Returns the
/// number of steps executed.
pub fn run_until_empty(world: &mut World, schedule: &mut Schedule, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && run_next_event(world, schedule) {
        steps += 1;
    }
    steps
}

/// Runs until empty, invoking `hook` after each step.
pub fn run_until_empty_with_hook<F>(
    world: &mut World,
    schedule: &mut Schedule,
    max_steps: usize,
    mut hook: F,
) -> usize
where
    F: FnMut(&mut World, &Event),
{
    let mut steps = 0;
    while steps < max_steps && run_next_event_with_hook(world, schedule, &mut hook) {
        steps += 1;
    }
    steps
}

/// Runs until empty under the real-time throttle: one virtual second takes
/// `1 / speed_factor` wall seconds. A factor of 0 disables the throttle.
pub fn run_until_empty_realtime<F>(
    world: &mut World,
    schedule: &mut Schedule,
    max_steps: usize,
    speed_factor: f64,
    mut hook: F,
) -> usize
where
    F: FnMut(&mut World, &Event),
{
    if speed_factor <= 0.0 {
        return run_until_empty_with_hook(world, schedule, max_steps, hook);
    }

    let wall_start = Instant::now();
    let sim_start = world
        .get_resource::<SimulationClock>()
        .map(|c| c.now())
        .unwrap_or(0);
    let mut steps = 0;
    while steps < max_steps {
        let Some(next_ts) = world
            .get_resource::<SimulationClock>()
            .and_then(|c| c.next_event_time())
        else {
            break;
        };
        let sim_elapsed_ms = next_ts.saturating_sub(sim_start);
        let target = wall_start + Duration::from_secs_f64(sim_elapsed_ms as f64 / 1000.0 / speed_factor);
        let now = Instant::now();
        if target > now {
            std::thread::sleep(target - now);
        }
        if !run_next_event_with_hook(world, schedule, &mut hook) {
            break;
        }
        steps += 1;
    }
    steps
}
