//! Traffic source systems: kick off the run and spawn passengers on the
//! configured inter-arrival process.

use bevy_ecs::prelude::{Commands, Query, Res, ResMut};

use crate::bus::{assignment_topic, MessageBus};
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock, ONE_SEC_MS};
use crate::ecs::{Elevator, Journey, Passenger};
use crate::stats::SimStats;
use crate::systems::publish_status;
use crate::traffic::PassengerSpawner;

/// SimulationStarted: publish every car's initial status (seeds the
/// dispatcher's shadow table) and schedule the first stochastic spawn.
pub fn simulation_started_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    spawner: Option<Res<PassengerSpawner>>,
    cars: Query<&Elevator>,
) {
    if event.0.kind != EventKind::SimulationStarted {
        return;
    }
    for car in cars.iter() {
        publish_status(&mut bus, &mut clock, car);
    }
    if let Some(spawner) = spawner {
        if spawner.rate_per_sec > 0.0 {
            let delta = spawner.sample_inter_arrival_ms();
            if delta.is_finite() {
                let at = clock.now() + delta as u64;
                if at <= spawner.end_time_ms {
                    clock.schedule_at(at, EventKind::SpawnPassenger, None);
                }
            }
        }
    }
}

/// SpawnPassenger: materialize one traveller and schedule the next arrival.
pub fn spawn_passenger_system(
    mut commands: Commands,
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut bus: ResMut<MessageBus>,
    mut spawner: ResMut<PassengerSpawner>,
    mut stats: ResMut<SimStats>,
) {
    if event.0.kind != EventKind::SpawnPassenger {
        return;
    }
    if clock.now() > spawner.end_time_ms {
        return;
    }

    let (from, to) = spawner.sample_journey();
    spawner.spawned += 1;
    stats.passengers_spawned += 1;
    let name = format!("Passenger_{}", spawner.spawned);
    let passenger = Passenger::new(name.clone(), spawner.move_speed_ms, vec![Journey { from, to }]);
    let entity = commands.spawn(passenger).id();

    bus.subscribe(
        assignment_topic(&name),
        EventKind::AssignmentDelivered,
        Some(EventSubject::Passenger(entity)),
    );
    // Travellers take a moment to reach the hall equipment.
    clock.schedule_in(ONE_SEC_MS, EventKind::PassengerStep, Some(EventSubject::Passenger(entity)));

    let delta = spawner.sample_inter_arrival_ms();
    if delta.is_finite() {
        let at = clock.now() + delta as u64;
        if at <= spawner.end_time_ms {
            clock.schedule_at(at, EventKind::SpawnPassenger, None);
        }
    }
}
