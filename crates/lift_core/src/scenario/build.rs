//! World construction: resources, car entities, bus subscriptions, and the
//! metadata record.

use bevy_ecs::prelude::{Entity, World};

use crate::building::Building;
use crate::bus::{
    assignment_topic, car_call_topic, car_status_topic, car_task_topic, Message, MessageBus,
    GCS_HALL_CALL,
};
use crate::buttons::HallButtons;
use crate::calls::Floor;
use crate::clock::{secs_to_ms, EventKind, EventSubject, SimulationClock, ONE_SEC_MS};
use crate::config::{ConfigError, GroupControlConfig, SimulationConfig, StrategyConfig};
use crate::ecs::{Door, Elevator, Journey, Passenger, StopWork};
use crate::gcs::{
    AllocationStrategy, CarRegistry, EarliestArrival, GroupControl, NearestCar, NoRepositioning,
    RepositioningStrategy, ReturnToHome,
};
use crate::physics::FlightTables;
use crate::queues::FloorQueues;
use crate::runner::SimulationEndTimeMs;
use crate::stats::SimStats;
use crate::traffic::PassengerSpawner;

/// Runway past the traffic window for journeys still in flight.
const END_MARGIN_MS: u64 = 2 * 60 * 60 * 1000;

pub fn build_allocation_strategy(
    config: &StrategyConfig,
    num_floors: Floor,
) -> Result<Box<dyn AllocationStrategy>, ConfigError> {
    match config.name.as_str() {
        "NearestCar" => Ok(Box::new(NearestCar::new(num_floors))),
        "EarliestArrival" => Ok(Box::new(EarliestArrival {
            safety_margin_ms: config
                .parameters
                .get("safety_margin")
                .and_then(|v| v.as_f64())
                .map(secs_to_ms),
        })),
        other => Err(ConfigError::Invalid(format!(
            "unknown allocation strategy '{other}'"
        ))),
    }
}

pub fn build_repositioning_strategy(
    config: &StrategyConfig,
) -> Result<Box<dyn RepositioningStrategy>, ConfigError> {
    match config.name.as_str() {
        "None" => Ok(Box::new(NoRepositioning)),
        "ReturnToHome" => Ok(Box::new(ReturnToHome::default())),
        other => Err(ConfigError::Invalid(format!(
            "unknown repositioning strategy '{other}'"
        ))),
    }
}

/// Validate both configs and assemble the world: building, flight tables,
/// call system, cars with doors, queues, buttons, dispatcher, traffic source.
/// The metadata record is the first publish on the bus.
pub fn build_world(
    sim: &SimulationConfig,
    gc: &GroupControlConfig,
) -> Result<World, ConfigError> {
    sim.validate()?;
    gc.validate()?;

    let mut world = World::new();

    let building = match &sim.building.floors {
        Some(floors) => Building::new(floors.clone())?,
        None => Building::uniform(sim.building.num_floors, sim.building.floor_height)?,
    };
    let call_system = sim.build_call_system();

    let mut tables = FlightTables::precompute(
        &building.elevations(),
        sim.elevator.rated_speed,
        sim.elevator.acceleration,
        sim.elevator.jerk,
    );
    if let Some(stop_time) = gc
        .allocation_strategy
        .parameters
        .get("stop_time")
        .and_then(|v| v.as_f64())
    {
        tables.set_stop_time_ms(secs_to_ms(stop_time));
    }
    tables.validate()?;

    let mut clock = SimulationClock::default();
    let mut bus = MessageBus::default();
    bus.subscribe(GCS_HALL_CALL, EventKind::GcsHallCall, None);

    let mut registry = CarRegistry::default();
    let mut car_entities: Vec<Entity> = Vec::new();
    for index in 0..sim.elevator.num_elevators {
        let name = format!("Elevator_{}", index + 1);
        let per = sim
            .elevator
            .per_elevator
            .as_ref()
            .and_then(|entries| entries.get(index));
        let home_floor = per
            .and_then(|p| p.home_floor)
            .unwrap_or(sim.elevator.home_floor);
        let main_direction = per
            .and_then(|p| p.main_direction)
            .unwrap_or(sim.elevator.main_direction);
        let service_floors = per
            .and_then(|p| p.service_floors.clone())
            .or_else(|| sim.elevator.service_floors.clone());

        let mut elevator = Elevator::new(name.clone(), home_floor, sim.elevator.max_capacity);
        elevator.full_load_bypass = sim.elevator.full_load_bypass;
        elevator.main_direction = main_direction;
        elevator.service_floors = service_floors.map(|floors| floors.into_iter().collect());

        let door = Door::new(
            secs_to_ms(sim.door.open_time),
            secs_to_ms(sim.door.close_time),
            secs_to_ms(sim.door.sensor_timeout),
            sim.door.max_reopens_per_stop,
        );

        let entity = world.spawn((elevator, door, StopWork::default())).id();
        registry.register(entity, name.clone());
        car_entities.push(entity);

        bus.subscribe(car_task_topic(&name), EventKind::CarTask, Some(EventSubject::Car(entity)));
        bus.subscribe(
            car_call_topic(&name),
            EventKind::CarCallDelivery,
            Some(EventSubject::Car(entity)),
        );
        bus.subscribe(car_status_topic(&name), EventKind::GcsStatus, Some(EventSubject::Car(entity)));
    }

    let queues = FloorQueues::new(&call_system, &car_entities);
    let buttons = HallButtons::new(&call_system);

    let allocation = build_allocation_strategy(&gc.allocation_strategy, building.num_floors())?;
    let repositioning = build_repositioning_strategy(&gc.repositioning_strategy)?;

    let seed = sim.random_seed.unwrap_or(0);
    let end_time_ms = secs_to_ms(sim.traffic.simulation_duration);
    let spawner = PassengerSpawner {
        pattern: sim.traffic.pattern,
        rate_per_sec: sim.traffic.passenger_generation_rate,
        end_time_ms,
        od_matrix: sim.traffic.od_matrix.clone(),
        num_floors: building.num_floors(),
        lobby_floor: sim.building.lobby_floor,
        seed,
        move_speed_ms: secs_to_ms(sim.traffic.avg_boarding_time),
        spawned: 0,
    };

    bus.publish(
        &mut clock,
        "simulation/metadata",
        Message::Metadata {
            num_floors: building.num_floors(),
            num_elevators: sim.elevator.num_elevators,
            max_capacity: sim.elevator.max_capacity,
            call_system: call_system.label().to_string(),
            allocation_strategy: allocation.name().to_string(),
            repositioning_strategy: repositioning.name().to_string(),
            random_seed: seed,
        },
    );

    world.insert_resource(clock);
    world.insert_resource(bus);
    world.insert_resource(building);
    world.insert_resource(call_system);
    world.insert_resource(tables);
    world.insert_resource(queues);
    world.insert_resource(buttons);
    world.insert_resource(registry);
    world.insert_resource(GroupControl::new(allocation, repositioning));
    world.insert_resource(spawner);
    world.insert_resource(SimStats::default());
    world.insert_resource(SimulationEndTimeMs(end_time_ms + END_MARGIN_MS));

    Ok(world)
}

/// Place one fully-formed traveller into the world, appearing at `at_ms`.
/// Used by deterministic scenarios and tests; stochastic traffic goes through
/// the spawner.
pub fn inject_passenger(
    world: &mut World,
    at_ms: u64,
    name: &str,
    move_speed_ms: u64,
    journeys: Vec<Journey>,
) -> Entity {
    let entity = world
        .spawn(Passenger::new(name.to_string(), move_speed_ms, journeys))
        .id();
    world.resource_mut::<MessageBus>().subscribe(
        assignment_topic(name),
        EventKind::AssignmentDelivered,
        Some(EventSubject::Passenger(entity)),
    );
    world.resource_mut::<SimulationClock>().schedule_at(
        at_ms + ONE_SEC_MS,
        EventKind::PassengerStep,
        Some(EventSubject::Passenger(entity)),
    );
    world.resource_mut::<SimStats>().passengers_spawned += 1;
    entity
}
