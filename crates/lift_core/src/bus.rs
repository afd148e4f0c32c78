//! Message bus: topic-addressed FIFO queues with a broadcast mirror.
//!
//! The bus is the only channel between actors. `publish` enqueues on the
//! topic's FIFO and appends a copy to the broadcast mirror (the event-log
//! source of truth). Topics with a registered consumer wake that consumer by
//! scheduling its event at the current timestamp, so delivery order follows
//! publish order per topic. Unknown topics are materialized on first use.

use std::collections::{BTreeMap, VecDeque};

use bevy_ecs::prelude::Resource;
use serde::Serialize;

use crate::calls::{CallType, Direction, Floor};
use crate::clock::{EventKind, EventSubject, SimulationClock};

/// Hall-call topic consumed by the group control system.
pub const GCS_HALL_CALL: &str = "gcs/hall_call";

pub fn car_task_topic(car: &str) -> String {
    format!("elevator/{car}/task")
}

pub fn car_call_topic(car: &str) -> String {
    format!("elevator/{car}/car_call")
}

pub fn car_status_topic(car: &str) -> String {
    format!("elevator/{car}/status")
}

pub fn assignment_topic(passenger: &str) -> String {
    format!("passenger/{passenger}/assignment")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DoorEventKind {
    OpeningStart,
    OpeningComplete,
    ClosingStart,
    ClosingComplete,
    Reopening,
    ReopenComplete,
}

/// Bus payload. Serialized form is the `data` object of the matching event-log
/// record; internal command messages never reach the log (see
/// [`crate::log::record_type`]).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Message {
    /// First mirrored publish of a run; becomes the metadata record.
    Metadata {
        num_floors: Floor,
        num_elevators: usize,
        max_capacity: usize,
        call_system: String,
        allocation_strategy: String,
        repositioning_strategy: String,
        random_seed: u64,
    },
    /// Hall call to the dispatcher (directional or DCS).
    HallCall {
        floor: Floor,
        direction: Option<Direction>,
        destination: Option<Floor>,
        passenger: String,
        call_type: CallType,
        reason: Option<String>,
    },
    /// Dispatcher decision, published to the waiting passenger's topic and
    /// mirrored as the `hall_call_assignment` record.
    Assignment {
        floor: Floor,
        direction: Option<Direction>,
        destination: Option<Floor>,
        passenger: Option<String>,
        assigned_elevator: String,
    },
    /// Task command: serve a hall call at (floor, direction).
    AssignHallCall { floor: Floor, direction: Direction },
    /// Task command: reposition to a floor and present the given direction.
    ForcedMove { floor: Floor, direction: Direction },
    /// Task command: reposition to a floor with no direction preference.
    MoveTo { floor: Floor },
    /// Car-call button press (or DCS auto-registration) on a car's topic.
    CarCallPress {
        destination: Floor,
        passenger: String,
        auto_registered: bool,
    },
    /// Car status update; also the `elevator_status` record.
    CarStatus {
        elevator: String,
        current_floor: Floor,
        advanced_position: Floor,
        state: &'static str,
        direction: &'static str,
        passengers: usize,
        max_capacity: usize,
        car_calls: Vec<Floor>,
        hall_calls_up: Vec<Floor>,
        hall_calls_down: Vec<Floor>,
        home_floor: Floor,
        main_direction: Direction,
    },
    HallCallRegistered {
        floor: Floor,
        direction: Option<Direction>,
        destination: Option<Floor>,
        passenger: String,
        reason: Option<String>,
    },
    HallCallOff {
        floor: Floor,
        direction: Direction,
        serviced_by: String,
    },
    CarCallRegistered {
        elevator: String,
        destination: Floor,
        passenger: String,
        auto_registered: bool,
    },
    CarCallOff { elevator: String, floor: Floor },
    DoorEvent {
        elevator: String,
        event_type: DoorEventKind,
        floor: Floor,
        #[serde(skip_serializing_if = "Option::is_none")]
        waiting_passengers: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reopen_limit_reached: Option<bool>,
    },
    PassengerWaiting {
        passenger: String,
        floor: Floor,
        direction: Option<Direction>,
        destination: Option<Floor>,
    },
    PassengerBoarding {
        passenger: String,
        floor: Floor,
        elevator: String,
        destination: Floor,
        wait_time: Option<f64>,
    },
    PassengerAlighting {
        passenger: String,
        floor: Floor,
        elevator: String,
        riding_time: Option<f64>,
        total_journey_time: Option<f64>,
        wait_time: Option<f64>,
    },
    FullLoadBypass {
        elevator: String,
        floor: Floor,
        direction: Direction,
        passengers: usize,
        capacity: usize,
    },
}

/// One mirrored publish: what went on the bus and when.
#[derive(Debug, Clone)]
pub struct BusRecord {
    pub time_ms: u64,
    pub topic: String,
    pub message: Message,
}

#[derive(Debug, Default, Resource)]
pub struct MessageBus {
    queues: BTreeMap<String, VecDeque<Message>>,
    consumers: BTreeMap<String, (EventKind, Option<EventSubject>)>,
    mirror: Vec<BusRecord>,
    mirror_cursor: usize,
}

impl MessageBus {
    /// Register the single consumer of a topic. Publishing to the topic then
    /// schedules `kind` for `subject` at the publish timestamp.
    pub fn subscribe(&mut self, topic: impl Into<String>, kind: EventKind, subject: Option<EventSubject>) {
        self.consumers.insert(topic.into(), (kind, subject));
    }

    /// Enqueue `message` on `topic`, mirror it, and wake the topic's consumer.
    /// Publishing never blocks.
    pub fn publish(&mut self, clock: &mut SimulationClock, topic: &str, message: Message) {
        self.queues
            .entry(topic.to_string())
            .or_default()
            .push_back(message.clone());
        self.mirror.push(BusRecord {
            time_ms: clock.now(),
            topic: topic.to_string(),
            message,
        });
        if let Some((kind, subject)) = self.consumers.get(topic) {
            clock.schedule_in(0, *kind, *subject);
        }
    }

    /// Pop the oldest message on `topic`, if any. Exactly-once, FIFO.
    pub fn try_receive(&mut self, topic: &str) -> Option<Message> {
        self.queues.get_mut(topic).and_then(VecDeque::pop_front)
    }

    /// Mirrored publishes appended since the last call. The mirror is only
    /// drained by the log writer.
    pub fn take_new_records(&mut self) -> Vec<BusRecord> {
        let records = self.mirror[self.mirror_cursor..].to_vec();
        self.mirror_cursor = self.mirror.len();
        records
    }

    /// Full mirror contents (tests and post-run analysis).
    pub fn mirror(&self) -> &[BusRecord] {
        &self.mirror
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::Entity;

    fn hall_call(floor: Floor) -> Message {
        Message::HallCall {
            floor,
            direction: Some(Direction::Up),
            destination: None,
            passenger: "Passenger_1".to_string(),
            call_type: CallType::Traditional,
            reason: None,
        }
    }

    #[test]
    fn per_topic_fifo_order() {
        let mut bus = MessageBus::default();
        let mut clock = SimulationClock::default();
        bus.publish(&mut clock, GCS_HALL_CALL, hall_call(3));
        bus.publish(&mut clock, GCS_HALL_CALL, hall_call(7));

        match bus.try_receive(GCS_HALL_CALL) {
            Some(Message::HallCall { floor, .. }) => assert_eq!(floor, 3),
            other => panic!("unexpected message: {other:?}"),
        }
        match bus.try_receive(GCS_HALL_CALL) {
            Some(Message::HallCall { floor, .. }) => assert_eq!(floor, 7),
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(bus.try_receive(GCS_HALL_CALL).is_none());
    }

    #[test]
    fn publish_wakes_registered_consumer() {
        let mut bus = MessageBus::default();
        let mut clock = SimulationClock::default();
        let car = Entity::from_raw(1);
        bus.subscribe(car_task_topic("Elevator_1"), EventKind::CarTask, Some(EventSubject::Car(car)));

        bus.publish(
            &mut clock,
            &car_task_topic("Elevator_1"),
            Message::AssignHallCall { floor: 5, direction: Direction::Up },
        );
        let event = clock.pop_next().expect("wake event");
        assert_eq!(event.kind, EventKind::CarTask);
        assert_eq!(event.subject, Some(EventSubject::Car(car)));
    }

    #[test]
    fn mirror_sees_every_publish_once() {
        let mut bus = MessageBus::default();
        let mut clock = SimulationClock::default();
        bus.publish(&mut clock, GCS_HALL_CALL, hall_call(2));
        bus.publish(&mut clock, "elevator/Elevator_1/task", hall_call(2));

        let first = bus.take_new_records();
        assert_eq!(first.len(), 2);
        assert!(bus.take_new_records().is_empty());

        bus.publish(&mut clock, GCS_HALL_CALL, hall_call(9));
        assert_eq!(bus.take_new_records().len(), 1);
    }
}
