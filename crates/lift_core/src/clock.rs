//! Simulation time: millisecond-scale virtual timeline.
//!
//! All timestamps and `clock.now()` are in **simulation milliseconds**. The
//! timeline advances by popping the next scheduled event; same-ms events are
//! delivered in schedule order (a monotonic sequence number breaks ties).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::{Entity, Resource};

/// One second in simulation milliseconds.
pub const ONE_SEC_MS: u64 = 1000;
/// One minute in simulation milliseconds.
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;

/// Convert a config-level duration in seconds to simulation ms.
pub fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

/// Convert simulation ms to seconds (the unit of log record timestamps).
pub fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    SimulationStarted,
    SpawnPassenger,
    /// Passenger journey step: begin a journey, or continue a DCS
    /// re-registration after a boarding failure.
    PassengerStep,
    /// A group-control assignment landed on the passenger's topic.
    AssignmentDelivered,
    /// Passenger finished stepping into the car.
    BoardComplete,
    /// Passenger finished stepping out of the car.
    AlightComplete,
    /// Drain the car's task topic (hall-call assignments, move commands).
    CarTask,
    /// Drain the car's car-call topic.
    CarCallDelivery,
    /// Head of the car's main loop: stop test, direction, next destination.
    CarStep,
    /// Cruise segment boundary (token-guarded).
    CarSegment,
    /// Brake segment complete (token-guarded).
    CarArrive,
    /// Advance the door phase machine.
    DoorStep,
    /// Door close timer fired (token-guarded).
    DoorCloseDone,
    /// Drain the dispatcher's hall-call topic.
    GcsHallCall,
    /// A car published a status update; refresh the shadow table.
    GcsStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject {
    Car(Entity),
    Passenger(Entity),
}

/// Simulation event. `timestamp` is in ms. `token` lets an actor invalidate
/// timers it scheduled earlier: a popped event whose token no longer matches
/// the actor's counter is the "interrupted" signal and is dropped by its
/// handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub seq: u64,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
    pub token: u64,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by timestamp; same timestamp ordered by schedule sequence.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

/// Simulation clock: time in **milliseconds**, advances to the next scheduled
/// event.
#[derive(Debug, Default, Resource)]
pub struct SimulationClock {
    /// Current simulation time in ms (updated when an event is popped).
    now: u64,
    /// Monotonic schedule counter; breaks same-ms ties in schedule order.
    next_seq: u64,
    events: BinaryHeap<Event>,
}

impl SimulationClock {
    /// Current simulation time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Current simulation time in seconds (now / 1000).
    pub fn now_secs(&self) -> f64 {
        ms_to_secs(self.now)
    }

    /// Schedule an event at a specific simulation timestamp (ms).
    pub fn schedule_at(&mut self, at_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at_with_token(at_ms, kind, subject, 0);
    }

    /// Schedule a token-carrying event at a specific timestamp (ms).
    pub fn schedule_at_with_token(
        &mut self,
        at_ms: u64,
        kind: EventKind,
        subject: Option<EventSubject>,
        token: u64,
    ) {
        debug_assert!(at_ms >= self.now, "event timestamp must be >= current time");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Event {
            timestamp: at_ms.max(self.now),
            seq,
            kind,
            subject,
            token,
        });
    }

    /// Schedule an event at `now + delta_ms`.
    pub fn schedule_in(&mut self, delta_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at(self.now.saturating_add(delta_ms), kind, subject);
    }

    /// Schedule a token-carrying event at `now + delta_ms`.
    pub fn schedule_in_with_token(
        &mut self,
        delta_ms: u64,
        kind: EventKind,
        subject: Option<EventSubject>,
        token: u64,
    ) {
        self.schedule_at_with_token(self.now.saturating_add(delta_ms), kind, subject, token);
    }

    /// Schedule an event in **delta_secs** seconds from now.
    pub fn schedule_in_secs(&mut self, delta_secs: f64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_in(secs_to_ms(delta_secs), kind, subject);
    }

    /// Pop the next event (earliest timestamp, schedule order within a ms).
    /// Advances `now` to that timestamp.
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    /// Timestamp of the next scheduled event without popping it.
    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|event| event.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events still in the queue (for tests and scenario validation).
    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }
}
