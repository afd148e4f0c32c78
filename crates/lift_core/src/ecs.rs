//! Components and state enums for cars, doors, and passengers.
//!
//! The selective-collective decision rules (stop test, direction choice, next
//! destination, interrupt test) live here as pure methods on [`Elevator`] so
//! the systems stay thin and the rules stay unit-testable.

use std::collections::BTreeSet;

use bevy_ecs::prelude::{Component, Entity};

use crate::calls::{Direction, Floor};
use crate::clock::ms_to_secs;
use crate::queues::QueueKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarMotionState {
    Idle,
    Moving,
    Decelerating,
    Stopping,
}

impl CarMotionState {
    pub fn label(self) -> &'static str {
        match self {
            CarMotionState::Idle => "IDLE",
            CarMotionState::Moving => "MOVING",
            CarMotionState::Decelerating => "DECELERATING",
            CarMotionState::Stopping => "STOPPING",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "IDLE" => Some(CarMotionState::Idle),
            "MOVING" => Some(CarMotionState::Moving),
            "DECELERATING" => Some(CarMotionState::Decelerating),
            "STOPPING" => Some(CarMotionState::Stopping),
            _ => None,
        }
    }
}

/// Parse a status-record heading back into the tri-state direction.
pub fn direction_from_label(label: &str) -> Option<Option<Direction>> {
    match label {
        "UP" => Some(Some(Direction::Up)),
        "DOWN" => Some(Some(Direction::Down)),
        "NO_DIRECTION" => Some(None),
        _ => None,
    }
}

/// Outcome of the stop test at the head of the car's main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Stop,
    Pass,
    /// A hall call is present but the car is at capacity and bypassing it.
    Bypass(Direction),
}

#[derive(Debug, Component)]
pub struct Elevator {
    pub name: String,
    pub current_floor: Floor,
    /// The floor the car is committed to reaching if it brakes now.
    pub advanced_position: Floor,
    pub direction: Option<Direction>,
    pub state: CarMotionState,
    pub current_destination: Option<Floor>,
    /// Departure floor of the active trip; cruise/brake tables key on it.
    pub trip_start: Floor,
    /// Bumped to invalidate in-flight motion timers on interrupt or abort.
    pub motion_token: u64,
    pub car_calls: BTreeSet<Floor>,
    pub hall_calls_up: BTreeSet<Floor>,
    pub hall_calls_down: BTreeSet<Floor>,
    /// Onboard passengers in boarding order.
    pub onboard: Vec<Entity>,
    pub max_capacity: usize,
    pub full_load_bypass: bool,
    pub home_floor: Floor,
    pub main_direction: Direction,
    /// Floors this car serves; `None` means all floors.
    pub service_floors: Option<BTreeSet<Floor>>,
}

impl Elevator {
    pub fn new(name: String, home_floor: Floor, max_capacity: usize) -> Self {
        Self {
            name,
            current_floor: home_floor,
            advanced_position: home_floor,
            direction: None,
            state: CarMotionState::Idle,
            current_destination: None,
            trip_start: home_floor,
            motion_token: 0,
            car_calls: BTreeSet::new(),
            hall_calls_up: BTreeSet::new(),
            hall_calls_down: BTreeSet::new(),
            onboard: Vec::new(),
            max_capacity,
            full_load_bypass: true,
            home_floor,
            main_direction: Direction::Up,
            service_floors: None,
        }
    }

    pub fn serves(&self, floor: Floor) -> bool {
        self.service_floors
            .as_ref()
            .map_or(true, |floors| floors.contains(&floor))
    }

    pub fn is_full(&self) -> bool {
        self.onboard.len() >= self.max_capacity
    }

    pub fn hall_calls(&self, direction: Direction) -> &BTreeSet<Floor> {
        match direction {
            Direction::Up => &self.hall_calls_up,
            Direction::Down => &self.hall_calls_down,
        }
    }

    pub fn hall_calls_mut(&mut self, direction: Direction) -> &mut BTreeSet<Floor> {
        match direction {
            Direction::Up => &mut self.hall_calls_up,
            Direction::Down => &mut self.hall_calls_down,
        }
    }

    pub fn all_calls(&self) -> BTreeSet<Floor> {
        let mut calls = self.car_calls.clone();
        calls.extend(&self.hall_calls_up);
        calls.extend(&self.hall_calls_down);
        calls
    }

    pub fn has_any_calls(&self) -> bool {
        !self.car_calls.is_empty()
            || !self.hall_calls_up.is_empty()
            || !self.hall_calls_down.is_empty()
    }

    pub fn has_calls_above(&self) -> bool {
        self.all_calls().iter().any(|&f| f > self.current_floor)
    }

    pub fn has_calls_below(&self) -> bool {
        self.all_calls().iter().any(|&f| f < self.current_floor)
    }

    /// Stop test at the current floor. Car calls always stop; hall calls stop
    /// subject to the full-load bypass; at a turnaround extreme the opposite
    /// direction's call counts too.
    pub fn should_stop_here(&self) -> StopDecision {
        if self.car_calls.contains(&self.current_floor) {
            return StopDecision::Stop;
        }
        let bypassing = self.full_load_bypass && self.is_full();
        let bypass_direction = || {
            if self.hall_calls_up.contains(&self.current_floor) {
                Direction::Up
            } else {
                Direction::Down
            }
        };

        match self.direction {
            Some(Direction::Up) => {
                if self.hall_calls_up.contains(&self.current_floor) {
                    return if bypassing {
                        StopDecision::Bypass(Direction::Up)
                    } else {
                        StopDecision::Stop
                    };
                }
                let all = self.all_calls();
                if !self.has_calls_above() && all.last() == Some(&self.current_floor) {
                    return if bypassing {
                        StopDecision::Bypass(bypass_direction())
                    } else {
                        StopDecision::Stop
                    };
                }
                StopDecision::Pass
            }
            Some(Direction::Down) => {
                if self.hall_calls_down.contains(&self.current_floor) {
                    return if bypassing {
                        StopDecision::Bypass(Direction::Down)
                    } else {
                        StopDecision::Stop
                    };
                }
                let all = self.all_calls();
                if !self.has_calls_below() && all.first() == Some(&self.current_floor) {
                    return if bypassing {
                        StopDecision::Bypass(bypass_direction())
                    } else {
                        StopDecision::Stop
                    };
                }
                StopDecision::Pass
            }
            None => {
                let here = self.hall_calls_up.contains(&self.current_floor)
                    || self.hall_calls_down.contains(&self.current_floor);
                if !here {
                    return StopDecision::Pass;
                }
                if bypassing {
                    StopDecision::Bypass(bypass_direction())
                } else {
                    StopDecision::Stop
                }
            }
        }
    }

    /// Selective-collective direction rule. Returns the direction the car
    /// should now hold (possibly unchanged).
    pub fn decide_next_direction(&self) -> Option<Direction> {
        let all = self.all_calls();
        if all.is_empty() {
            return None;
        }

        match self.direction {
            Some(Direction::Up) => {
                if self.has_calls_above() {
                    return Some(Direction::Up);
                }
                if all.last() == Some(&self.current_floor) {
                    // Current floor holds the last remaining call.
                    if self.hall_calls_down.contains(&self.current_floor) {
                        return Some(Direction::Down);
                    }
                    if self.hall_calls_up.contains(&self.current_floor) {
                        return Some(Direction::Up);
                    }
                    return self.direction_toward_remaining_hall_calls(Direction::Up);
                }
                if let Some(&farthest) = all.last() {
                    if self.current_floor > farthest {
                        return Some(Direction::Down);
                    }
                }
                Some(Direction::Up)
            }
            Some(Direction::Down) => {
                if self.has_calls_below() {
                    return Some(Direction::Down);
                }
                if all.first() == Some(&self.current_floor) {
                    if self.hall_calls_up.contains(&self.current_floor) {
                        return Some(Direction::Up);
                    }
                    if self.hall_calls_down.contains(&self.current_floor) {
                        return Some(Direction::Down);
                    }
                    return self.direction_toward_remaining_hall_calls(Direction::Down);
                }
                if let Some(&farthest) = all.first() {
                    if self.current_floor < farthest {
                        return Some(Direction::Up);
                    }
                }
                Some(Direction::Down)
            }
            None => {
                let closest = all
                    .iter()
                    .copied()
                    .min_by_key(|&f| (f.abs_diff(self.current_floor), f))?;
                match closest.cmp(&self.current_floor) {
                    std::cmp::Ordering::Greater => Some(Direction::Up),
                    std::cmp::Ordering::Less => Some(Direction::Down),
                    std::cmp::Ordering::Equal => {
                        if self.hall_calls_up.contains(&self.current_floor) {
                            Some(Direction::Up)
                        } else if self.hall_calls_down.contains(&self.current_floor) {
                            Some(Direction::Down)
                        } else {
                            None
                        }
                    }
                }
            }
        }
    }

    /// The served-out extreme only had a car call: head toward whichever side
    /// still holds hall calls, or drop the direction entirely.
    fn direction_toward_remaining_hall_calls(&self, keep: Direction) -> Option<Direction> {
        let mut hall: BTreeSet<Floor> = self.hall_calls_up.clone();
        hall.extend(&self.hall_calls_down);
        if hall.is_empty() {
            return None;
        }
        let above = hall.iter().any(|&f| f > self.current_floor);
        let below = hall.iter().any(|&f| f < self.current_floor);
        match keep {
            Direction::Up => {
                if below {
                    Some(Direction::Down)
                } else if above {
                    Some(Direction::Up)
                } else {
                    Some(keep)
                }
            }
            Direction::Down => {
                if above {
                    Some(Direction::Up)
                } else if below {
                    Some(Direction::Down)
                } else {
                    Some(keep)
                }
            }
        }
    }

    /// Direction pick when a hall call lands on an idle car. Excludes the
    /// current floor so the next travel direction wins; ties at the current
    /// floor use the hall call's own direction.
    pub fn direction_on_new_call(&self) -> Option<Direction> {
        let all = self.all_calls();
        if all.is_empty() {
            return None;
        }
        let elsewhere: BTreeSet<Floor> = all
            .iter()
            .copied()
            .filter(|&f| f != self.current_floor)
            .collect();
        if let Some(closest) = elsewhere
            .iter()
            .copied()
            .min_by_key(|&f| (f.abs_diff(self.current_floor), f))
        {
            return Direction::between(self.current_floor, closest);
        }
        if self.hall_calls_up.contains(&self.current_floor) {
            Some(Direction::Up)
        } else if self.hall_calls_down.contains(&self.current_floor) {
            Some(Direction::Down)
        } else {
            None
        }
    }

    /// Next destination: nearest call in the current direction, else the
    /// farthest call in the opposite direction.
    pub fn next_stop_floor(&self) -> Option<Floor> {
        match self.direction {
            Some(Direction::Up) => {
                let ahead = self
                    .car_calls
                    .iter()
                    .chain(&self.hall_calls_up)
                    .copied()
                    .filter(|&f| f > self.current_floor)
                    .min();
                ahead.or_else(|| self.all_calls().last().copied())
            }
            Some(Direction::Down) => {
                let ahead = self
                    .car_calls
                    .iter()
                    .chain(&self.hall_calls_down)
                    .copied()
                    .filter(|&f| f < self.current_floor)
                    .max();
                ahead.or_else(|| self.all_calls().first().copied())
            }
            None => None,
        }
    }

    /// Whether a newly assigned hall call should interrupt the active move:
    /// only when the call lies strictly between the car and its destination
    /// in the direction of travel.
    pub fn should_interrupt(&self, new_floor: Floor, new_direction: Direction) -> bool {
        if self.state == CarMotionState::Idle {
            return false;
        }
        let Some(destination) = self.current_destination else {
            return false;
        };
        match (self.direction, new_direction) {
            (Some(Direction::Up), Direction::Up) => {
                self.current_floor < new_floor && new_floor < destination
            }
            (Some(Direction::Down), Direction::Down) => {
                self.current_floor > new_floor && new_floor > destination
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Idle,
    Opening,
    Open,
    Closing,
    Closed,
}

impl DoorState {
    pub fn label(self) -> &'static str {
        match self {
            DoorState::Idle => "IDLE",
            DoorState::Opening => "OPENING",
            DoorState::Open => "OPEN",
            DoorState::Closing => "CLOSING",
            DoorState::Closed => "CLOSED",
        }
    }
}

/// Door of one car. Owns the reopen budget for the current stop; only the
/// CLOSING state accepts an external reopen request.
#[derive(Debug, Component)]
pub struct Door {
    pub state: DoorState,
    pub open_time_ms: u64,
    pub close_time_ms: u64,
    /// Photocell grace period after the queue looks empty.
    pub sensor_timeout_ms: u64,
    pub max_reopens_per_stop: Option<u32>,
    pub reopen_count: u32,
    /// Bumped to invalidate the close timer when a reopen is granted.
    pub close_token: u64,
}

impl Door {
    pub fn new(open_time_ms: u64, close_time_ms: u64, sensor_timeout_ms: u64, max_reopens_per_stop: Option<u32>) -> Self {
        Self {
            state: DoorState::Idle,
            open_time_ms,
            close_time_ms,
            sensor_timeout_ms,
            max_reopens_per_stop,
            reopen_count: 0,
            close_token: 0,
        }
    }

    pub fn reset_for_stop(&mut self) {
        self.reopen_count = 0;
    }

    /// Reopen contract: valid only while CLOSING and under the per-stop cap.
    /// On success the caller interrupts the close timer; the counter is
    /// already incremented.
    pub fn request_reopen(&mut self) -> bool {
        if self.state != DoorState::Closing {
            return false;
        }
        if let Some(max) = self.max_reopens_per_stop {
            if self.reopen_count >= max {
                return false;
            }
        }
        self.reopen_count += 1;
        true
    }
}

/// Phase of the per-stop door protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorPhase {
    /// No stop in progress.
    Idle,
    Opening,
    Exiting,
    Boarding,
    /// A boarder was granted permission; waiting for them to step in.
    AwaitBoarder,
    /// Queue looked empty; photocell grace period running.
    Photocell,
    Closing,
    Reopening,
}

/// Per-stop boarding context. Lives on the car entity permanently; `phase`
/// is `Idle` between stops.
#[derive(Debug, Component)]
pub struct StopWork {
    pub phase: DoorPhase,
    pub floor: Floor,
    /// Passengers to let out, in reverse boarding order.
    pub exits: Vec<Entity>,
    pub queues: Vec<QueueKey>,
    pub queue_idx: usize,
    /// Waiting passengers captured when the door started opening.
    pub snapshot: Vec<Entity>,
    pub boarded: Vec<Entity>,
    pub failed: Vec<Entity>,
    pub served_up: bool,
    pub served_down: bool,
    pub has_car_call_here: bool,
    pub is_dcs_floor: bool,
    pub door_opened_at_ms: u64,
    pub reopen_denied: bool,
}

impl Default for StopWork {
    fn default() -> Self {
        Self {
            phase: DoorPhase::Idle,
            floor: 1,
            exits: Vec::new(),
            queues: Vec::new(),
            queue_idx: 0,
            snapshot: Vec::new(),
            boarded: Vec::new(),
            failed: Vec::new(),
            served_up: false,
            served_down: false,
            has_car_call_here: false,
            is_dcs_floor: false,
            door_opened_at_ms: 0,
            reopen_denied: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Journey {
    pub from: Floor,
    pub to: Floor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassengerPhase {
    /// Spawned, journey not yet begun.
    Pending,
    /// DCS: destination registered, waiting for the dispatcher's pick.
    AwaitingAssignment,
    /// In a floor queue waiting for a door permission.
    Waiting,
    /// DCS: left behind at capacity; heading back to the panel.
    ReRegistering,
    /// Permission granted; stepping into the car.
    Boarding,
    Riding,
    /// Exit permission granted; stepping out.
    Alighting,
    /// Short pause before the next journey of a multi-stop itinerary.
    BetweenJourneys,
    Done,
}

#[derive(Debug, Component)]
pub struct Passenger {
    pub name: String,
    pub move_speed_ms: u64,
    pub journeys: Vec<Journey>,
    pub journey_idx: usize,
    pub phase: PassengerPhase,
    /// DCS only: the car the dispatcher assigned for the current journey.
    pub assigned_car: Option<Entity>,
    pub boarded_car: Option<Entity>,
    pub waiting_start_ms: Option<u64>,
    pub door_open_ms: Option<u64>,
    pub boarding_ms: Option<u64>,
    pub alighting_ms: Option<u64>,
}

impl Passenger {
    pub fn new(name: String, move_speed_ms: u64, journeys: Vec<Journey>) -> Self {
        Self {
            name,
            move_speed_ms,
            journeys,
            journey_idx: 0,
            phase: PassengerPhase::Pending,
            assigned_car: None,
            boarded_car: None,
            waiting_start_ms: None,
            door_open_ms: None,
            boarding_ms: None,
            alighting_ms: None,
        }
    }

    pub fn current_journey(&self) -> Journey {
        self.journeys[self.journey_idx.min(self.journeys.len() - 1)]
    }

    pub fn destination(&self) -> Floor {
        self.current_journey().to
    }

    /// Reset the per-journey timestamps before the next leg of a multi-stop
    /// itinerary.
    pub fn reset_journey_metrics(&mut self) {
        self.waiting_start_ms = None;
        self.door_open_ms = None;
        self.boarding_ms = None;
        self.boarded_car = None;
        self.assigned_car = None;
    }

    /// Wait from hall arrival to door opening, floored at zero (the door may
    /// already have been open).
    pub fn wait_to_door_open_secs(&self) -> Option<f64> {
        let start = self.waiting_start_ms?;
        let open = self.door_open_ms?;
        Some(ms_to_secs(open.saturating_sub(start)))
    }

    pub fn wait_to_boarding_secs(&self) -> Option<f64> {
        let start = self.waiting_start_ms?;
        let boarding = self.boarding_ms?;
        Some(ms_to_secs(boarding.saturating_sub(start)))
    }

    pub fn riding_time_secs(&self) -> Option<f64> {
        let boarding = self.boarding_ms?;
        let alighting = self.alighting_ms?;
        Some(ms_to_secs(alighting.saturating_sub(boarding)))
    }

    pub fn total_journey_secs(&self) -> Option<f64> {
        let start = self.waiting_start_ms?;
        let alighting = self.alighting_ms?;
        Some(ms_to_secs(alighting.saturating_sub(start)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car() -> Elevator {
        Elevator::new("Elevator_1".to_string(), 1, 10)
    }

    #[test]
    fn stops_for_car_calls_regardless_of_direction() {
        let mut e = car();
        e.current_floor = 4;
        e.direction = Some(Direction::Down);
        e.car_calls.insert(4);
        assert_eq!(e.should_stop_here(), StopDecision::Stop);
    }

    #[test]
    fn stops_for_hall_call_in_direction_of_travel() {
        let mut e = car();
        e.current_floor = 4;
        e.direction = Some(Direction::Up);
        e.hall_calls_up.insert(4);
        assert_eq!(e.should_stop_here(), StopDecision::Stop);

        // A DOWN call at a floor with more UP work ahead is passed.
        let mut e = car();
        e.current_floor = 4;
        e.direction = Some(Direction::Up);
        e.hall_calls_down.insert(4);
        e.car_calls.insert(8);
        assert_eq!(e.should_stop_here(), StopDecision::Pass);
    }

    #[test]
    fn stops_for_opposite_call_at_turnaround_extreme() {
        let mut e = car();
        e.current_floor = 9;
        e.direction = Some(Direction::Up);
        e.hall_calls_down.insert(9);
        assert_eq!(e.should_stop_here(), StopDecision::Stop);
    }

    #[test]
    fn full_car_bypasses_hall_calls_but_not_car_calls() {
        let mut e = car();
        e.max_capacity = 1;
        e.onboard.push(Entity::from_raw(500));
        e.current_floor = 5;
        e.direction = Some(Direction::Up);
        e.hall_calls_up.insert(5);
        e.car_calls.insert(9);
        assert_eq!(e.should_stop_here(), StopDecision::Bypass(Direction::Up));

        e.car_calls.insert(5);
        assert_eq!(e.should_stop_here(), StopDecision::Stop);
    }

    #[test]
    fn keeps_direction_while_calls_remain_ahead() {
        let mut e = car();
        e.current_floor = 3;
        e.direction = Some(Direction::Up);
        e.car_calls.insert(7);
        e.hall_calls_down.insert(2);
        assert_eq!(e.decide_next_direction(), Some(Direction::Up));
    }

    #[test]
    fn reverses_at_extreme_with_opposite_hall_call() {
        let mut e = car();
        e.current_floor = 9;
        e.direction = Some(Direction::Up);
        e.hall_calls_down.insert(9);
        assert_eq!(e.decide_next_direction(), Some(Direction::Down));
    }

    #[test]
    fn drops_direction_when_no_calls_remain() {
        let mut e = car();
        e.direction = Some(Direction::Up);
        assert_eq!(e.decide_next_direction(), None);
    }

    #[test]
    fn idle_car_heads_for_the_closest_call() {
        let mut e = car();
        e.current_floor = 5;
        e.hall_calls_down.insert(7);
        e.hall_calls_up.insert(1);
        assert_eq!(e.decide_next_direction(), Some(Direction::Up));
    }

    #[test]
    fn idle_tie_at_current_floor_uses_hall_call_direction() {
        let mut e = car();
        e.current_floor = 5;
        e.hall_calls_down.insert(5);
        assert_eq!(e.decide_next_direction(), Some(Direction::Down));
    }

    #[test]
    fn next_stop_prefers_nearest_in_direction() {
        let mut e = car();
        e.current_floor = 2;
        e.direction = Some(Direction::Up);
        e.car_calls.insert(9);
        e.hall_calls_up.insert(6);
        assert_eq!(e.next_stop_floor(), Some(6));
    }

    #[test]
    fn next_stop_falls_back_to_farthest_opposite() {
        let mut e = car();
        e.current_floor = 8;
        e.direction = Some(Direction::Up);
        e.hall_calls_down.insert(3);
        e.hall_calls_down.insert(6);
        assert_eq!(e.next_stop_floor(), Some(6));
    }

    #[test]
    fn interrupts_only_for_calls_on_the_way() {
        let mut e = car();
        e.current_floor = 3;
        e.direction = Some(Direction::Up);
        e.state = CarMotionState::Moving;
        e.current_destination = Some(10);
        assert!(e.should_interrupt(6, Direction::Up));
        assert!(!e.should_interrupt(2, Direction::Up));
        assert!(!e.should_interrupt(6, Direction::Down));
        assert!(!e.should_interrupt(10, Direction::Up));
    }

    #[test]
    fn door_reopen_budget_is_enforced() {
        let mut door = Door::new(1500, 1500, 1000, Some(1));
        door.state = DoorState::Closing;
        assert!(door.request_reopen());
        door.state = DoorState::Closing;
        assert!(!door.request_reopen());
        door.reset_for_stop();
        door.state = DoorState::Closing;
        assert!(door.request_reopen());
        // Not closing: always denied.
        door.state = DoorState::Open;
        assert!(!door.request_reopen());
    }

    #[test]
    fn passenger_metrics_derive_from_timestamps() {
        let mut p = Passenger::new("Passenger_1".to_string(), 1000, vec![Journey { from: 2, to: 10 }]);
        p.waiting_start_ms = Some(6000);
        p.door_open_ms = Some(20_000);
        p.boarding_ms = Some(22_000);
        p.alighting_ms = Some(40_000);
        assert_eq!(p.wait_to_door_open_secs(), Some(14.0));
        assert_eq!(p.wait_to_boarding_secs(), Some(16.0));
        assert_eq!(p.riding_time_secs(), Some(18.0));
        assert_eq!(p.total_journey_secs(), Some(34.0));
    }

    #[test]
    fn door_open_before_arrival_clamps_to_zero() {
        let mut p = Passenger::new("Passenger_1".to_string(), 1000, vec![Journey { from: 2, to: 5 }]);
        p.waiting_start_ms = Some(6000);
        p.door_open_ms = Some(5000);
        assert_eq!(p.wait_to_door_open_secs(), Some(0.0));
    }
}
