//! Arrival-time prediction: replays a car's future stop sequence against the
//! flight tables.
//!
//! The predictor is a pure calculation over a status snapshot. It consumes
//! calls with the same rules the car itself uses (car calls always, the
//! service direction's hall call, both directions at terminal floors), so the
//! projected sequence matches what the car will actually drive.

use std::collections::BTreeSet;

use crate::calls::{Direction, Floor};
use crate::gcs::CarStatusSnapshot;
use crate::physics::FlightTables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPrediction {
    pub floor: Floor,
    pub direction: Direction,
    /// Offset from now, ms, at which the car arrives at this stop.
    pub cumulative_ms: u64,
}

pub struct ArrivalTimePredictor<'a> {
    tables: &'a FlightTables,
    num_floors: Floor,
    /// Assignments are unsafe when the remaining dwell is shorter than this.
    safety_margin_ms: u64,
}

impl<'a> ArrivalTimePredictor<'a> {
    pub fn new(tables: &'a FlightTables, num_floors: Floor) -> Self {
        Self {
            tables,
            num_floors,
            safety_margin_ms: 1500,
        }
    }

    pub fn with_safety_margin(mut self, safety_margin_ms: u64) -> Self {
        self.safety_margin_ms = safety_margin_ms;
        self
    }

    /// Time offset from now until the car serves (floor, direction), or
    /// `None` when unreachable or unsafe to assign.
    pub fn predict_arrival(
        &self,
        snapshot: &CarStatusSnapshot,
        target_floor: Floor,
        target_direction: Direction,
    ) -> Option<u64> {
        let is_moving = snapshot.direction.is_some();
        let remaining_dwell = if is_moving { 0 } else { self.tables.stop_time_ms() };
        if is_moving || remaining_dwell <= self.safety_margin_ms {
            return None;
        }

        if snapshot.current_floor == target_floor && snapshot.direction == Some(target_direction) {
            return Some(remaining_dwell);
        }

        self.stop_sequence(snapshot)
            .into_iter()
            .find(|stop| stop.floor == target_floor && stop.direction == target_direction)
            .map(|stop| stop.cumulative_ms)
    }

    /// Project the stop sequence from the snapshot's calls.
    pub fn stop_sequence(&self, snapshot: &CarStatusSnapshot) -> Vec<StopPrediction> {
        let mut car_calls = snapshot.car_calls.clone();
        let mut hall_up = snapshot.hall_calls_up.clone();
        let mut hall_down = snapshot.hall_calls_down.clone();

        let mut floor = snapshot.current_floor;
        let mut direction = snapshot.direction.unwrap_or_else(|| {
            initial_direction(floor, &car_calls, &hall_up, &hall_down)
        });

        let mut predictions = Vec::new();
        let mut cumulative_ms: u64 = 0;
        let max_iterations = self.num_floors as usize * 4;

        for _ in 0..max_iterations {
            if car_calls.is_empty() && hall_up.is_empty() && hall_down.is_empty() {
                break;
            }
            let next = match find_next_stop(floor, direction, &car_calls, &hall_up, &hall_down) {
                Some(next) => next,
                None => {
                    direction = direction.opposite();
                    match find_next_stop(floor, direction, &car_calls, &hall_up, &hall_down) {
                        Some(next) => next,
                        None => break,
                    }
                }
            };

            cumulative_ms += self.tables.total_ms(floor, next);
            let service_direction = if next == self.num_floors {
                Direction::Down
            } else if next == 1 {
                Direction::Up
            } else {
                direction
            };
            predictions.push(StopPrediction {
                floor: next,
                direction: service_direction,
                cumulative_ms,
            });
            cumulative_ms += self.tables.stop_time_ms();

            consume_calls(
                next,
                service_direction,
                self.num_floors,
                &mut car_calls,
                &mut hall_up,
                &mut hall_down,
            );
            floor = next;
        }

        predictions
    }
}

fn initial_direction(
    floor: Floor,
    car_calls: &BTreeSet<Floor>,
    hall_up: &BTreeSet<Floor>,
    hall_down: &BTreeSet<Floor>,
) -> Direction {
    let above = car_calls
        .iter()
        .chain(hall_up)
        .chain(hall_down)
        .any(|&f| f > floor);
    if above {
        Direction::Up
    } else {
        let below = car_calls
            .iter()
            .chain(hall_up)
            .chain(hall_down)
            .any(|&f| f < floor);
        if below {
            Direction::Down
        } else {
            Direction::Up
        }
    }
}

fn find_next_stop(
    floor: Floor,
    direction: Direction,
    car_calls: &BTreeSet<Floor>,
    hall_up: &BTreeSet<Floor>,
    hall_down: &BTreeSet<Floor>,
) -> Option<Floor> {
    match direction {
        Direction::Up => car_calls
            .iter()
            .chain(hall_up)
            .copied()
            .filter(|&f| f > floor)
            .min(),
        Direction::Down => car_calls
            .iter()
            .chain(hall_down)
            .copied()
            .filter(|&f| f < floor)
            .max(),
    }
}

fn consume_calls(
    floor: Floor,
    direction: Direction,
    num_floors: Floor,
    car_calls: &mut BTreeSet<Floor>,
    hall_up: &mut BTreeSet<Floor>,
    hall_down: &mut BTreeSet<Floor>,
) {
    car_calls.remove(&floor);
    match direction {
        Direction::Up => hall_up.remove(&floor),
        Direction::Down => hall_down.remove(&floor),
    };
    // Terminal floors serve both directions.
    if floor == num_floors || floor == 1 {
        hall_up.remove(&floor);
        hall_down.remove(&floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcs::snapshot_at;

    fn tables() -> FlightTables {
        let elevations: Vec<f64> = (0..10).map(|i| i as f64 * 3.5).collect();
        FlightTables::precompute(&elevations, 2.5, 1.0, 2.0)
    }

    #[test]
    fn projects_up_stops_in_floor_order() {
        let tables = tables();
        let predictor = ArrivalTimePredictor::new(&tables, 10);
        let mut snap = snapshot_at(1);
        snap.car_calls.insert(4);
        snap.hall_calls_up.insert(7);

        let stops = predictor.stop_sequence(&snap);
        let floors: Vec<Floor> = stops.iter().map(|s| s.floor).collect();
        assert_eq!(floors, vec![4, 7]);
        assert!(stops[1].cumulative_ms > stops[0].cumulative_ms);
    }

    #[test]
    fn reverses_for_opposite_calls() {
        let tables = tables();
        let predictor = ArrivalTimePredictor::new(&tables, 10);
        let mut snap = snapshot_at(5);
        snap.hall_calls_up.insert(8);
        snap.hall_calls_down.insert(3);

        let floors: Vec<Floor> = predictor.stop_sequence(&snap).iter().map(|s| s.floor).collect();
        assert_eq!(floors, vec![8, 3]);
    }

    #[test]
    fn terminal_floor_serves_both_directions() {
        let tables = tables();
        let predictor = ArrivalTimePredictor::new(&tables, 10);
        let mut snap = snapshot_at(5);
        snap.hall_calls_up.insert(10);
        snap.hall_calls_down.insert(10);

        let stops = predictor.stop_sequence(&snap);
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].floor, 10);
        assert_eq!(stops[0].direction, Direction::Down);
    }

    #[test]
    fn moving_cars_are_unsafe_to_assign() {
        let tables = tables();
        let predictor = ArrivalTimePredictor::new(&tables, 10);
        let mut snap = snapshot_at(5);
        snap.direction = Some(Direction::Up);
        snap.hall_calls_up.insert(8);
        assert_eq!(predictor.predict_arrival(&snap, 8, Direction::Up), None);
    }

    #[test]
    fn unreachable_targets_predict_none() {
        let tables = tables();
        let predictor = ArrivalTimePredictor::new(&tables, 10);
        let mut snap = snapshot_at(5);
        snap.hall_calls_up.insert(8);
        // The projected sequence never serves (2, DOWN).
        assert_eq!(predictor.predict_arrival(&snap, 2, Direction::Down), None);
    }

    #[test]
    fn idle_car_with_call_predicts_travel_time() {
        let tables = tables();
        let predictor = ArrivalTimePredictor::new(&tables, 10);
        let mut snap = snapshot_at(2);
        snap.hall_calls_up.insert(6);
        let eta = predictor.predict_arrival(&snap, 6, Direction::Up).expect("eta");
        assert_eq!(eta, tables.total_ms(2, 6));
    }
}
