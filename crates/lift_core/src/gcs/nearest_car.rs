//! Nearest-car allocation: circular-distance scoring.
//!
//! A car moving UP serves the shaft as a ring: calls ahead in its direction
//! cost their floor distance, everything else costs the round trip over the
//! terminal floor. Full cars carry a large penalty so they are only chosen
//! when nothing else exists.

use crate::calls::{CallData, Direction, Floor};
use crate::gcs::allocation::{AllocationStrategy, DispatchContext};
use crate::gcs::CarStatusSnapshot;

/// Score penalty for a car at capacity.
const FULL_CAR_PENALTY: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct NearestCar {
    pub num_floors: Floor,
}

impl NearestCar {
    pub fn new(num_floors: Floor) -> Self {
        Self { num_floors }
    }

    fn circular_distance(
        &self,
        virtual_floor: Floor,
        direction: Option<Direction>,
        call_floor: Floor,
        call_direction: Direction,
    ) -> f64 {
        match direction {
            None => virtual_floor.abs_diff(call_floor) as f64,
            Some(Direction::Up) => {
                if call_direction == Direction::Up && call_floor >= virtual_floor {
                    (call_floor - virtual_floor) as f64
                } else {
                    // Up to the top, then back down to the call.
                    ((self.num_floors - virtual_floor) + (self.num_floors - call_floor)) as f64
                }
            }
            Some(Direction::Down) => {
                if call_direction == Direction::Down && call_floor <= virtual_floor {
                    (virtual_floor - call_floor) as f64
                } else {
                    // Down to floor 1, then back up to the call.
                    ((virtual_floor - 1) + (call_floor - 1)) as f64
                }
            }
        }
    }

    fn score(&self, snapshot: &CarStatusSnapshot, call: &CallData) -> f64 {
        let call_direction = call.service_direction().unwrap_or(Direction::Up);
        let mut score = self.circular_distance(
            snapshot.advanced_position,
            snapshot.direction,
            call.floor,
            call_direction,
        );
        if snapshot.is_full() {
            score += FULL_CAR_PENALTY;
        }
        score
    }
}

impl AllocationStrategy for NearestCar {
    fn select_car(
        &self,
        call: &CallData,
        statuses: &[(String, CarStatusSnapshot)],
        _ctx: &DispatchContext<'_>,
    ) -> Option<String> {
        let mut best: Option<(&str, f64)> = None;
        for (name, snapshot) in statuses {
            let score = self.score(snapshot, call);
            let better = match best {
                None => true,
                Some((_, best_score)) => score < best_score,
            };
            if better {
                best = Some((name, score));
            }
        }
        best.map(|(name, _)| name.to_string())
    }

    fn name(&self) -> &'static str {
        "NearestCar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::CallType;
    use crate::gcs::snapshot_at;
    use crate::physics::FlightTables;

    fn call_up(floor: Floor) -> CallData {
        CallData {
            floor,
            direction: Some(Direction::Up),
            destination: None,
            call_type: CallType::Traditional,
            timestamp_ms: 0,
        }
    }

    fn ctx(tables: &FlightTables) -> DispatchContext<'_> {
        DispatchContext { tables, num_floors: 10, now_ms: 0 }
    }

    fn tables() -> FlightTables {
        let elevations: Vec<f64> = (0..10).map(|i| i as f64 * 3.5).collect();
        FlightTables::precompute(&elevations, 2.5, 1.0, 2.0)
    }

    #[test]
    fn idle_car_scores_plain_distance() {
        let strategy = NearestCar::new(10);
        let statuses = vec![
            ("Elevator_1".to_string(), snapshot_at(1)),
            ("Elevator_2".to_string(), snapshot_at(6)),
        ];
        let tables = tables();
        let picked = strategy.select_car(&call_up(5), &statuses, &ctx(&tables));
        assert_eq!(picked.as_deref(), Some("Elevator_2"));
    }

    #[test]
    fn car_moving_away_pays_the_round_trip() {
        let strategy = NearestCar::new(10);
        let mut moving_down = snapshot_at(4);
        moving_down.direction = Some(Direction::Down);
        // 4 -> 1 -> 8 = 3 + 7 = 10; the idle car at 9 costs |9-8| = 1.
        let statuses = vec![
            ("Elevator_1".to_string(), moving_down),
            ("Elevator_2".to_string(), snapshot_at(9)),
        ];
        let tables = tables();
        let picked = strategy.select_car(&call_up(8), &statuses, &ctx(&tables));
        assert_eq!(picked.as_deref(), Some("Elevator_2"));
    }

    #[test]
    fn up_car_picks_up_calls_on_its_way() {
        let strategy = NearestCar::new(10);
        let mut moving_up = snapshot_at(2);
        moving_up.direction = Some(Direction::Up);
        let statuses = vec![
            ("Elevator_1".to_string(), moving_up),
            ("Elevator_2".to_string(), snapshot_at(10)),
        ];
        let tables = tables();
        // Call at 5 UP: on the way for Elevator_1 (cost 3) vs idle at distance 5.
        let picked = strategy.select_car(&call_up(5), &statuses, &ctx(&tables));
        assert_eq!(picked.as_deref(), Some("Elevator_1"));
    }

    #[test]
    fn full_cars_lose_unless_alone() {
        let strategy = NearestCar::new(10);
        let mut full = snapshot_at(5);
        full.passengers = full.max_capacity;
        let statuses = vec![
            ("Elevator_1".to_string(), full.clone()),
            ("Elevator_2".to_string(), snapshot_at(10)),
        ];
        let tables = tables();
        let picked = strategy.select_car(&call_up(5), &statuses, &ctx(&tables));
        assert_eq!(picked.as_deref(), Some("Elevator_2"));

        let lone = vec![("Elevator_1".to_string(), full)];
        let picked = strategy.select_car(&call_up(5), &lone, &ctx(&tables));
        assert_eq!(picked.as_deref(), Some("Elevator_1"));
    }

    #[test]
    fn ties_break_by_registration_order() {
        let strategy = NearestCar::new(10);
        let statuses = vec![
            ("Elevator_1".to_string(), snapshot_at(3)),
            ("Elevator_2".to_string(), snapshot_at(7)),
        ];
        let tables = tables();
        let picked = strategy.select_car(&call_up(5), &statuses, &ctx(&tables));
        assert_eq!(picked.as_deref(), Some("Elevator_1"));
    }
}
