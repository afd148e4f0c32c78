//! Earliest-arrival allocation: ranks cars by the arrival-time predictor.
//!
//! Cars the predictor deems unsafe or unreachable are scored as if the call
//! were appended to their projected sequence end; when nothing is scoreable
//! the strategy abstains and the dispatcher falls back.

use crate::calls::{CallData, Direction};
use crate::gcs::allocation::{AllocationStrategy, DispatchContext};
use crate::gcs::predictor::ArrivalTimePredictor;
use crate::gcs::CarStatusSnapshot;

#[derive(Debug, Clone, Default)]
pub struct EarliestArrival {
    /// Override for the predictor's assignment safety margin, ms.
    pub safety_margin_ms: Option<u64>,
}

impl AllocationStrategy for EarliestArrival {
    fn select_car(
        &self,
        call: &CallData,
        statuses: &[(String, CarStatusSnapshot)],
        ctx: &DispatchContext<'_>,
    ) -> Option<String> {
        let target_direction = call.service_direction().unwrap_or(Direction::Up);
        let mut predictor = ArrivalTimePredictor::new(ctx.tables, ctx.num_floors);
        if let Some(margin) = self.safety_margin_ms {
            predictor = predictor.with_safety_margin(margin);
        }

        let mut best: Option<(&str, u64)> = None;
        for (name, snapshot) in statuses {
            let eta = predictor
                .predict_arrival(snapshot, call.floor, target_direction)
                .unwrap_or_else(|| {
                    // Not already on the projected route: ride out the current
                    // sequence, then travel from its last stop.
                    let stops = predictor.stop_sequence(snapshot);
                    let (from, elapsed) = stops
                        .last()
                        .map(|s| (s.floor, s.cumulative_ms + ctx.tables.stop_time_ms()))
                        .unwrap_or((snapshot.current_floor, 0));
                    elapsed + ctx.tables.total_ms(from, call.floor)
                });
            let better = match best {
                None => true,
                Some((_, best_eta)) => eta < best_eta,
            };
            if better {
                best = Some((name, eta));
            }
        }
        best.map(|(name, _)| name.to_string())
    }

    fn name(&self) -> &'static str {
        "EarliestArrival"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::{CallType, Floor};
    use crate::gcs::snapshot_at;
    use crate::physics::FlightTables;

    fn tables() -> FlightTables {
        let elevations: Vec<f64> = (0..10).map(|i| i as f64 * 3.5).collect();
        FlightTables::precompute(&elevations, 2.5, 1.0, 2.0)
    }

    fn call_up(floor: Floor) -> CallData {
        CallData {
            floor,
            direction: Some(Direction::Up),
            destination: None,
            call_type: CallType::Traditional,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn closer_idle_car_wins() {
        let tables = tables();
        let ctx = DispatchContext { tables: &tables, num_floors: 10, now_ms: 0 };
        let strategy = EarliestArrival::default();
        let statuses = vec![
            ("Elevator_1".to_string(), snapshot_at(9)),
            ("Elevator_2".to_string(), snapshot_at(4)),
        ];
        let picked = strategy.select_car(&call_up(3), &statuses, &ctx);
        assert_eq!(picked.as_deref(), Some("Elevator_2"));
    }

    #[test]
    fn busy_car_pays_for_its_pending_stops() {
        let tables = tables();
        let ctx = DispatchContext { tables: &tables, num_floors: 10, now_ms: 0 };
        let strategy = EarliestArrival::default();
        let mut busy = snapshot_at(3);
        busy.car_calls.extend([8, 9, 10]);
        let statuses = vec![
            ("Elevator_1".to_string(), busy),
            ("Elevator_2".to_string(), snapshot_at(7)),
        ];
        // Call at 2 UP: Elevator_1 must finish three stops first.
        let picked = strategy.select_car(&call_up(2), &statuses, &ctx);
        assert_eq!(picked.as_deref(), Some("Elevator_2"));
    }
}
