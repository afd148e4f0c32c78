//! Flight-time tables precomputed from the jerk-limited kinematic model.
//!
//! For every (from, to) pair the tables answer three questions: how long the
//! whole flight takes, how long each one-floor cruise slice of that flight
//! lasts, and how long the final brake takes. Cruise and brake entries are
//! keyed by the **trip start floor**, so that for any trip
//! Σ cruise(start, k) + brake(start, to) = total(start, to) within rounding.
//! Tables failing that identity are rejected at startup.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;
use tracing::warn;

use crate::calls::Floor;
use crate::clock::secs_to_ms;
use crate::config::ConfigError;

/// Response and start delay before the car actually moves, seconds.
const START_DELAY_SECS: f64 = 0.2;
/// Minimum cruise slice, ms. Keeps degenerate one-floor hops schedulable.
const MIN_CRUISE_MS: u64 = 50;
/// Conservative fallback when a pair is missing from the tables: 3 s/floor.
const FALLBACK_SECS_PER_FLOOR: f64 = 3.0;

#[derive(Debug, Clone, Resource)]
pub struct FlightTables {
    num_floors: Floor,
    total: BTreeMap<(Floor, Floor), u64>,
    cruise: BTreeMap<(Floor, Floor), u64>,
    brake: BTreeMap<(Floor, Floor), u64>,
    stop_time_ms: u64,
}

impl FlightTables {
    /// Precompute all pairs from floor elevations (metres above floor 1) and
    /// the kinematic limits of the drive.
    pub fn precompute(
        elevations: &[f64],
        rated_speed: f64,
        acceleration: f64,
        jerk: f64,
    ) -> Self {
        let num_floors = elevations.len() as Floor;
        let mut tables = Self {
            num_floors,
            total: BTreeMap::new(),
            cruise: BTreeMap::new(),
            brake: BTreeMap::new(),
            stop_time_ms: 5 * 1000,
        };

        for start in 1..=num_floors {
            // Upward trips from `start`: cruise slices accumulate so that the
            // slice ending at j covers total(start, j) minus everything spent
            // cruising to j-1 and the final brake.
            let mut cruise_acc_ms: u64 = 0;
            for to in (start + 1)..=num_floors {
                let span = (elevations[(to - 1) as usize] - elevations[(start - 1) as usize]).abs();
                let (total_s, vel) = flight_time_secs(span, rated_speed, acceleration, jerk);
                let brake_ms = secs_to_ms(brake_time_secs(vel, acceleration, jerk));
                let total_ms = secs_to_ms(total_s);
                let cruise_ms = total_ms
                    .saturating_sub(cruise_acc_ms)
                    .saturating_sub(brake_ms)
                    .max(MIN_CRUISE_MS);
                tables.cruise.insert((start, to), cruise_ms);
                tables.brake.insert((start, to), brake_ms);
                tables.total.insert((start, to), cruise_acc_ms + cruise_ms + brake_ms);
                cruise_acc_ms += cruise_ms;
            }

            let mut cruise_acc_ms: u64 = 0;
            for to in (1..start).rev() {
                let span = (elevations[(to - 1) as usize] - elevations[(start - 1) as usize]).abs();
                let (total_s, vel) = flight_time_secs(span, rated_speed, acceleration, jerk);
                let brake_ms = secs_to_ms(brake_time_secs(vel, acceleration, jerk));
                let total_ms = secs_to_ms(total_s);
                let cruise_ms = total_ms
                    .saturating_sub(cruise_acc_ms)
                    .saturating_sub(brake_ms)
                    .max(MIN_CRUISE_MS);
                tables.cruise.insert((start, to), cruise_ms);
                tables.brake.insert((start, to), brake_ms);
                tables.total.insert((start, to), cruise_acc_ms + cruise_ms + brake_ms);
                cruise_acc_ms += cruise_ms;
            }
        }

        tables
    }

    pub fn num_floors(&self) -> Floor {
        self.num_floors
    }

    /// Dwell estimate used by the arrival-time predictor, ms.
    pub fn stop_time_ms(&self) -> u64 {
        self.stop_time_ms
    }

    pub fn set_stop_time_ms(&mut self, stop_time_ms: u64) {
        self.stop_time_ms = stop_time_ms;
    }

    fn fallback_ms(&self, from: Floor, to: Floor) -> u64 {
        secs_to_ms(FALLBACK_SECS_PER_FLOOR * from.abs_diff(to) as f64)
    }

    /// Total flight time for (from, to), ms. Missing pairs are logged and
    /// replaced by a conservative estimate.
    pub fn total_ms(&self, from: Floor, to: Floor) -> u64 {
        if from == to {
            return 0;
        }
        match self.total.get(&(from, to)) {
            Some(ms) => *ms,
            None => {
                warn!(from, to, "no flight time for pair, using conservative estimate");
                self.fallback_ms(from, to)
            }
        }
    }

    /// Cruise slice ending at `next` for a trip that departed `trip_start`, ms.
    pub fn cruise_ms(&self, trip_start: Floor, next: Floor) -> u64 {
        match self.cruise.get(&(trip_start, next)) {
            Some(ms) => *ms,
            None => {
                warn!(trip_start, next, "no cruise time for pair, using conservative estimate");
                self.fallback_ms(trip_start, next).max(MIN_CRUISE_MS)
            }
        }
    }

    /// Brake slice for a trip from `trip_start` to `to`, ms.
    pub fn brake_ms(&self, trip_start: Floor, to: Floor) -> u64 {
        match self.brake.get(&(trip_start, to)) {
            Some(ms) => *ms,
            None => {
                warn!(trip_start, to, "no brake time for pair, using conservative estimate");
                MIN_CRUISE_MS
            }
        }
    }

    /// Verify the cruise/brake decomposition against the totals. Tables are
    /// rejected when any trip disagrees by more than 1 ms per segment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (&(start, to), &total_ms) in &self.total {
            let step: i64 = if to > start { 1 } else { -1 };
            let mut sum: u64 = self.brake_ms(start, to);
            let mut next = start as i64 + step;
            let mut segments: u64 = 1;
            loop {
                sum += self.cruise_ms(start, next as Floor);
                segments += 1;
                if next == to as i64 {
                    break;
                }
                next += step;
            }
            if sum.abs_diff(total_ms) > segments {
                return Err(ConfigError::Invalid(format!(
                    "inconsistent flight table for {start}->{to}: segments sum to {sum} ms, total is {total_ms} ms"
                )));
            }
        }
        Ok(())
    }
}

/// Practical flight time for a span in metres: jerk-limited acceleration to
/// either the rated speed or the highest speed reachable over the span, plus
/// start delay. Returns (seconds, peak velocity m/s).
fn flight_time_secs(span: f64, rated_speed: f64, acceleration: f64, jerk: f64) -> (f64, f64) {
    if span <= f64::EPSILON {
        return (0.1, 0.0);
    }
    let t = acceleration * acceleration / (2.0 * jerk);
    let optimal_vel = (t * t + acceleration * span).sqrt() - t;
    let vel = optimal_vel.min(rated_speed);

    let accel_time = vel / acceleration;
    let jerk_time = acceleration / jerk;
    let travel_time = span / vel;

    let total = START_DELAY_SECS + travel_time + accel_time + jerk_time;
    (total.max(0.1), vel)
}

/// Brake time from peak velocity: symmetric with the acceleration ramp.
fn brake_time_secs(vel: f64, acceleration: f64, jerk: f64) -> f64 {
    if vel <= f64::EPSILON {
        return 0.1;
    }
    (vel / acceleration + acceleration / jerk).max(0.1)
}
