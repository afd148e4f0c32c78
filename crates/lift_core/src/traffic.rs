//! Passenger traffic source: seeded inter-arrival sampling and
//! origin/destination selection per traffic pattern.
//!
//! The spawner reacts to SimulationStarted, schedules its own spawn events,
//! and stops once the configured duration has elapsed. All sampling goes
//! through an `StdRng` reseeded per draw from (seed, counter), so runs are
//! reproducible regardless of event interleaving.

use bevy_ecs::prelude::Resource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::calls::Floor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficPattern {
    /// Uniform origin and destination.
    Uniform,
    /// Most journeys start at the lobby.
    MorningRush,
    /// Two-way traffic centered on the lobby.
    Lunch,
    /// Most journeys end at the lobby.
    Evening,
}

/// Probability that a rush-pattern journey touches the lobby.
const RUSH_LOBBY_BIAS: f64 = 0.8;
const LUNCH_LOBBY_BIAS: f64 = 0.5;

#[derive(Debug, Clone, Resource)]
pub struct PassengerSpawner {
    pub pattern: TrafficPattern,
    /// Expected passengers per second.
    pub rate_per_sec: f64,
    /// Spawning stops at this simulation time (ms).
    pub end_time_ms: u64,
    /// Optional origin-destination weights, `od[from-1][to-1]`.
    pub od_matrix: Option<Vec<Vec<f64>>>,
    pub num_floors: Floor,
    pub lobby_floor: Floor,
    pub seed: u64,
    /// Default per-passenger boarding/alighting pace, ms.
    pub move_speed_ms: u64,
    pub spawned: u64,
}

impl PassengerSpawner {
    /// Sample the next inter-arrival time in ms. A fresh RNG per draw keeps
    /// the sequence independent of query order.
    pub fn sample_inter_arrival_ms(&self) -> f64 {
        if self.rate_per_sec <= 0.0 {
            return f64::INFINITY;
        }
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.spawned));
        let u: f64 = rng.gen::<f64>().max(1e-10);
        -u.ln() / self.rate_per_sec * 1000.0
    }

    /// Sample a journey. The OD matrix, when present, overrides the pattern.
    pub fn sample_journey(&self) -> (Floor, Floor) {
        let mut rng = StdRng::seed_from_u64(
            self.seed.wrapping_mul(0x9e37_79b9_7f4a_7c15).wrapping_add(self.spawned),
        );
        if let Some(od) = &self.od_matrix {
            if let Some(pair) = sample_od_pair(od, &mut rng) {
                return pair;
            }
        }
        match self.pattern {
            TrafficPattern::Uniform => {
                let from = rng.gen_range(1..=self.num_floors);
                (from, self.other_floor(&mut rng, from))
            }
            TrafficPattern::MorningRush => {
                if rng.gen::<f64>() < RUSH_LOBBY_BIAS {
                    let to = self.other_floor(&mut rng, self.lobby_floor);
                    (self.lobby_floor, to)
                } else {
                    let from = rng.gen_range(1..=self.num_floors);
                    (from, self.other_floor(&mut rng, from))
                }
            }
            TrafficPattern::Evening => {
                if rng.gen::<f64>() < RUSH_LOBBY_BIAS {
                    let from = self.other_floor(&mut rng, self.lobby_floor);
                    (from, self.lobby_floor)
                } else {
                    let from = rng.gen_range(1..=self.num_floors);
                    (from, self.other_floor(&mut rng, from))
                }
            }
            TrafficPattern::Lunch => {
                if rng.gen::<f64>() < LUNCH_LOBBY_BIAS {
                    let to = self.other_floor(&mut rng, self.lobby_floor);
                    (self.lobby_floor, to)
                } else {
                    let from = self.other_floor(&mut rng, self.lobby_floor);
                    (from, self.lobby_floor)
                }
            }
        }
    }

    fn other_floor<R: Rng>(&self, rng: &mut R, not: Floor) -> Floor {
        let pick = rng.gen_range(1..self.num_floors);
        if pick >= not {
            pick + 1
        } else {
            pick
        }
    }
}

/// Weighted draw over all (from, to) pairs of the matrix. Returns `None` when
/// every weight is zero.
fn sample_od_pair<R: Rng>(od: &[Vec<f64>], rng: &mut R) -> Option<(Floor, Floor)> {
    let total: f64 = od
        .iter()
        .enumerate()
        .flat_map(|(i, row)| {
            row.iter()
                .enumerate()
                .filter(move |(j, _)| *j != i)
                .map(|(_, w)| w.max(0.0))
        })
        .sum();
    if total <= 0.0 {
        return None;
    }
    let mut target = rng.gen::<f64>() * total;
    for (i, row) in od.iter().enumerate() {
        for (j, w) in row.iter().enumerate() {
            if i == j {
                continue;
            }
            let w = w.max(0.0);
            if target < w {
                return Some((i as Floor + 1, j as Floor + 1));
            }
            target -= w;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawner(pattern: TrafficPattern) -> PassengerSpawner {
        PassengerSpawner {
            pattern,
            rate_per_sec: 0.1,
            end_time_ms: 300_000,
            od_matrix: None,
            num_floors: 10,
            lobby_floor: 1,
            seed: 42,
            move_speed_ms: 1000,
            spawned: 0,
        }
    }

    #[test]
    fn inter_arrival_is_deterministic_per_count() {
        let s = spawner(TrafficPattern::Uniform);
        assert_eq!(s.sample_inter_arrival_ms(), s.sample_inter_arrival_ms());
        let mut later = s.clone();
        later.spawned = 1;
        assert_ne!(s.sample_inter_arrival_ms(), later.sample_inter_arrival_ms());
    }

    #[test]
    fn journeys_never_loop_on_one_floor() {
        let mut s = spawner(TrafficPattern::Uniform);
        for i in 0..200 {
            s.spawned = i;
            let (from, to) = s.sample_journey();
            assert_ne!(from, to);
            assert!((1..=10).contains(&from));
            assert!((1..=10).contains(&to));
        }
    }

    #[test]
    fn morning_rush_leans_on_the_lobby() {
        let mut s = spawner(TrafficPattern::MorningRush);
        let mut from_lobby = 0;
        for i in 0..200 {
            s.spawned = i;
            if s.sample_journey().0 == 1 {
                from_lobby += 1;
            }
        }
        assert!(from_lobby > 120, "only {from_lobby} of 200 from the lobby");
    }

    #[test]
    fn od_matrix_overrides_the_pattern() {
        let mut s = spawner(TrafficPattern::Uniform);
        let mut od = vec![vec![0.0; 10]; 10];
        od[1][7] = 1.0; // only 2 -> 8
        s.od_matrix = Some(od);
        for i in 0..50 {
            s.spawned = i;
            assert_eq!(s.sample_journey(), (2, 8));
        }
    }
}
