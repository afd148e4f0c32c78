//! Run statistics: per-journey metrics and the diagnostics counters.

use bevy_ecs::prelude::Resource;

use crate::calls::Floor;

/// One completed passenger journey, recorded at alighting.
#[derive(Debug, Clone)]
pub struct JourneyRecord {
    pub passenger: String,
    pub from: Floor,
    pub to: Floor,
    pub elevator: String,
    pub wait_to_door_open_secs: Option<f64>,
    pub wait_to_boarding_secs: Option<f64>,
    pub riding_secs: Option<f64>,
    pub total_secs: Option<f64>,
}

/// Collects simulation outcomes. Inserted as a resource and filled by the
/// passenger and door systems.
#[derive(Debug, Default, Resource)]
pub struct SimStats {
    pub journeys: Vec<JourneyRecord>,
    pub passengers_spawned: u64,
    pub boarding_failures: u64,
    pub full_load_bypasses: u64,
    pub reopen_denials: u64,
    /// Safety violations (reverse movement, malformed messages). The run
    /// continues; the count surfaces in the summary.
    pub safety_violations: u64,
}

/// Aggregates for the end-of-run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSummary {
    pub journeys_completed: usize,
    pub passengers_spawned: u64,
    pub boarding_failures: u64,
    pub full_load_bypasses: u64,
    pub reopen_denials: u64,
    pub safety_violations: u64,
    pub avg_wait_secs: Option<f64>,
    pub max_wait_secs: Option<f64>,
    pub avg_riding_secs: Option<f64>,
    pub avg_journey_secs: Option<f64>,
    pub max_journey_secs: Option<f64>,
}

impl SimStats {
    pub fn summary(&self) -> StatsSummary {
        let waits: Vec<f64> = self
            .journeys
            .iter()
            .filter_map(|j| j.wait_to_boarding_secs)
            .collect();
        let rides: Vec<f64> = self.journeys.iter().filter_map(|j| j.riding_secs).collect();
        let totals: Vec<f64> = self.journeys.iter().filter_map(|j| j.total_secs).collect();

        StatsSummary {
            journeys_completed: self.journeys.len(),
            passengers_spawned: self.passengers_spawned,
            boarding_failures: self.boarding_failures,
            full_load_bypasses: self.full_load_bypasses,
            reopen_denials: self.reopen_denials,
            safety_violations: self.safety_violations,
            avg_wait_secs: mean(&waits),
            max_wait_secs: max(&waits),
            avg_riding_secs: mean(&rides),
            avg_journey_secs: mean(&totals),
            max_journey_secs: max(&totals),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| match acc {
        None => Some(v),
        Some(a) => Some(a.max(v)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_aggregates_journeys() {
        let mut stats = SimStats::default();
        for (wait, ride) in [(10.0, 20.0), (30.0, 40.0)] {
            stats.journeys.push(JourneyRecord {
                passenger: "Passenger_1".to_string(),
                from: 1,
                to: 5,
                elevator: "Elevator_1".to_string(),
                wait_to_door_open_secs: Some(wait),
                wait_to_boarding_secs: Some(wait),
                riding_secs: Some(ride),
                total_secs: Some(wait + ride),
            });
        }
        let summary = stats.summary();
        assert_eq!(summary.journeys_completed, 2);
        assert_eq!(summary.avg_wait_secs, Some(20.0));
        assert_eq!(summary.max_wait_secs, Some(30.0));
        assert_eq!(summary.avg_journey_secs, Some(50.0));
    }

    #[test]
    fn empty_stats_have_no_averages() {
        let summary = SimStats::default().summary();
        assert_eq!(summary.avg_wait_secs, None);
        assert_eq!(summary.journeys_completed, 0);
    }
}
