//! Configuration schema for the two documents the CLI loads: the simulation
//! config (physical plant + traffic) and the group-control config (strategy
//! selection). Validation failures abort before the world is built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::building::FloorDefinition;
use crate::call_system::CallSystem;
use crate::calls::{Direction, Floor};
use crate::traffic::TrafficPattern;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_num_floors() -> Floor {
    10
}
fn default_lobby_floor() -> Floor {
    1
}
fn default_num_elevators() -> usize {
    4
}
fn default_max_capacity() -> usize {
    10
}
fn default_rated_speed() -> f64 {
    2.5
}
fn default_acceleration() -> f64 {
    1.0
}
fn default_jerk() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}
fn default_home_floor() -> Floor {
    1
}
fn default_main_direction() -> Direction {
    Direction::Up
}
fn default_floor_height() -> f64 {
    3.5
}
fn default_open_time() -> f64 {
    2.0
}
fn default_close_time() -> f64 {
    2.0
}
fn default_sensor_timeout() -> f64 {
    1.0
}
fn default_pattern() -> TrafficPattern {
    TrafficPattern::Uniform
}
fn default_duration() -> f64 {
    300.0
}
fn default_generation_rate() -> f64 {
    0.1
}
fn default_boarding_time() -> f64 {
    1.0
}
fn default_alighting_time() -> f64 {
    0.8
}
fn default_allocation_name() -> String {
    "NearestCar".to_string()
}
fn default_repositioning_name() -> String {
    "None".to_string()
}
fn default_reassignment_name() -> String {
    "EarliestArrival".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingConfig {
    #[serde(default = "default_num_floors")]
    pub num_floors: Floor,
    #[serde(default = "default_lobby_floor")]
    pub lobby_floor: Floor,
    #[serde(default = "default_floor_height")]
    pub floor_height: f64,
    /// Explicit floor table; when absent floors are "1".."N" at
    /// `floor_height` metres each.
    #[serde(default)]
    pub floors: Option<Vec<FloorDefinition>>,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            num_floors: default_num_floors(),
            lobby_floor: default_lobby_floor(),
            floor_height: default_floor_height(),
            floors: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerElevatorConfig {
    #[serde(default)]
    pub home_floor: Option<Floor>,
    #[serde(default)]
    pub main_direction: Option<Direction>,
    #[serde(default)]
    pub service_floors: Option<Vec<Floor>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevatorConfig {
    #[serde(default = "default_num_elevators")]
    pub num_elevators: usize,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,
    #[serde(default = "default_rated_speed")]
    pub rated_speed: f64,
    #[serde(default = "default_acceleration")]
    pub acceleration: f64,
    #[serde(default = "default_jerk")]
    pub jerk: f64,
    #[serde(default = "default_true")]
    pub full_load_bypass: bool,
    #[serde(default = "default_home_floor")]
    pub home_floor: Floor,
    #[serde(default = "default_main_direction")]
    pub main_direction: Direction,
    #[serde(default)]
    pub service_floors: Option<Vec<Floor>>,
    #[serde(default)]
    pub per_elevator: Option<Vec<PerElevatorConfig>>,
}

impl Default for ElevatorConfig {
    fn default() -> Self {
        Self {
            num_elevators: default_num_elevators(),
            max_capacity: default_max_capacity(),
            rated_speed: default_rated_speed(),
            acceleration: default_acceleration(),
            jerk: default_jerk(),
            full_load_bypass: true,
            home_floor: default_home_floor(),
            main_direction: default_main_direction(),
            service_floors: None,
            per_elevator: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorTimingConfig {
    #[serde(default = "default_open_time")]
    pub open_time: f64,
    #[serde(default = "default_close_time")]
    pub close_time: f64,
    /// Photocell grace period once the queue looks empty.
    #[serde(default = "default_sensor_timeout")]
    pub sensor_timeout: f64,
    #[serde(default)]
    pub max_reopens_per_stop: Option<u32>,
}

impl Default for DoorTimingConfig {
    fn default() -> Self {
        Self {
            open_time: default_open_time(),
            close_time: default_close_time(),
            sensor_timeout: default_sensor_timeout(),
            max_reopens_per_stop: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    #[serde(default = "default_pattern")]
    pub pattern: TrafficPattern,
    #[serde(default = "default_duration")]
    pub simulation_duration: f64,
    #[serde(default = "default_generation_rate")]
    pub passenger_generation_rate: f64,
    #[serde(default)]
    pub od_matrix: Option<Vec<Vec<f64>>>,
    #[serde(default = "default_boarding_time")]
    pub avg_boarding_time: f64,
    #[serde(default = "default_alighting_time")]
    pub avg_alighting_time: f64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            simulation_duration: default_duration(),
            passenger_generation_rate: default_generation_rate(),
            od_matrix: None,
            avg_boarding_time: default_boarding_time(),
            avg_alighting_time: default_alighting_time(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallSystemKind {
    Traditional,
    FullDcs,
    LobbyDcs,
    ZonedDcs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSystemConfig {
    #[serde(rename = "type")]
    pub kind: CallSystemKind,
    #[serde(default)]
    pub lobby_floor: Option<Floor>,
    #[serde(default)]
    pub dcs_floors: Option<Vec<Floor>>,
}

impl Default for CallSystemConfig {
    fn default() -> Self {
        Self {
            kind: CallSystemKind::Traditional,
            lobby_floor: None,
            dcs_floors: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub building: BuildingConfig,
    #[serde(default)]
    pub elevator: ElevatorConfig,
    #[serde(default)]
    pub door: DoorTimingConfig,
    #[serde(default)]
    pub traffic: TrafficConfig,
    #[serde(default)]
    pub call_system: CallSystemConfig,
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Real-time throttle factor: virtual second = 1/f wall seconds; 0 runs
    /// as fast as possible.
    #[serde(default)]
    pub realtime_factor: f64,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.building.num_floors;
        if n < 2 {
            return Err(ConfigError::Invalid("num_floors must be at least 2".to_string()));
        }
        if !(1..=n).contains(&self.building.lobby_floor) {
            return Err(ConfigError::Invalid(format!(
                "lobby_floor must be between 1 and {n}"
            )));
        }
        if let Some(floors) = &self.building.floors {
            if floors.len() as Floor != n {
                return Err(ConfigError::Invalid(format!(
                    "floors list length ({}) must match num_floors ({n})",
                    floors.len()
                )));
            }
        }
        if self.elevator.num_elevators < 1 {
            return Err(ConfigError::Invalid("num_elevators must be at least 1".to_string()));
        }
        if self.elevator.max_capacity < 1 {
            return Err(ConfigError::Invalid("max_capacity must be at least 1".to_string()));
        }
        for (value, name) in [
            (self.elevator.rated_speed, "rated_speed"),
            (self.elevator.acceleration, "acceleration"),
            (self.elevator.jerk, "jerk"),
            (self.door.open_time, "door.open_time"),
            (self.door.close_time, "door.close_time"),
            (self.traffic.simulation_duration, "traffic.simulation_duration"),
            (self.traffic.avg_boarding_time, "traffic.avg_boarding_time"),
            (self.traffic.avg_alighting_time, "traffic.avg_alighting_time"),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.door.sensor_timeout < 0.0 {
            return Err(ConfigError::Invalid("door.sensor_timeout cannot be negative".to_string()));
        }
        if self.traffic.passenger_generation_rate < 0.0 {
            return Err(ConfigError::Invalid(
                "traffic.passenger_generation_rate cannot be negative".to_string(),
            ));
        }
        if self.realtime_factor < 0.0 {
            return Err(ConfigError::Invalid("realtime_factor cannot be negative".to_string()));
        }
        if !(1..=n).contains(&self.elevator.home_floor) {
            return Err(ConfigError::Invalid(format!(
                "elevator.home_floor must be between 1 and {n}"
            )));
        }
        if let Some(per) = &self.elevator.per_elevator {
            if per.len() != self.elevator.num_elevators {
                return Err(ConfigError::Invalid(format!(
                    "per_elevator list length ({}) must match num_elevators ({})",
                    per.len(),
                    self.elevator.num_elevators
                )));
            }
            for entry in per {
                if let Some(home) = entry.home_floor {
                    if !(1..=n).contains(&home) {
                        return Err(ConfigError::Invalid(format!(
                            "per_elevator home_floor {home} out of range"
                        )));
                    }
                }
            }
        }
        if let Some(service) = &self.elevator.service_floors {
            if service.iter().any(|f| !(1..=n).contains(f)) {
                return Err(ConfigError::Invalid("service_floors out of range".to_string()));
            }
        }
        if let Some(od) = &self.traffic.od_matrix {
            if od.len() as Floor != n || od.iter().any(|row| row.len() as Floor != n) {
                return Err(ConfigError::Invalid(format!(
                    "od_matrix must be a {n}x{n} square matching num_floors"
                )));
            }
        }
        match self.call_system.kind {
            CallSystemKind::LobbyDcs => {
                let lobby = self.call_system.lobby_floor.unwrap_or(self.building.lobby_floor);
                if !(1..=n).contains(&lobby) {
                    return Err(ConfigError::Invalid("call_system.lobby_floor out of range".to_string()));
                }
            }
            CallSystemKind::ZonedDcs => {
                let floors = self.call_system.dcs_floors.as_deref().unwrap_or(&[]);
                if floors.is_empty() {
                    return Err(ConfigError::Invalid(
                        "ZONED_DCS requires a non-empty dcs_floors list".to_string(),
                    ));
                }
                if floors.iter().any(|f| !(1..=n).contains(f)) {
                    return Err(ConfigError::Invalid("dcs_floors out of range".to_string()));
                }
            }
            CallSystemKind::Traditional | CallSystemKind::FullDcs => {}
        }
        Ok(())
    }

    /// Materialize the call system for this building.
    pub fn build_call_system(&self) -> CallSystem {
        let num_floors = self.building.num_floors;
        match self.call_system.kind {
            CallSystemKind::Traditional => CallSystem::Traditional { num_floors },
            CallSystemKind::FullDcs => CallSystem::FullDcs { num_floors },
            CallSystemKind::LobbyDcs => CallSystem::LobbyDcs {
                num_floors,
                lobby_floor: self.call_system.lobby_floor.unwrap_or(self.building.lobby_floor),
            },
            CallSystemKind::ZonedDcs => CallSystem::ZonedDcs {
                num_floors,
                dcs_floors: self
                    .call_system
                    .dcs_floors
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignmentPolicyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_reassignment_name")]
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Default for ReassignmentPolicyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: default_reassignment_name(),
            parameters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupControlConfig {
    #[serde(default = "default_allocation_strategy")]
    pub allocation_strategy: StrategyConfig,
    #[serde(default = "default_repositioning_strategy")]
    pub repositioning_strategy: StrategyConfig,
    #[serde(default)]
    pub reassignment_policy: ReassignmentPolicyConfig,
}

fn default_allocation_strategy() -> StrategyConfig {
    StrategyConfig {
        name: default_allocation_name(),
        parameters: BTreeMap::new(),
    }
}

fn default_repositioning_strategy() -> StrategyConfig {
    StrategyConfig {
        name: default_repositioning_name(),
        parameters: BTreeMap::new(),
    }
}

impl Default for GroupControlConfig {
    fn default() -> Self {
        Self {
            allocation_strategy: default_allocation_strategy(),
            repositioning_strategy: default_repositioning_strategy(),
            reassignment_policy: ReassignmentPolicyConfig::default(),
        }
    }
}

impl GroupControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allocation_strategy.name.is_empty() {
            return Err(ConfigError::Invalid("allocation_strategy.name is required".to_string()));
        }
        if self.reassignment_policy.enabled && self.reassignment_policy.name.is_empty() {
            return Err(ConfigError::Invalid(
                "reassignment_policy.name is required when enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SimulationConfig::default().validate().is_ok());
        assert!(GroupControlConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_single_floor_building() {
        let mut config = SimulationConfig::default();
        config.building.num_floors = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zoned_dcs_without_floors() {
        let mut config = SimulationConfig::default();
        config.call_system.kind = CallSystemKind::ZonedDcs;
        assert!(config.validate().is_err());
        config.call_system.dcs_floors = Some(vec![1, 2]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_mismatched_od_matrix() {
        let mut config = SimulationConfig::default();
        config.traffic.od_matrix = Some(vec![vec![1.0; 3]; 3]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn call_system_kind_parses_wire_names() {
        let kind: CallSystemKind = serde_json::from_str("\"LOBBY_DCS\"").expect("parse");
        assert_eq!(kind, CallSystemKind::LobbyDcs);
    }

    #[test]
    fn deserializes_partial_documents_with_defaults() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{"building": {"num_floors": 6}, "random_seed": 42}"#,
        )
        .expect("parse");
        assert_eq!(config.building.num_floors, 6);
        assert_eq!(config.elevator.num_elevators, 4);
        assert_eq!(config.random_seed, Some(42));
        assert_eq!(config.realtime_factor, 0.0);
    }
}
