//! Building model: contiguous control floors with display names and heights.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::calls::Floor;
use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorDefinition {
    /// Internal floor number, 1-based.
    pub control_floor: Floor,
    /// Human-readable name, e.g. "B1", "L", "12F".
    pub display_name: String,
    /// Height of this floor in metres.
    #[serde(default = "FloorDefinition::default_height")]
    pub floor_height: f64,
}

impl FloorDefinition {
    pub fn default_height() -> f64 {
        3.5
    }
}

/// Floor layout of the installation. Control-floor numbering is contiguous
/// starting at 1; both control↔display mappings are available.
#[derive(Debug, Clone, Resource)]
pub struct Building {
    floors: Vec<FloorDefinition>,
    display_to_control: BTreeMap<String, Floor>,
}

impl Building {
    pub fn new(mut floors: Vec<FloorDefinition>) -> Result<Self, ConfigError> {
        if floors.len() < 2 {
            return Err(ConfigError::Invalid(
                "building needs at least two floors".to_string(),
            ));
        }
        floors.sort_by_key(|f| f.control_floor);
        for (idx, floor) in floors.iter().enumerate() {
            let expected = idx as Floor + 1;
            if floor.control_floor != expected {
                return Err(ConfigError::Invalid(format!(
                    "control floors must be contiguous from 1: expected {expected}, got {}",
                    floor.control_floor
                )));
            }
            if floor.floor_height <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "floor {} has non-positive height", floor.control_floor
                )));
            }
        }
        let display_to_control = floors
            .iter()
            .map(|f| (f.display_name.clone(), f.control_floor))
            .collect();
        Ok(Self { floors, display_to_control })
    }

    /// Uniform building: floors named "1".."N", all `floor_height` metres.
    pub fn uniform(num_floors: Floor, floor_height: f64) -> Result<Self, ConfigError> {
        let floors = (1..=num_floors)
            .map(|control_floor| FloorDefinition {
                control_floor,
                display_name: control_floor.to_string(),
                floor_height,
            })
            .collect();
        Self::new(floors)
    }

    pub fn num_floors(&self) -> Floor {
        self.floors.len() as Floor
    }

    pub fn contains(&self, floor: Floor) -> bool {
        floor >= 1 && floor <= self.num_floors()
    }

    pub fn display_name(&self, control_floor: Floor) -> Option<&str> {
        self.floors
            .get(control_floor.checked_sub(1)? as usize)
            .map(|f| f.display_name.as_str())
    }

    pub fn control_floor(&self, display_name: &str) -> Option<Floor> {
        self.display_to_control.get(display_name).copied()
    }

    /// Elevation of each floor above floor 1, in metres, indexed by
    /// `control_floor - 1`. Input to the flight-table precomputation.
    pub fn elevations(&self) -> Vec<f64> {
        let mut elevations = Vec::with_capacity(self.floors.len());
        let mut height = 0.0;
        for floor in &self.floors {
            elevations.push(height);
            height += floor.floor_height;
        }
        elevations
    }
}
