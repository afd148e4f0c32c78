//! Call vocabulary shared by the whole crate: floors, directions, call kinds,
//! and the `CallData` record handed to allocation strategies.

use serde::{Deserialize, Serialize};

/// Control floor number. Contiguous, starting at 1.
pub type Floor = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Direction of travel from `from` to `to`. `None` when the floors match.
    pub fn between(from: Floor, to: Floor) -> Option<Direction> {
        match to.cmp(&from) {
            std::cmp::Ordering::Greater => Some(Direction::Up),
            std::cmp::Ordering::Less => Some(Direction::Down),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

/// Label for an optional heading, matching the wire format of status records.
pub fn heading_label(direction: Option<Direction>) -> &'static str {
    match direction {
        Some(d) => d.label(),
        None => "NO_DIRECTION",
    }
}

/// Per-floor call regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallType {
    Traditional,
    Dcs,
}

/// Hall call as seen by the dispatcher. Directional calls carry `direction`;
/// DCS calls carry `destination` and the registering passenger.
#[derive(Debug, Clone, PartialEq)]
pub struct CallData {
    pub floor: Floor,
    pub direction: Option<Direction>,
    pub destination: Option<Floor>,
    pub call_type: CallType,
    pub timestamp_ms: u64,
}

impl CallData {
    /// Service direction of the call: explicit for directional calls, derived
    /// from the destination for DCS calls.
    pub fn service_direction(&self) -> Option<Direction> {
        self.direction.or_else(|| {
            self.destination
                .and_then(|dest| Direction::between(self.floor, dest))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_between_floors() {
        assert_eq!(Direction::between(2, 8), Some(Direction::Up));
        assert_eq!(Direction::between(8, 2), Some(Direction::Down));
        assert_eq!(Direction::between(5, 5), None);
    }

    #[test]
    fn dcs_call_derives_direction_from_destination() {
        let call = CallData {
            floor: 1,
            direction: None,
            destination: Some(8),
            call_type: CallType::Dcs,
            timestamp_ms: 0,
        };
        assert_eq!(call.service_direction(), Some(Direction::Up));
    }
}
