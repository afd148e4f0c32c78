//! Call system: which call equipment each floor carries.
//!
//! Classifies floors as Traditional (UP/DOWN buttons) or DCS (destination
//! panel) and answers the capability queries the passenger workflows and the
//! door depend on.

use std::collections::BTreeSet;

use bevy_ecs::prelude::Resource;

use crate::calls::{CallType, Direction, Floor};

#[derive(Debug, Clone, Resource)]
pub enum CallSystem {
    /// Every floor has direction buttons.
    Traditional { num_floors: Floor },
    /// Every floor has a destination panel; cars carry no buttons.
    FullDcs { num_floors: Floor },
    /// The lobby has a destination panel, all other floors have buttons.
    LobbyDcs { num_floors: Floor, lobby_floor: Floor },
    /// An arbitrary set of floors has destination panels.
    ZonedDcs { num_floors: Floor, dcs_floors: BTreeSet<Floor> },
}

impl CallSystem {
    pub fn num_floors(&self) -> Floor {
        match self {
            CallSystem::Traditional { num_floors }
            | CallSystem::FullDcs { num_floors }
            | CallSystem::LobbyDcs { num_floors, .. }
            | CallSystem::ZonedDcs { num_floors, .. } => *num_floors,
        }
    }

    pub fn floor_call_type(&self, floor: Floor) -> CallType {
        if self.is_dcs_floor(floor) {
            CallType::Dcs
        } else {
            CallType::Traditional
        }
    }

    pub fn is_dcs_floor(&self, floor: Floor) -> bool {
        match self {
            CallSystem::Traditional { .. } => false,
            CallSystem::FullDcs { .. } => true,
            CallSystem::LobbyDcs { lobby_floor, .. } => floor == *lobby_floor,
            CallSystem::ZonedDcs { dcs_floors, .. } => dcs_floors.contains(&floor),
        }
    }

    /// Direction buttons present at a floor: none on DCS floors, UP only at
    /// the bottom, DOWN only at the top.
    pub fn available_directions(&self, floor: Floor) -> Vec<Direction> {
        if self.is_dcs_floor(floor) {
            return Vec::new();
        }
        if floor == 1 {
            vec![Direction::Up]
        } else if floor == self.num_floors() {
            vec![Direction::Down]
        } else {
            vec![Direction::Up, Direction::Down]
        }
    }

    pub fn has_direction_button(&self, floor: Floor, direction: Direction) -> bool {
        self.available_directions(floor).contains(&direction)
    }

    pub fn has_destination_panel(&self, floor: Floor) -> bool {
        self.is_dcs_floor(floor)
    }

    /// Whether cars carry destination buttons. Only a full DCS installation
    /// goes without them; everywhere else boarding passengers press their
    /// floor inside the car.
    pub fn has_car_buttons(&self) -> bool {
        !matches!(self, CallSystem::FullDcs { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            CallSystem::Traditional { .. } => "TRADITIONAL",
            CallSystem::FullDcs { .. } => "FULL_DCS",
            CallSystem::LobbyDcs { .. } => "LOBBY_DCS",
            CallSystem::ZonedDcs { .. } => "ZONED_DCS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traditional_boundary_floors_lose_one_button() {
        let cs = CallSystem::Traditional { num_floors: 10 };
        assert_eq!(cs.available_directions(1), vec![Direction::Up]);
        assert_eq!(cs.available_directions(10), vec![Direction::Down]);
        assert_eq!(cs.available_directions(5), vec![Direction::Up, Direction::Down]);
        assert!(cs.has_car_buttons());
    }

    #[test]
    fn full_dcs_has_panels_everywhere_and_no_buttons() {
        let cs = CallSystem::FullDcs { num_floors: 10 };
        for floor in 1..=10 {
            assert!(cs.available_directions(floor).is_empty());
            assert!(cs.has_destination_panel(floor));
        }
        assert!(!cs.has_car_buttons());
    }

    #[test]
    fn lobby_dcs_mixes_regimes() {
        let cs = CallSystem::LobbyDcs { num_floors: 10, lobby_floor: 1 };
        assert_eq!(cs.floor_call_type(1), CallType::Dcs);
        assert_eq!(cs.floor_call_type(2), CallType::Traditional);
        assert!(cs.available_directions(1).is_empty());
        assert!(cs.has_direction_button(2, Direction::Up));
        assert!(cs.has_car_buttons());
    }

    #[test]
    fn zoned_dcs_follows_the_floor_set() {
        let cs = CallSystem::ZonedDcs {
            num_floors: 20,
            dcs_floors: [1, 2, 3].into_iter().collect(),
        };
        assert!(cs.is_dcs_floor(2));
        assert!(!cs.is_dcs_floor(4));
    }
}
