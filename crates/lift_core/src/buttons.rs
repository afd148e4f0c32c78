//! Hall buttons: one latch per (floor, direction) that exists in the building.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;

use crate::call_system::CallSystem;
use crate::calls::{Direction, Floor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressResult {
    /// The latch was off and is now lit; the hall call should be published.
    NewlyLit,
    /// Someone already pressed it; nothing to publish.
    AlreadyLit,
    /// No such button at this floor (DCS floor or boundary direction).
    NoButton,
}

/// Latch state of every hall button in the building. Buttons exist only where
/// the call system installs them.
#[derive(Debug, Default, Resource)]
pub struct HallButtons {
    lit: BTreeMap<(Floor, Direction), bool>,
}

impl HallButtons {
    pub fn new(call_system: &CallSystem) -> Self {
        let mut lit = BTreeMap::new();
        for floor in 1..=call_system.num_floors() {
            for direction in call_system.available_directions(floor) {
                lit.insert((floor, direction), false);
            }
        }
        Self { lit }
    }

    pub fn is_lit(&self, floor: Floor, direction: Direction) -> bool {
        self.lit.get(&(floor, direction)).copied().unwrap_or(false)
    }

    pub fn press(&mut self, floor: Floor, direction: Direction) -> PressResult {
        match self.lit.get_mut(&(floor, direction)) {
            None => PressResult::NoButton,
            Some(state) if *state => PressResult::AlreadyLit,
            Some(state) => {
                *state = true;
                PressResult::NewlyLit
            }
        }
    }

    /// Turn the latch off when a car serves the call. Returns whether it was
    /// lit (the `hall_call_off` edge).
    pub fn serve(&mut self, floor: Floor, direction: Direction) -> bool {
        match self.lit.get_mut(&(floor, direction)) {
            Some(state) if *state => {
                *state = false;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_latches_until_served() {
        let cs = CallSystem::Traditional { num_floors: 10 };
        let mut buttons = HallButtons::new(&cs);

        assert_eq!(buttons.press(3, Direction::Up), PressResult::NewlyLit);
        assert_eq!(buttons.press(3, Direction::Up), PressResult::AlreadyLit);
        assert!(buttons.is_lit(3, Direction::Up));

        assert!(buttons.serve(3, Direction::Up));
        assert!(!buttons.is_lit(3, Direction::Up));
        assert!(!buttons.serve(3, Direction::Up));
    }

    #[test]
    fn boundary_and_dcs_floors_reject_presses() {
        let cs = CallSystem::LobbyDcs { num_floors: 10, lobby_floor: 1 };
        let mut buttons = HallButtons::new(&cs);

        // Lobby is DCS: no buttons at all.
        assert_eq!(buttons.press(1, Direction::Up), PressResult::NoButton);
        // Top floor has no UP button.
        assert_eq!(buttons.press(10, Direction::Up), PressResult::NoButton);
        assert_eq!(buttons.press(10, Direction::Down), PressResult::NewlyLit);
    }
}
