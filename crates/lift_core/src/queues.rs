//! Floor queues: waiting lines keyed by direction (traditional floors) or by
//! assigned car (DCS floors).
//!
//! This is the only place that knows which keying a floor uses. A waiting
//! passenger occupies exactly one queue at a time; `move_passenger` preserves
//! that invariant by removing before inserting.

use std::collections::{BTreeMap, VecDeque};

use bevy_ecs::prelude::{Entity, Resource};

use crate::call_system::CallSystem;
use crate::calls::{Direction, Floor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueueKey {
    Direction(Direction),
    Car(Entity),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QueueError {
    #[error("no queue for floor {floor} with the given key")]
    NoSuchQueue { floor: Floor },
    #[error("passenger is not in the source queue at floor {floor}")]
    NotInQueue { floor: Floor },
}

#[derive(Debug, Default, Resource)]
pub struct FloorQueues {
    queues: BTreeMap<(Floor, QueueKey), VecDeque<Entity>>,
}

impl FloorQueues {
    /// Build the queue map for a building: direction queues on traditional
    /// floors, one queue per car on DCS floors.
    pub fn new(call_system: &CallSystem, cars: &[Entity]) -> Self {
        let mut queues = BTreeMap::new();
        for floor in 1..=call_system.num_floors() {
            if call_system.is_dcs_floor(floor) {
                for &car in cars {
                    queues.insert((floor, QueueKey::Car(car)), VecDeque::new());
                }
            } else {
                queues.insert((floor, QueueKey::Direction(Direction::Up)), VecDeque::new());
                queues.insert((floor, QueueKey::Direction(Direction::Down)), VecDeque::new());
            }
        }
        Self { queues }
    }

    pub fn contains_queue(&self, floor: Floor, key: QueueKey) -> bool {
        self.queues.contains_key(&(floor, key))
    }

    pub fn len(&self, floor: Floor, key: QueueKey) -> usize {
        self.queues.get(&(floor, key)).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, floor: Floor, key: QueueKey) -> bool {
        self.len(floor, key) == 0
    }

    pub fn head(&self, floor: Floor, key: QueueKey) -> Option<Entity> {
        self.queues.get(&(floor, key)).and_then(|q| q.front().copied())
    }

    pub fn members(&self, floor: Floor, key: QueueKey) -> Vec<Entity> {
        self.queues
            .get(&(floor, key))
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn push_back(&mut self, floor: Floor, key: QueueKey, passenger: Entity) -> Result<(), QueueError> {
        self.queues
            .get_mut(&(floor, key))
            .ok_or(QueueError::NoSuchQueue { floor })?
            .push_back(passenger);
        Ok(())
    }

    pub fn pop_front(&mut self, floor: Floor, key: QueueKey) -> Option<Entity> {
        self.queues.get_mut(&(floor, key)).and_then(VecDeque::pop_front)
    }

    pub fn remove(&mut self, floor: Floor, key: QueueKey, passenger: Entity) -> bool {
        let Some(queue) = self.queues.get_mut(&(floor, key)) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|&p| p != passenger);
        queue.len() != before
    }

    /// Reassign a waiting passenger between two queues of the same floor,
    /// removing before inserting.
    pub fn move_passenger(
        &mut self,
        passenger: Entity,
        floor: Floor,
        from: QueueKey,
        to: QueueKey,
    ) -> Result<(), QueueError> {
        if !self.contains_queue(floor, to) {
            return Err(QueueError::NoSuchQueue { floor });
        }
        if !self.remove(floor, from, passenger) {
            return Err(QueueError::NotInQueue { floor });
        }
        self.push_back(floor, to, passenger)
    }

    /// Every passenger waiting anywhere at a floor, in queue order.
    pub fn waiting_at(&self, floor: Floor) -> Vec<Entity> {
        self.queues
            .iter()
            .filter(|((f, _), _)| *f == floor)
            .flat_map(|(_, q)| q.iter().copied())
            .collect()
    }

    /// The queue a waiting passenger currently occupies, if any.
    pub fn position_of(&self, floor: Floor, passenger: Entity) -> Option<QueueKey> {
        self.queues
            .iter()
            .filter(|((f, _), _)| *f == floor)
            .find(|(_, q)| q.contains(&passenger))
            .map(|((_, key), _)| *key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passenger(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    #[test]
    fn traditional_floor_queues_by_direction() {
        let cs = CallSystem::Traditional { num_floors: 5 };
        let mut queues = FloorQueues::new(&cs, &[]);
        let up = QueueKey::Direction(Direction::Up);

        queues.push_back(2, up, passenger(1)).expect("push");
        queues.push_back(2, up, passenger(2)).expect("push");
        assert_eq!(queues.head(2, up), Some(passenger(1)));
        assert_eq!(queues.pop_front(2, up), Some(passenger(1)));
        assert_eq!(queues.len(2, up), 1);
    }

    #[test]
    fn dcs_floor_queues_by_car() {
        let cs = CallSystem::LobbyDcs { num_floors: 5, lobby_floor: 1 };
        let car_a = Entity::from_raw(100);
        let car_b = Entity::from_raw(101);
        let queues = FloorQueues::new(&cs, &[car_a, car_b]);

        assert!(queues.contains_queue(1, QueueKey::Car(car_a)));
        assert!(!queues.contains_queue(1, QueueKey::Direction(Direction::Up)));
        assert!(queues.contains_queue(2, QueueKey::Direction(Direction::Up)));
        assert!(!queues.contains_queue(2, QueueKey::Car(car_a)));
    }

    #[test]
    fn move_passenger_removes_before_inserting() {
        let cs = CallSystem::LobbyDcs { num_floors: 5, lobby_floor: 1 };
        let car_a = Entity::from_raw(100);
        let car_b = Entity::from_raw(101);
        let mut queues = FloorQueues::new(&cs, &[car_a, car_b]);
        let p = passenger(1);

        queues.push_back(1, QueueKey::Car(car_a), p).expect("push");
        queues
            .move_passenger(p, 1, QueueKey::Car(car_a), QueueKey::Car(car_b))
            .expect("move");

        assert!(queues.is_empty(1, QueueKey::Car(car_a)));
        assert_eq!(queues.head(1, QueueKey::Car(car_b)), Some(p));
        // Exactly one queue holds the passenger.
        assert_eq!(queues.waiting_at(1), vec![p]);
    }

    #[test]
    fn move_from_wrong_queue_is_an_error() {
        let cs = CallSystem::LobbyDcs { num_floors: 5, lobby_floor: 1 };
        let car_a = Entity::from_raw(100);
        let car_b = Entity::from_raw(101);
        let mut queues = FloorQueues::new(&cs, &[car_a, car_b]);

        let err = queues
            .move_passenger(passenger(1), 1, QueueKey::Car(car_a), QueueKey::Car(car_b))
            .unwrap_err();
        assert_eq!(err, QueueError::NotInQueue { floor: 1 });
    }
}
