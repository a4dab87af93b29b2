use std::collections::VecDeque;

use super::types::Waypoint;

/// Pending destinations. FIFO, except that a suspended leg goes back to the front.
#[derive(Debug, Clone, Default)]
pub struct WaypointQueue {
    pending: VecDeque<Waypoint>,
}

impl WaypointQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, waypoint: Waypoint) {
        self.pending.push_back(waypoint);
    }

    pub fn push_front(&mut self, waypoint: Waypoint) {
        self.pending.push_front(waypoint);
    }

    pub fn pop_front(&mut self) -> Option<Waypoint> {
        self.pending.pop_front()
    }

    pub fn front(&self) -> Option<&Waypoint> {
        self.pending.front()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.pending.iter()
    }
}
