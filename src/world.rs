//! Client-side world state: the world parameters and the blocked-cell set.
//!
//! Both are the client's authoritative copy. After every reconnection the
//! session replays them to the server, which has no memory of the old
//! connection.

use std::collections::HashSet;

use serde::Serialize;

use crate::path::Cell;

/// AI service run by the server for this world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AiService {
    /// A* pathfinding.
    #[default]
    AStar = 0,
    /// Finite state machine.
    Fsm = 1,
    /// Breadth-first search.
    Bfs = 2,
    /// Depth-first search.
    Dfs = 3,
}

impl AiService {
    /// Look up a service by its wire number.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::AStar),
            1 => Some(Self::Fsm),
            2 => Some(Self::Bfs),
            3 => Some(Self::Dfs),
            _ => None,
        }
    }

    /// Wire number of this service.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Parameters of the last `create_game_world` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorldSpec {
    /// World width in cells.
    pub width: u32,
    /// World height in cells.
    pub height: u32,
    /// Algorithm selector.
    pub service: AiService,
}

impl WorldSpec {
    /// Create a world spec.
    pub fn new(width: u32, height: u32, service: AiService) -> Self {
        Self {
            width,
            height,
            service,
        }
    }
}

/// Insertion-ordered set of blocked cells.
///
/// Membership is by coordinates (see [`Cell`]); iteration yields cells in the
/// order they were first blocked, which is the order they are replayed in.
#[derive(Debug, Clone, Default)]
pub struct BlockedCells {
    order: Vec<Cell>,
    members: HashSet<Cell>,
}

impl BlockedCells {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell. Returns `false` if it was already present.
    pub fn insert(&mut self, cell: Cell) -> bool {
        let cell = Cell::new(cell.x, cell.y, cell.z);
        if !self.members.insert(cell) {
            return false;
        }
        self.order.push(cell);
        true
    }

    /// Remove a cell. Returns `false` if it was not present.
    pub fn remove(&mut self, cell: &Cell) -> bool {
        if !self.members.remove(cell) {
            return false;
        }
        self.order.retain(|c| c != cell);
        true
    }

    /// Check membership by coordinates.
    #[inline]
    pub fn contains(&self, cell: &Cell) -> bool {
        self.members.contains(cell)
    }

    /// Number of blocked cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if no cell is blocked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Cell> {
        self.order.iter()
    }

    /// Remove every cell.
    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

impl<'a> IntoIterator for &'a BlockedCells {
    type Item = &'a Cell;
    type IntoIter = std::slice::Iter<'a, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.iter()
    }
}
