//! Cells, paths, and the accumulator that builds a path from streamed nodes.
//!
//! The server streams a path goal-first: a run of `NODE` frames followed by a
//! single `END`. Every frame carries a sequence id; a frame repeating the
//! previous id is a duplicate delivery and is dropped.
//!
//! # Example
//!
//! ```
//! use raig_client::{Cell, PathAccumulator};
//!
//! let mut acc = PathAccumulator::new();
//! acc.on_node(1, 5, 5);
//! acc.on_node(1, 5, 5); // duplicate, ignored
//! let path = acc.on_end(2, 0, 0).unwrap();
//!
//! assert_eq!(path.cells(), &[Cell::new(0, 0, 0), Cell::new(5, 0, 5)]);
//! ```

use std::hash::{Hash, Hasher};

use serde::Serialize;

/// A grid cell.
///
/// `id` carries the sequence number of streamed path nodes. It takes no part
/// in equality or hashing: two cells are equal iff their coordinates match.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Cell {
    /// X coordinate.
    pub x: u32,
    /// Y coordinate (height; always 0 for cells received in a path).
    pub y: u32,
    /// Z coordinate.
    pub z: u32,
    /// Sequence id for streamed nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
}

impl Cell {
    /// Create a cell with no identifier.
    #[inline]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z, id: None }
    }

    /// Create a cell tagged with a sequence id.
    #[inline]
    pub const fn with_id(id: u32, x: u32, y: u32, z: u32) -> Self {
        Self {
            x,
            y,
            z,
            id: Some(id),
        }
    }

    /// Coordinates as a tuple.
    #[inline]
    pub fn coords(&self) -> (u32, u32, u32) {
        (self.x, self.y, self.z)
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.coords() == other.coords()
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coords().hash(state);
    }
}

impl From<(u32, u32, u32)> for Cell {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Self::new(x, y, z)
    }
}

/// A finished path, ordered start to goal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Path {
    cells: Vec<Cell>,
}

impl Path {
    /// Create a path from cells already in start-to-goal order.
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Cells in start-to-goal order.
    #[inline]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the path has no cells.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// First cell, if any.
    pub fn start(&self) -> Option<&Cell> {
        self.cells.first()
    }

    /// Last cell, if any.
    pub fn goal(&self) -> Option<&Cell> {
        self.cells.last()
    }

    /// Iterate cells in start-to-goal order.
    pub fn iter(&self) -> std::slice::Iter<'_, Cell> {
        self.cells.iter()
    }

    /// Consume the path into its cells.
    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Cell;
    type IntoIter = std::slice::Iter<'a, Cell>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

/// Assembles streamed path nodes into a finished [`Path`].
///
/// Duplicate suppression only compares against the most recently accepted
/// sequence id. A repeat that is not adjacent to its original (after
/// reordering) is appended again.
#[derive(Debug, Default)]
pub struct PathAccumulator {
    /// Cells in arrival (goal-to-start) order.
    cells: Vec<Cell>,
    /// Most recently accepted sequence id.
    last_seen_seq: Option<u32>,
}

impl PathAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an intermediate node.
    ///
    /// Returns `false` if the node was a duplicate and ignored.
    pub fn on_node(&mut self, seq: u32, x: u32, z: u32) -> bool {
        if self.is_duplicate(seq) {
            tracing::trace!(seq, "Duplicate NODE ignored");
            return false;
        }
        self.push(seq, x, z);
        true
    }

    /// Accept the terminating node and hand out the finished path.
    ///
    /// Returns `None` if the node was a duplicate; the accumulator keeps
    /// waiting for a fresh terminator in that case. Otherwise the buffered
    /// cells are reversed into start-to-goal order and the accumulator is
    /// reset for the next request.
    pub fn on_end(&mut self, seq: u32, x: u32, z: u32) -> Option<Path> {
        if self.is_duplicate(seq) {
            tracing::trace!(seq, "Duplicate END ignored");
            return None;
        }
        self.push(seq, x, z);

        let mut cells = std::mem::take(&mut self.cells);
        cells.reverse();
        self.last_seen_seq = None;
        Some(Path::new(cells))
    }

    /// Drop any partial path and forget the last sequence id.
    pub fn reset(&mut self) {
        self.cells.clear();
        self.last_seen_seq = None;
    }

    /// Most recently accepted sequence id.
    #[inline]
    pub fn last_seen_seq(&self) -> Option<u32> {
        self.last_seen_seq
    }

    /// Number of nodes buffered so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if nothing is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn is_duplicate(&self, seq: u32) -> bool {
        self.last_seen_seq == Some(seq)
    }

    fn push(&mut self, seq: u32, x: u32, z: u32) {
        self.cells.push(Cell::with_id(seq, x, 0, z));
        self.last_seen_seq = Some(seq);
    }
}
