//! Undo/redo history.
//!
//! A linear list of immutable snapshots plus a cursor. Committing truncates
//! everything after the cursor, appends, and moves the cursor to the end.
//! Undo/redo only move the cursor; at either bound they are no-ops.
//!
//! Snapshots are shared behind `Arc`, so cloning a `History` copies
//! pointers, never trees. Each mutating call returns a new `History`.

use dc_core::model::Diagram;
use std::sync::Arc;

/// One committed canvas state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
    pub items: Vec<Diagram>,
}

impl Snapshot {
    /// Same scroll offset and tree; the viewport size is ignored.
    pub fn same_document(&self, other: &Snapshot) -> bool {
        self.min_x == other.min_x && self.min_y == other.min_y && self.items == other.items
    }
}

#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<Arc<Snapshot>>,
    index: usize,
    max_depth: usize,
}

impl History {
    /// A history whose single entry is the initial state.
    pub fn new(initial: Snapshot, max_depth: usize) -> Self {
        Self {
            entries: vec![Arc::new(initial)],
            index: 0,
            max_depth: max_depth.max(1),
        }
    }

    /// Append a snapshot after the cursor, discarding any redo branch.
    pub fn commit(&self, snapshot: Snapshot) -> Self {
        let mut entries: Vec<Arc<Snapshot>> = self.entries[..=self.index].to_vec();
        entries.push(Arc::new(snapshot));
        if entries.len() > self.max_depth {
            let overflow = entries.len() - self.max_depth;
            entries.drain(..overflow);
        }
        let index = entries.len() - 1;
        log::debug!("history commit → {}/{}", index + 1, entries.len());
        Self {
            entries,
            index,
            max_depth: self.max_depth,
        }
    }

    /// Step back. `None` when already at the oldest entry.
    pub fn undo(&self) -> Option<(Self, Arc<Snapshot>)> {
        if !self.can_undo() {
            return None;
        }
        let next = self.at(self.index - 1);
        let snapshot = next.current();
        Some((next, snapshot))
    }

    /// Step forward. `None` when already at the newest entry.
    pub fn redo(&self) -> Option<(Self, Arc<Snapshot>)> {
        if !self.can_redo() {
            return None;
        }
        let next = self.at(self.index + 1);
        let snapshot = next.current();
        Some((next, snapshot))
    }

    fn at(&self, index: usize) -> Self {
        Self {
            entries: self.entries.clone(),
            index,
            max_depth: self.max_depth,
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.entries[self.index])
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }
}
