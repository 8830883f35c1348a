//! Edit history using compressed workflow snapshots
//!
//! Each history entry is a zstd-compressed JSON [`WorkflowDefinition`], so
//! any edit can be undone without an inverse operation per edit kind.
//! Execution state is never part of a snapshot.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::definition::WorkflowDefinition;
use crate::error::{FlowError, Result};
use crate::graph::WorkflowGraph;
use crate::registry::WidgetRegistry;

const COMPRESSION_LEVEL: i32 = 3;

/// Default number of history entries kept
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Undo/redo history of a workflow
pub struct UndoStack {
    snapshots: VecDeque<Vec<u8>>,
    /// Index of the snapshot that matches the live graph
    cursor: usize,
    capacity: usize,
}

impl UndoStack {
    /// Create a history keeping at most `capacity` snapshots (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Record the current state of `graph`
    ///
    /// Discards any redo entries past the cursor and drops the oldest entry
    /// once the capacity is exceeded.
    pub fn push(&mut self, graph: &WorkflowGraph) -> Result<()> {
        let compressed = compress(&graph.to_definition())?;

        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push_back(compressed);
        self.cursor = self.snapshots.len() - 1;

        if self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
            self.cursor -= 1;
        }
        log::trace!(
            "History now holds {} snapshot(s), {} bytes",
            self.snapshots.len(),
            self.compressed_size()
        );
        Ok(())
    }

    /// Step back one entry, returning the definition to restore
    pub fn undo(&mut self) -> Result<Option<WorkflowDefinition>> {
        if !self.can_undo() {
            return Ok(None);
        }
        self.cursor -= 1;
        self.decompress(self.cursor).map(Some)
    }

    /// Step forward one entry, returning the definition to restore
    pub fn redo(&mut self) -> Result<Option<WorkflowDefinition>> {
        if !self.can_redo() {
            return Ok(None);
        }
        self.cursor += 1;
        self.decompress(self.cursor).map(Some)
    }

    /// Undo and rebuild the resulting graph
    pub fn undo_graph(&mut self, registry: Arc<WidgetRegistry>) -> Result<Option<WorkflowGraph>> {
        match self.undo()? {
            Some(def) => Ok(Some(WorkflowGraph::from_definition(&def, registry)?)),
            None => Ok(None),
        }
    }

    /// Redo and rebuild the resulting graph
    pub fn redo_graph(&mut self, registry: Arc<WidgetRegistry>) -> Result<Option<WorkflowGraph>> {
        match self.redo()? {
            Some(def) => Ok(Some(WorkflowGraph::from_definition(&def, registry)?)),
            None => Ok(None),
        }
    }

    /// The entry at the cursor
    pub fn current(&self) -> Result<Option<WorkflowDefinition>> {
        if self.snapshots.is_empty() {
            return Ok(None);
        }
        self.decompress(self.cursor).map(Some)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = 0;
    }

    /// Total compressed size of all snapshots in bytes
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(Vec::len).sum()
    }

    fn decompress(&self, index: usize) -> Result<WorkflowDefinition> {
        let json = zstd::decode_all(&self.snapshots[index][..])
            .map_err(|e| FlowError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

fn compress(definition: &WorkflowDefinition) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(definition)?;
    zstd::encode_all(&json[..], COMPRESSION_LEVEL).map_err(|e| FlowError::Compression(e.to_string()))
}
