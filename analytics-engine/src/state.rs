//! Block state store
//!
//! Holds the block instances of one model. Blocks are addressed by the
//! position they were declared at (a [`BlockId`]) and can be looked up by
//! their descriptor id. Each slot records when it last saw an event.

use crate::blocks::{Block, BlockKind};
use crate::types::Timestamp;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Index of a block inside its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One block instance and its bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct BlockSlot {
    /// Descriptor id of the block (unique within the model)
    pub name: String,
    /// Block kind and state record
    pub block: Block,
    /// Timestamp of the last tick or signal delivered to the block
    pub last_event_time: Option<Timestamp>,
}

impl BlockSlot {
    pub fn kind(&self) -> BlockKind {
        self.block.kind()
    }
}

/// Per-model block container
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    slots: Vec<BlockSlot>,
    /// Descriptor id -> slot index
    by_name: HashMap<String, BlockId>,
}

/// State store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub num_blocks: usize,
    /// Blocks that have seen at least one event
    pub num_touched: usize,
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block and return its id
    ///
    /// Returns `None` if a block with the same name is already stored.
    pub fn insert(&mut self, name: impl Into<String>, block: Block) -> Option<BlockId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return None;
        }

        let id = BlockId(self.slots.len());
        self.by_name.insert(name.clone(), id);
        self.slots.push(BlockSlot {
            name,
            block,
            last_event_time: None,
        });
        Some(id)
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockSlot> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut BlockSlot> {
        self.slots.get_mut(id.0)
    }

    /// Find a block id by descriptor name
    pub fn by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    /// Iterate over all slots in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &BlockSlot)> {
        self.slots.iter().enumerate().map(|(i, slot)| (BlockId(i), slot))
    }

    /// Record that a block saw an event at `t`
    pub fn touch(&mut self, id: BlockId, t: Timestamp) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.last_event_time = Some(t);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Serialize every slot for diagnostics
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.slots).unwrap_or(serde_json::Value::Null)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            num_blocks: self.slots.len(),
            num_touched: self
                .slots
                .iter()
                .filter(|slot| slot.last_event_time.is_some())
                .count(),
        }
    }
}
