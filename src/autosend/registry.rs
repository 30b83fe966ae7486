//! Set of connections with pending output, in insertion order.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::autosend::ProtocolRef;

/// Connections visited by one tick, kept inline for typical batch sizes.
pub type Snapshot = SmallVec<[ProtocolRef; 32]>;

/// Unique set of connections waiting for autosend.
///
/// Entries keep insertion order until a removal moves the last entry into
/// the freed slot. Identity is the address of the shared connection.
#[derive(Default)]
pub struct AutosendRegistry {
    entries: Vec<ProtocolRef>,
    /// Identity -> index into `entries`.
    slots: FxHashMap<usize, usize>,
}

#[inline]
fn identity(protocol: &ProtocolRef) -> usize {
    Arc::as_ptr(protocol) as *const () as usize
}

impl AutosendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns `false` if it was already present.
    pub fn insert(&mut self, protocol: ProtocolRef) -> bool {
        let id = identity(&protocol);
        if self.slots.contains_key(&id) {
            return false;
        }
        self.slots.insert(id, self.entries.len());
        self.entries.push(protocol);
        true
    }

    /// Unregister a connection in O(1). Returns `false` if it was absent.
    pub fn remove(&mut self, protocol: &ProtocolRef) -> bool {
        let Some(slot) = self.slots.remove(&identity(protocol)) else {
            return false;
        };

        self.entries.swap_remove(slot);
        if let Some(moved) = self.entries.get(slot) {
            self.slots.insert(identity(moved), slot);
        }
        true
    }

    #[inline]
    pub fn contains(&self, protocol: &ProtocolRef) -> bool {
        self.slots.contains_key(&identity(protocol))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtocolRef> {
        self.entries.iter()
    }

    /// Copy of the current members for one flush pass.
    pub fn snapshot(&self) -> Snapshot {
        self.entries.iter().cloned().collect()
    }
}
