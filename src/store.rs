//! Per-node message stores.
//!
//! Every node instance owns a named-slot store created when the node is
//! first instantiated and mutated as it runs. Downstream nodes read those
//! slots through value references. The stores live together in a
//! [`MessageHub`] owned by the engine, keyed by node id, so a reference
//! lookup is a plain map read.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Slot storage for every instantiated node of one engine.
#[derive(Clone, Debug, Default)]
pub struct MessageHub {
    stores: FxHashMap<String, FxHashMap<String, Value>>,
}

impl MessageHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a slot published by `node_id`. `None` means the producer has
    /// not run yet or never published the slot.
    pub fn get(&self, node_id: &str, slot: &str) -> Option<&Value> {
        self.stores.get(node_id)?.get(slot)
    }

    /// Write a slot, creating the node's store on first use. This is also
    /// the relocation node's `setMessage` path into foreign stores.
    pub fn set(&mut self, node_id: &str, slot: &str, value: Value) {
        self.stores
            .entry(node_id.to_string())
            .or_default()
            .insert(slot.to_string(), value);
    }

    /// Write a slot only if it is not already present.
    pub fn set_if_absent(&mut self, node_id: &str, slot: &str, value: Value) {
        let store = self.stores.entry(node_id.to_string()).or_default();
        store.entry(slot.to_string()).or_insert(value);
    }

    /// Whether `node_id` has any store at all.
    pub fn contains_node(&self, node_id: &str) -> bool {
        self.stores.contains_key(node_id)
    }

    /// The full store of one node, if present.
    pub fn store(&self, node_id: &str) -> Option<&FxHashMap<String, Value>> {
        self.stores.get(node_id)
    }

    /// Snapshot one node's store as a JSON object.
    pub fn snapshot(&self, node_id: &str) -> Value {
        match self.stores.get(node_id) {
            Some(store) => Value::Object(
                store
                    .iter()
                    .map(|(slot, value)| (slot.clone(), value.clone()))
                    .collect(),
            ),
            None => Value::Object(Default::default()),
        }
    }

    /// Drop one node's store (memory reclamation between loop iterations
    /// and at engine teardown).
    pub fn remove_node(&mut self, node_id: &str) {
        self.stores.remove(node_id);
    }

    pub fn clear(&mut self) {
        self.stores.clear();
    }

    pub fn node_count(&self) -> usize {
        self.stores.len()
    }
}
