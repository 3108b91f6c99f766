//! Specialized collection types
//!
//! Every long-lived object the engine hands out is addressed through a
//! slotmap key. Records hold keys, never references, so disposing an
//! object can never leave a dangling pointer inside a decal record.

pub use slotmap::{SecondaryMap, SlotMap};

slotmap::new_key_type! {
    /// Stable identifier of an uploaded logo or text asset
    pub struct AssetId;

    /// Stable identifier of a placed decal
    pub struct DecalId;

    /// Identifier of a mesh node inside the loaded model
    pub struct MeshId;

    /// Identifier of a material inside the loaded model
    pub struct MaterialId;

    /// Identifier of a geometric decal's derived render state
    pub struct VisualId;
}

/// Slot map that also remembers insertion order
///
/// Iteration order matters for decals (atlases are composited in placement
/// order) and for assets (the UI lists them in upload order), while lookups
/// still go through stable keys.
#[derive(Debug, Clone)]
pub struct OrderedSlotMap<K: slotmap::Key, V> {
    items: SlotMap<K, V>,
    order: Vec<K>,
}

impl<K: slotmap::Key, V> OrderedSlotMap<K, V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            items: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    /// Insert a value and return its key
    pub fn insert(&mut self, value: V) -> K {
        let key = self.items.insert(value);
        self.order.push(key);
        key
    }

    /// Insert a value built from its own key
    pub fn insert_with_key(&mut self, f: impl FnOnce(K) -> V) -> K {
        let key = self.items.insert_with_key(f);
        self.order.push(key);
        key
    }

    /// Remove a value by key
    pub fn remove(&mut self, key: K) -> Option<V> {
        let value = self.items.remove(key)?;
        self.order.retain(|k| *k != key);
        Some(value)
    }

    /// Get a value by key
    pub fn get(&self, key: K) -> Option<&V> {
        self.items.get(key)
    }

    /// Get a mutable value by key
    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.items.get_mut(key)
    }

    /// Whether `key` is live
    pub fn contains_key(&self, key: K) -> bool {
        self.items.contains_key(key)
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.order.iter().copied()
    }

    /// Values in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.order.iter().filter_map(move |k| self.items.get(*k).map(|v| (*k, v)))
    }

    /// Remove everything, returning the values in insertion order
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let order = std::mem::take(&mut self.order);
        let drained = order
            .into_iter()
            .filter_map(|k| self.items.remove(k).map(|v| (k, v)))
            .collect();
        self.items.clear();
        drained
    }
}

impl<K: slotmap::Key, V> Default for OrderedSlotMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
