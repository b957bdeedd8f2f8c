use std::collections::HashMap;
use std::sync::Arc;

use crate::core::EntityKey;
use crate::units::hand::{HandUnit, HAND_KIND};
use crate::units::mock::MockUnit;
use crate::units::recordable::UnitHandle;
use crate::units::transform::{TransformUnit, TRANSFORM_KIND};

/// Set of live units currently present in the scene, keyed by identity
#[derive(Clone, Default)]
pub struct UnitRegistry {
    units: Vec<UnitHandle>,
    by_key: HashMap<EntityKey, usize>,
    by_descriptor: HashMap<String, usize>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit, replacing any unit registered under the same key.
    /// Returns the replaced unit.
    pub fn register(&mut self, unit: UnitHandle) -> Option<UnitHandle> {
        let key = unit.key();
        if let Some(&index) = self.by_key.get(&key) {
            return Some(std::mem::replace(&mut self.units[index], unit));
        }

        let index = self.units.len();
        self.by_descriptor.entry(key.descriptor.clone()).or_insert(index);
        self.by_key.insert(key, index);
        self.units.push(unit);
        None
    }

    /// Remove a unit (it left the scene)
    pub fn remove(&mut self, key: &EntityKey) -> Option<UnitHandle> {
        let index = self.by_key.get(key).copied()?;
        let unit = self.units.remove(index);
        self.reindex();
        Some(unit)
    }

    fn reindex(&mut self) {
        self.by_key.clear();
        self.by_descriptor.clear();
        for (index, unit) in self.units.iter().enumerate() {
            let key = unit.key();
            self.by_descriptor.entry(key.descriptor.clone()).or_insert(index);
            self.by_key.insert(key, index);
        }
    }

    /// Unit for an identity: exact key first, then any unit with the same descriptor
    pub fn find(&self, key: &EntityKey) -> Option<UnitHandle> {
        self.by_key
            .get(key)
            .or_else(|| self.by_descriptor.get(&key.descriptor))
            .map(|&i| self.units[i].clone())
    }

    pub fn find_descriptor(&self, descriptor: &str) -> Option<UnitHandle> {
        self.by_descriptor.get(descriptor).map(|&i| self.units[i].clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitHandle> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Create a stand-alone unit able to play back records of `key`'s kind
pub fn unit_for(key: &EntityKey) -> UnitHandle {
    match key.kind.as_str() {
        TRANSFORM_KIND => Arc::new(TransformUnit::new(
            &key.descriptor,
            Arc::new(parking_lot::Mutex::new(Default::default())),
        )),
        HAND_KIND => Arc::new(HandUnit::new(&key.descriptor)),
        other => Arc::new(MockUnit::new(&key.descriptor, other)),
    }
}
