//! Resolution of recorded entities onto live units.
//!
//! One binder exists per `(descriptor, kind)` identity found in any loaded
//! stream. Binders survive reloads: a rebuild resets their counts and
//! re-resolves instead of starting from an empty table.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{EntityKey, EntityRecord, RecordingStream};
use crate::units::{UnitHandle, UnitRegistry};

/// Runtime association of one recorded identity with a live unit
pub struct Binder {
    pub key: EntityKey,
    /// Number of loaded streams containing this identity
    pub count: usize,
    /// Live unit, if one is present in the scene
    pub unit: Option<UnitHandle>,
    /// Record of this identity in the active stream
    pub record: Option<Arc<EntityRecord>>,
}

/// Summary of one binder for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderInfo {
    pub key: EntityKey,
    pub count: usize,
    pub bound: bool,
    pub has_record: bool,
}

/// Outcome of a rebuild
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RebuildReport {
    pub binders: usize,
    pub dropped: usize,
    pub unbound: usize,
    /// Some binder is missing from at least one stream
    pub mismatch: bool,
    /// Binders that gained a live unit in this rebuild
    pub attached: Vec<EntityKey>,
}

#[derive(Default)]
pub struct BindingTable {
    binders: Vec<Binder>,
    index: HashMap<EntityKey, usize>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.binders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }

    /// Binders in table order
    pub fn binders(&self) -> &[Binder] {
        &self.binders
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Binder> {
        self.index.get(key).map(|&i| &self.binders[i])
    }

    pub fn info(&self) -> Vec<BinderInfo> {
        self.binders
            .iter()
            .map(|b| BinderInfo {
                key: b.key.clone(),
                count: b.count,
                bound: b.unit.is_some(),
                has_record: b.record.is_some(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.binders.clear();
        self.index.clear();
    }

    /// Re-resolve the table against a new set of streams and live units.
    ///
    /// Counts are recomputed from scratch, units are attached only to binders
    /// that have none, and binders no stream mentions any more are dropped.
    /// Identical inputs always produce an identical table.
    pub fn rebuild(&mut self, streams: &[Arc<RecordingStream>], units: &UnitRegistry) -> RebuildReport {
        for binder in &mut self.binders {
            binder.count = 0;
        }
        let mut attached = Vec::new();

        for stream in streams {
            for entity in &stream.entities {
                let key = entity.key();
                let index = match self.index.get(&key) {
                    Some(&i) => i,
                    None => {
                        self.binders.push(Binder {
                            key: key.clone(),
                            count: 0,
                            unit: None,
                            record: None,
                        });
                        self.index.insert(key.clone(), self.binders.len() - 1);
                        self.binders.len() - 1
                    }
                };

                let binder = &mut self.binders[index];
                binder.count += 1;
                if binder.unit.is_none() {
                    binder.unit = units.find(&key);
                    if binder.unit.is_some() {
                        attached.push(key);
                    }
                }
            }
        }

        let before = self.binders.len();
        self.binders.retain(|b| b.count > 0);
        self.index = self
            .binders
            .iter()
            .enumerate()
            .map(|(i, b)| (b.key.clone(), i))
            .collect();

        let report = RebuildReport {
            binders: self.binders.len(),
            dropped: before - self.binders.len(),
            unbound: self.binders.iter().filter(|b| b.unit.is_none()).count(),
            mismatch: self.binders.iter().any(|b| b.count != streams.len()),
            attached,
        };

        if report.mismatch {
            warn!(
                "Mismatch between recorded entities and {} loaded files; some entities have no playback data in every file",
                streams.len()
            );
        }
        debug!(
            "Binding table rebuilt: {} binders, {} dropped, {} without a live unit",
            report.binders, report.dropped, report.unbound
        );

        report
    }

    /// Point every binder at its record in `stream` and push it to the unit.
    /// Binders absent from the stream lose their record and freeze.
    pub fn resolve_active_stream(&mut self, stream: &RecordingStream) {
        for binder in &mut self.binders {
            binder.record = stream.find(&binder.key).cloned();
            if let Some(unit) = &binder.unit {
                unit.set_active_record(binder.record.clone());
            }
        }
    }

    /// Drop every binder's record, leaving units frozen
    pub fn clear_records(&mut self) {
        for binder in &mut self.binders {
            binder.record = None;
            if let Some(unit) = &binder.unit {
                unit.set_active_record(None);
            }
        }
    }
}
