use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::record::{EntityKey, EntityRecord, Tick};

/// Result of one recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingStream {
    /// Ticks per second
    pub frame_rate: u32,
    /// Total number of ticks in the session
    pub frame_count: Tick,
    /// When the session was stopped
    pub recorded_at: DateTime<Utc>,
    /// Recorded entities, in recording order
    pub entities: Vec<Arc<EntityRecord>>,
}

impl RecordingStream {
    pub fn new(frame_rate: u32, frame_count: Tick, entities: Vec<EntityRecord>) -> Self {
        Self {
            frame_rate,
            frame_count,
            recorded_at: Utc::now(),
            entities: entities.into_iter().map(Arc::new).collect(),
        }
    }

    /// Duration of one tick in seconds
    pub fn tick_interval(&self) -> f64 {
        1.0 / self.frame_rate.max(1) as f64
    }

    /// Length of the stream in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 * self.tick_interval()
    }

    /// Find the record for an entity identity
    pub fn find(&self, key: &EntityKey) -> Option<&Arc<EntityRecord>> {
        self.entities.iter().find(|e| e.matches(key))
    }

    /// Highest tick referenced by any entity
    pub fn max_tick(&self) -> Tick {
        self.entities.iter().map(|e| e.max_tick()).max().unwrap_or(0)
    }

    pub fn total_frames(&self) -> usize {
        self.entities
            .iter()
            .flat_map(|e| e.parts.iter())
            .map(|p| p.frames.len())
            .sum()
    }

    /// Check structural integrity, returning the first defect found
    pub fn validate(&self) -> Result<(), String> {
        if self.frame_rate == 0 {
            return Err("frame rate must be positive".to_string());
        }

        for entity in &self.entities {
            if entity.descriptor.is_empty() {
                return Err("entity with empty descriptor".to_string());
            }
            for (i, part) in entity.parts.iter().enumerate() {
                if !part.is_strictly_increasing() {
                    return Err(format!(
                        "part {} of {} has frames out of tick order",
                        i,
                        entity.key()
                    ));
                }
            }
            if !entity.status.windows(2).all(|w| w[0].tick < w[1].tick) {
                return Err(format!("status events of {} out of tick order", entity.key()));
            }
        }

        let max_tick = self.max_tick();
        if max_tick > self.frame_count {
            return Err(format!(
                "frame count {} is below the last recorded tick {}",
                self.frame_count, max_tick
            ));
        }

        Ok(())
    }
}
