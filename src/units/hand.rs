use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::{EntityRecord, FramePayload, HandPose, Tick};
use crate::units::cursor::{PlaybackCursor, RecordBuffer};
use crate::units::recordable::Recordable;

/// Type tag written into records produced by [`HandUnit`]
pub const HAND_KIND: &str = "hand";

/// Records and replays one tracked hand.
///
/// The tracker feeds the unit through [`HandUnit::hand_began`],
/// [`HandUnit::hand_updated`] and [`HandUnit::hand_finished`]. Begin and finish
/// become status events; a pose is stored on the first tick after an update.
pub struct HandUnit {
    descriptor: String,
    active: AtomicBool,
    state: Mutex<HandState>,
}

struct HandState {
    buffer: RecordBuffer,
    latest: Option<HandPose>,
    updated: bool,
    cursor: PlaybackCursor,
    /// Pose currently shown by the hand model during playback
    displayed: Option<HandPose>,
}

impl HandUnit {
    pub fn new(descriptor: &str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            active: AtomicBool::new(true),
            state: Mutex::new(HandState {
                buffer: RecordBuffer::new(descriptor, HAND_KIND),
                latest: None,
                updated: false,
                cursor: PlaybackCursor::new(),
                displayed: None,
            }),
        }
    }

    /// Tracker started seeing the hand
    pub fn hand_began(&self) {
        self.state.lock().buffer.push_status(true);
    }

    /// Tracker lost the hand
    pub fn hand_finished(&self) {
        self.state.lock().buffer.push_status(false);
    }

    /// Tracker produced a new pose
    pub fn hand_updated(&self, pose: HandPose) {
        let mut state = self.state.lock();
        state.latest = Some(pose);
        state.updated = true;
    }

    /// Pose currently applied to the hand model
    pub fn displayed_pose(&self) -> Option<HandPose> {
        self.state.lock().displayed.clone()
    }
}

impl Recordable for HandUnit {
    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn kind(&self) -> &str {
        HAND_KIND
    }

    fn start_recording(&self, tick: Tick) {
        let mut state = self.state.lock();
        state.buffer.start(tick, 1);
        state.updated = false;
    }

    fn record_tick(&self, tick: Tick) {
        let mut state = self.state.lock();
        if !state.buffer.is_recording() {
            return;
        }
        state.buffer.set_tick(tick);

        if state.updated {
            state.updated = false;
            if let Some(pose) = state.latest.clone() {
                state.buffer.push_frame(0, FramePayload::Hand(pose));
            }
        }
    }

    fn stop_recording(&self) -> EntityRecord {
        self.state.lock().buffer.finish()
    }

    fn start_playing(&self) {
        let mut state = self.state.lock();
        state.cursor.reset();
        state.displayed = None;
    }

    fn set_active_record(&self, record: Option<Arc<EntityRecord>>) {
        self.state.lock().cursor.set_record(record);
    }

    fn play_tick(&self, tick: Tick) -> Vec<String> {
        let mut state = self.state.lock();

        if state.cursor.seek(tick).is_empty() {
            return Vec::new();
        }

        let held = state.cursor.held_frame(0).map(|f| f.payload.clone());
        match held {
            Some(FramePayload::Hand(pose)) => {
                state.displayed = Some(pose);
                Vec::new()
            }
            Some(other) => vec![format!(
                "{}: expected a hand frame at tick {}, found {}",
                self.descriptor,
                tick,
                other.tag()
            )],
            None => Vec::new(),
        }
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chirality, TransformSample, Vec3};

    fn pose(pinch: f32) -> HandPose {
        HandPose {
            pinch_strength: pinch,
            ..HandPose::open(Chirality::Left)
        }
    }

    #[test]
    fn test_records_pose_after_update_only() {
        let unit = HandUnit::new("Hand_L");
        unit.start_recording(0);
        unit.record_tick(0);
        unit.hand_updated(pose(0.1));
        unit.record_tick(1);
        unit.record_tick(2);
        unit.hand_updated(pose(0.5));
        unit.record_tick(3);

        let record = unit.stop_recording();
        let ticks: Vec<Tick> = record.parts[0].frames.iter().map(|f| f.tick).collect();
        assert_eq!(ticks, vec![1, 3]);
    }

    #[test]
    fn test_begin_and_finish_become_status() {
        let unit = HandUnit::new("Hand_L");
        unit.start_recording(0);
        unit.record_tick(2);
        unit.hand_began();
        unit.record_tick(9);
        unit.hand_finished();

        let record = unit.stop_recording();
        assert_eq!(record.status.len(), 2);
        assert_eq!((record.status[0].tick, record.status[0].active), (2, true));
        assert_eq!((record.status[1].tick, record.status[1].active), (9, false));
    }

    #[test]
    fn test_playback_holds_last_pose() {
        let recorder = HandUnit::new("Hand_L");
        recorder.start_recording(0);
        for (tick, pinch) in [(0, 0.0), (10, 0.4), (25, 0.9)] {
            recorder.hand_updated(pose(pinch));
            recorder.record_tick(tick);
        }
        let record = Arc::new(recorder.stop_recording());

        let player = HandUnit::new("Hand_L");
        player.set_active_record(Some(record));
        player.start_playing();

        assert!(player.play_tick(15).is_empty());
        assert_eq!(player.displayed_pose().map(|p| p.pinch_strength), Some(0.4));
    }

    #[test]
    fn test_wrong_payload_yields_message() {
        let mut record = EntityRecord::new("Hand_L", HAND_KIND);
        let mut part = crate::core::RecordPart::new();
        part.add_frame(crate::core::Frame::new(
            0,
            FramePayload::Transform(TransformSample::at(Vec3::ZERO)),
        ));
        record.parts.push(part);

        let player = HandUnit::new("Hand_L");
        player.set_active_record(Some(Arc::new(record)));
        let messages = player.play_tick(0);
        assert_eq!(messages.len(), 1);
        assert!(player.displayed_pose().is_none());
    }
}
