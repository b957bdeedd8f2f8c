//! Playback session: owns the loaded streams, the binding table and the
//! timing thread.
//!
//! The engine object lives on the control thread. The timing thread only
//! reads the session and feeds units their frames; activation changes and
//! messages come back over a channel and are applied in [`PlaybackEngine::update`].

use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::core::{EntityKey, RecordingStream, Tick};
use crate::error::{ReplayError, Result};
use crate::input::{LoadReport, LoadTask, NamedBuffer, StreamLoader};
use crate::playback::binding::{BinderInfo, BindingTable, RebuildReport};
use crate::playback::clock::{PlaybackClock, TickStep};
use crate::playback::dispatch::{dispatch_tick, StatusChange, TickReport};
use crate::playback::{PlaybackEvent, PlaybackState};
use crate::settings::PlaybackConfig;
use crate::units::UnitRegistry;

/// Loaded streams and the table bound against them
#[derive(Default)]
struct Session {
    streams: Vec<Arc<RecordingStream>>,
    active: usize,
    table: BindingTable,
}

impl Session {
    fn active_stream(&self) -> Option<&Arc<RecordingStream>> {
        self.streams.get(self.active)
    }

    /// Swap in a new stream set. The active index carries over from the
    /// previous set; `default_stream` only applies when nothing was loaded.
    fn replace_streams(
        &mut self,
        streams: Vec<Arc<RecordingStream>>,
        units: &UnitRegistry,
        default_stream: usize,
        playing: bool,
    ) -> RebuildReport {
        let preferred = if self.streams.is_empty() {
            default_stream
        } else {
            self.active
        };
        self.streams = streams;
        let report = self.rebind(units, playing);
        self.activate(preferred);
        report
    }

    /// Rebuild the table. Units attached during playback are started here
    /// since they missed the call made when playback began.
    fn rebind(&mut self, units: &UnitRegistry, playing: bool) -> RebuildReport {
        let report = self.table.rebuild(&self.streams, units);
        if playing {
            for key in &report.attached {
                if let Some(unit) = self.table.get(key).and_then(|b| b.unit.as_ref()) {
                    debug!("Starting {} attached during playback", key);
                    unit.start_playing();
                }
            }
        }
        report
    }

    /// Make `index` (clamped) the active stream and hand its records to the
    /// bound units. Returns `None` when nothing is loaded.
    fn activate(&mut self, index: usize) -> Option<usize> {
        if self.streams.is_empty() {
            self.active = 0;
            self.table.clear_records();
            return None;
        }

        let last = self.streams.len() - 1;
        if index > last {
            warn!("Stream index {} out of range, using stream {}", index, last);
        }
        self.active = index.min(last);
        self.table.resolve_active_stream(&self.streams[self.active]);
        Some(self.active)
    }
}

/// State shared with the timing thread and the loader worker.
/// Each atomic has a single writer, noted per field.
struct Shared {
    session: RwLock<Session>,
    /// Control thread
    playing: AtomicBool,
    /// Control thread
    paused: AtomicBool,
    /// Loader worker (its busy flag)
    loading: Arc<AtomicBool>,
    /// Timing thread, or the control thread before the timing thread exists
    current_tick: AtomicU32,
    /// Set by the loader after swapping streams, cleared by the timing thread
    /// which then treats its next tick as a discontinuity
    resync: AtomicBool,
}

enum ClockCommand {
    Scrub(Tick),
    SetRate(f64),
    Resync,
}

enum TimerReport {
    Tick(TickReport),
    ReachedEnd(Tick),
}

struct Timer {
    thread: JoinHandle<()>,
    commands: flume::Sender<ClockCommand>,
}

/// Record/playback session bound to a set of live units
pub struct PlaybackEngine {
    shared: Arc<Shared>,
    registry: UnitRegistry,
    config: PlaybackConfig,
    loader: StreamLoader,
    pending_load: Option<LoadTask>,
    timer: Option<Timer>,
    reports_tx: flume::Sender<TimerReport>,
    reports_rx: flume::Receiver<TimerReport>,
    events: Vec<PlaybackEvent>,
    playback_rate: f64,
}

impl PlaybackEngine {
    pub fn new(registry: UnitRegistry, config: PlaybackConfig) -> Self {
        let loader = StreamLoader::new();
        let shared = Arc::new(Shared {
            session: RwLock::new(Session::default()),
            playing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            loading: loader.busy_flag(),
            current_tick: AtomicU32::new(0),
            resync: AtomicBool::new(false),
        });
        let (reports_tx, reports_rx) = flume::unbounded();
        let playback_rate = sanitize_rate(config.playback_rate);

        Self {
            shared,
            registry,
            config,
            loader,
            pending_load: None,
            timer: None,
            reports_tx,
            reports_rx,
            events: Vec::new(),
            playback_rate,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// Changes take effect on the next load or [`PlaybackEngine::rebind`]
    pub fn registry_mut(&mut self) -> &mut UnitRegistry {
        &mut self.registry
    }

    // ---- loading ----

    /// Replace the loaded streams with the decoded contents of `buffers`.
    ///
    /// Decoding runs on a background worker which also rebuilds the binding
    /// table. Completion is reported by [`PlaybackEngine::update`] or awaited
    /// with [`PlaybackEngine::finish_loading`]. Refused while a load is running.
    pub fn load_streams(&mut self, buffers: Vec<NamedBuffer>) -> Result<()> {
        self.poll_load();

        let shared = Arc::clone(&self.shared);
        let registry = self.registry.clone();
        let default_stream = self.config.default_stream;

        let task = self.loader.load_all(buffers, move |report| {
            let playing = shared.playing.load(Ordering::SeqCst);
            let mut session = shared.session.write();
            session.replace_streams(report.streams.clone(), &registry, default_stream, playing);
            shared.resync.store(true, Ordering::SeqCst);
        })?;

        self.pending_load = Some(task);
        Ok(())
    }

    /// Wait for the running load, if any. Returns false when nothing was loading.
    pub async fn finish_loading(&mut self) -> bool {
        let Some(task) = self.pending_load.take() else {
            return false;
        };
        let report = task.finish().await;
        self.complete_load(report);
        true
    }

    /// Blocking variant of [`PlaybackEngine::finish_loading`]; not for use
    /// inside an async runtime
    pub fn finish_loading_blocking(&mut self) -> bool {
        let Some(task) = self.pending_load.take() else {
            return false;
        };
        let report = task.finish_blocking();
        self.complete_load(report);
        true
    }

    pub fn is_loading(&self) -> bool {
        self.shared.loading.load(Ordering::SeqCst)
    }

    fn poll_load(&mut self) {
        let Some(task) = self.pending_load.as_mut() else {
            return;
        };
        if let Some(report) = task.try_finish() {
            self.pending_load = None;
            self.complete_load(report);
        }
    }

    fn complete_load(&mut self, report: LoadReport) {
        let failed: Vec<String> = report.failed.iter().map(|f| f.name.clone()).collect();
        info!(
            "Loaded {} recording files, {} failed",
            report.streams.len(),
            failed.len()
        );
        self.events.push(PlaybackEvent::LoadFinished {
            loaded: report.streams.len(),
            failed,
        });
        self.push_active_stream_event();
    }

    fn push_active_stream_event(&mut self) {
        let session = self.shared.session.read();
        if let Some(stream) = session.active_stream() {
            self.events.push(PlaybackEvent::ActiveStreamChanged {
                index: session.active,
                frame_rate: stream.frame_rate,
                frame_count: stream.frame_count,
            });
        }
    }

    /// Bind the loaded streams against the current registry, attaching units
    /// registered since the last load
    pub fn rebind(&mut self) -> Result<RebuildReport> {
        self.poll_load();
        if self.is_loading() {
            info!("Files are currently changing, binding unchanged");
            return Err(ReplayError::LoadInProgress);
        }

        let playing = self.timer.is_some();
        let report = {
            let mut session = self.shared.session.write();
            let report = session.rebind(&self.registry, playing);
            let active = session.active;
            session.activate(active);
            report
        };

        if let Some(timer) = &self.timer {
            let _ = timer.commands.send(ClockCommand::Resync);
        }
        Ok(report)
    }

    // ---- control ----

    /// Switch the stream being played back. Out-of-range indices are clamped.
    pub fn set_active_stream(&mut self, index: usize) -> Result<usize> {
        self.poll_load();
        if self.is_loading() {
            info!("Files are currently changing, active stream unchanged");
            return Err(ReplayError::LoadInProgress);
        }

        let active = self
            .shared
            .session
            .write()
            .activate(index)
            .ok_or(ReplayError::NoStreamsLoaded)?;

        debug!("Active stream is now {}", active);
        self.push_active_stream_event();
        if let Some(timer) = &self.timer {
            let _ = timer.commands.send(ClockCommand::Resync);
        }
        Ok(active)
    }

    /// Start playback from tick 0.
    ///
    /// Tick 0 is dispatched and applied here, before the timing thread starts,
    /// so every unit shows the first recorded state immediately.
    pub fn start_playing(&mut self) -> Result<()> {
        self.poll_load();
        if self.is_loading() {
            error!("Cannot start playback while files are loading");
            return Err(ReplayError::LoadInProgress);
        }
        if self.timer.is_some() {
            debug!("Playback already running");
            return Ok(());
        }

        let (frame_rate, frame_count, initial) = {
            let session = self.shared.session.read();
            let Some(stream) = session.active_stream() else {
                error!("No files to play");
                return Err(ReplayError::NoStreamsLoaded);
            };

            for binder in session.table.binders() {
                if let Some(unit) = &binder.unit {
                    unit.start_playing();
                }
            }
            let initial = dispatch_tick(
                &session.table,
                TickStep {
                    tick: 0,
                    discontinuity: true,
                },
            );
            (stream.frame_rate, stream.frame_count, initial)
        };

        self.shared.current_tick.store(0, Ordering::SeqCst);
        self.shared.resync.store(false, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.playing.store(true, Ordering::SeqCst);
        self.apply_reports(vec![TimerReport::Tick(initial)]);

        let mut clock = PlaybackClock::new(frame_rate, frame_count)
            .with_scrub_wait(self.config.scrub_wait_secs)
            .with_looping(self.config.loop_playback);
        clock.set_rate(self.playback_rate);

        let (commands, command_rx) = flume::unbounded();
        let shared = Arc::clone(&self.shared);
        let reports = self.reports_tx.clone();
        let idle = Duration::from_millis(self.config.idle_sleep_ms);

        let spawned = std::thread::Builder::new()
            .name("playback-timer".to_string())
            .spawn(move || run_timer(shared, clock, idle, command_rx, reports));

        match spawned {
            Ok(thread) => {
                self.timer = Some(Timer { thread, commands });
                info!("Playback started at {} fps", frame_rate);
                Ok(())
            }
            Err(e) => {
                self.shared.playing.store(false, Ordering::SeqCst);
                error!("Failed to spawn timing thread: {}", e);
                Err(e.into())
            }
        }
    }

    /// Start playback when stopped, otherwise flip the pause state.
    /// Returns true when playback is not advancing afterwards.
    pub fn toggle_pause(&mut self) -> bool {
        if self.timer.is_none() {
            return match self.start_playing() {
                Ok(()) => false,
                Err(e) => {
                    error!("Unable to start playback: {}", e);
                    true
                }
            };
        }

        let paused = !self.shared.paused.load(Ordering::SeqCst);
        self.shared.paused.store(paused, Ordering::SeqCst);
        info!("Playback {}", if paused { "paused" } else { "resumed" });
        paused
    }

    /// Request a jump to `tick` once the scrub window passes without another
    /// request. Returns the (clamped) target, or `None` when not playing.
    pub fn scrub_to(&mut self, tick: Tick) -> Option<Tick> {
        let Some(timer) = &self.timer else {
            warn!("Scrub to tick {} ignored, playback is not running", tick);
            return None;
        };

        let end = self
            .shared
            .session
            .read()
            .active_stream()
            .map_or(0, |s| s.frame_count);
        let target = if tick > end {
            warn!("Scrub target {} is past the last tick {}, clamped", tick, end);
            end
        } else {
            tick
        };

        if timer.commands.send(ClockCommand::Scrub(target)).is_err() {
            warn!("Timing thread is gone, scrub dropped");
            return None;
        }
        Some(target)
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.playback_rate = sanitize_rate(rate);
        if let Some(timer) = &self.timer {
            let _ = timer.commands.send(ClockCommand::SetRate(self.playback_rate));
        }
    }

    /// Stop the timing thread and deliver whatever it reported before exiting
    pub fn stop(&mut self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);

        if let Some(timer) = self.timer.take() {
            drop(timer.commands);
            if timer.thread.join().is_err() {
                error!("Timing thread panicked");
            }
            info!("Playback stopped at tick {}", self.current_tick());
        }
        self.drain_reports();
    }

    /// Control-thread pass: collect a finished load, apply queued activation
    /// changes and return pending events. Call once per frame.
    pub fn update(&mut self) -> Vec<PlaybackEvent> {
        self.poll_load();

        let timer_died = self
            .timer
            .as_ref()
            .is_some_and(|t| t.thread.is_finished() && self.shared.playing.load(Ordering::SeqCst));
        if timer_died {
            error!("Timing thread exited unexpectedly, stopping playback");
            self.stop();
        }

        self.drain_reports();
        std::mem::take(&mut self.events)
    }

    fn drain_reports(&mut self) {
        let reports: Vec<TimerReport> = self.reports_rx.try_iter().collect();
        if !reports.is_empty() {
            self.apply_reports(reports);
        }
    }

    /// Turn reports into events and apply status changes, one per unit
    fn apply_reports(&mut self, reports: Vec<TimerReport>) {
        let mut pending: Vec<StatusChange> = Vec::new();
        let mut slots: HashMap<EntityKey, usize> = HashMap::new();

        for report in reports {
            match report {
                TimerReport::Tick(tick) => {
                    for unit in tick.messages {
                        for message in &unit.messages {
                            debug!("{} @ {}: {}", unit.key, tick.tick, message);
                        }
                        self.events.push(PlaybackEvent::PlayMessages {
                            key: unit.key,
                            messages: unit.messages,
                        });
                    }
                    for change in tick.status {
                        match slots.entry(change.key.clone()) {
                            Entry::Occupied(slot) => pending[*slot.get()] = change,
                            Entry::Vacant(slot) => {
                                slot.insert(pending.len());
                                pending.push(change);
                            }
                        }
                    }
                }
                TimerReport::ReachedEnd(tick) => {
                    info!("Reached the end of the stream at tick {}", tick);
                    self.events.push(PlaybackEvent::ReachedEnd { tick });
                }
            }
        }

        for change in pending {
            change.unit.set_active(change.active);
        }
    }

    // ---- queries ----

    pub fn state(&self) -> PlaybackState {
        if !self.shared.playing.load(Ordering::SeqCst) {
            PlaybackState::Stopped
        } else if self.shared.paused.load(Ordering::SeqCst) {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn current_tick(&self) -> Tick {
        self.shared.current_tick.load(Ordering::SeqCst)
    }

    /// Current position in seconds of the active stream
    pub fn current_time(&self) -> f64 {
        let session = self.shared.session.read();
        session
            .active_stream()
            .map_or(0.0, |s| self.current_tick() as f64 / s.frame_rate as f64)
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn active_stream(&self) -> Option<usize> {
        let session = self.shared.session.read();
        session.active_stream().map(|_| session.active)
    }

    pub fn stream_count(&self) -> usize {
        self.shared.session.read().streams.len()
    }

    pub fn streams(&self) -> Vec<Arc<RecordingStream>> {
        self.shared.session.read().streams.clone()
    }

    pub fn binders(&self) -> Vec<BinderInfo> {
        self.shared.session.read().table.info()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate >= 0.0 {
        rate
    } else {
        warn!("Invalid playback rate {}, using 0", rate);
        0.0
    }
}

fn run_timer(
    shared: Arc<Shared>,
    mut clock: PlaybackClock,
    idle: Duration,
    commands: flume::Receiver<ClockCommand>,
    reports: flume::Sender<TimerReport>,
) {
    debug!("Timing thread started");
    let mut last = Instant::now();

    while shared.playing.load(Ordering::SeqCst) {
        let now = Instant::now();
        let delta = now.duration_since(last).as_secs_f64();
        last = now;

        // Nothing advances while a load swaps the session; commands stay queued
        if shared.loading.load(Ordering::SeqCst) {
            std::thread::sleep(idle);
            continue;
        }

        {
            let session = shared.session.read();
            if let Some(stream) = session.active_stream() {
                clock.set_frame_rate(stream.frame_rate);
                clock.set_end_tick(stream.frame_count);
            }

            for command in commands.try_iter() {
                match command {
                    ClockCommand::Scrub(tick) => {
                        clock.request_scrub(tick);
                    }
                    ClockCommand::SetRate(rate) => clock.set_rate(rate),
                    ClockCommand::Resync => clock.resync(),
                }
            }
            if shared.resync.swap(false, Ordering::SeqCst) {
                clock.resync();
            }
            clock.set_paused(shared.paused.load(Ordering::SeqCst));

            for step in clock.advance(delta) {
                let report = dispatch_tick(&session.table, step);
                shared.current_tick.store(step.tick, Ordering::SeqCst);
                if reports.send(TimerReport::Tick(report)).is_err() {
                    return;
                }
            }
        }

        if clock.take_end_reached() {
            let _ = reports.send(TimerReport::ReachedEnd(clock.current_tick()));
        }
        std::thread::sleep(idle);
    }

    debug!("Timing thread exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityRecord, Frame, FramePayload, RecordPart, TransformSample, Vec3};
    use crate::input::encode_stream;
    use crate::units::MockUnit;

    const WAIT: Duration = Duration::from_secs(5);

    fn cube_stream(frame_rate: u32, frame_count: Tick) -> RecordingStream {
        let mut cube = EntityRecord::new("Cube", "transform");
        let mut part = RecordPart::new();
        for tick in [0, 10, 25] {
            part.add_frame(Frame::new(
                tick,
                FramePayload::Transform(TransformSample::at(Vec3::new(tick as f32, 0.0, 0.0))),
            ));
        }
        cube.parts.push(part);
        cube.add_status(true, 0);
        cube.add_status(false, 10);
        cube.add_status(true, 25);
        RecordingStream::new(frame_rate, frame_count, vec![cube])
    }

    fn buffer(name: &str, stream: &RecordingStream) -> NamedBuffer {
        NamedBuffer::new(name, encode_stream(stream).unwrap())
    }

    fn engine_with_cube(config: PlaybackConfig) -> (PlaybackEngine, Arc<MockUnit>) {
        let unit = Arc::new(MockUnit::new("Cube", "transform"));
        let mut registry = UnitRegistry::new();
        registry.register(unit.clone());
        (PlaybackEngine::new(registry, config), unit)
    }

    fn fast_config() -> PlaybackConfig {
        PlaybackConfig {
            scrub_wait_secs: 0.02,
            ..Default::default()
        }
    }

    /// Run update passes until `done` holds, collecting events
    fn pump_until(
        engine: &mut PlaybackEngine,
        mut done: impl FnMut(&PlaybackEngine, &[PlaybackEvent]) -> bool,
    ) -> Vec<PlaybackEvent> {
        let start = Instant::now();
        let mut events = Vec::new();
        loop {
            events.extend(engine.update());
            if done(engine, &events) {
                return events;
            }
            assert!(start.elapsed() < WAIT, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[tokio::test]
    async fn test_load_reports_failures_and_binds() {
        let (mut engine, unit) = engine_with_cube(fast_config());
        engine
            .load_streams(vec![
                buffer("good", &cube_stream(30, 90)),
                NamedBuffer::new("bad", b"SRPL\x01\x00garbage".to_vec()),
            ])
            .unwrap();
        assert!(engine.finish_loading().await);

        let events = engine.update();
        assert!(events.contains(&PlaybackEvent::LoadFinished {
            loaded: 1,
            failed: vec!["bad".to_string()],
        }));
        assert!(events.contains(&PlaybackEvent::ActiveStreamChanged {
            index: 0,
            frame_rate: 30,
            frame_count: 90,
        }));
        assert!(unit.has_record());

        let binders = engine.binders();
        assert_eq!(binders.len(), 1);
        assert!(binders[0].bound);
        assert_eq!(engine.stream_count(), 1);
    }

    /// One cube whose only status event is `active` at tick 0
    fn status_stream(frame_rate: u32, active: bool) -> RecordingStream {
        let mut cube = EntityRecord::new("Cube", "transform");
        let mut part = RecordPart::new();
        part.add_frame(Frame::new(0, FramePayload::Transform(TransformSample::default())));
        cube.parts.push(part);
        cube.add_status(active, 0);
        RecordingStream::new(frame_rate, 10_000, vec![cube])
    }

    #[tokio::test]
    async fn test_three_files_one_invalid() {
        let (mut engine, unit) = engine_with_cube(fast_config());
        engine
            .load_streams(vec![
                buffer("first", &cube_stream(30, 90)),
                NamedBuffer::new("bad", b"not a recording".to_vec()),
                buffer("second", &cube_stream(60, 120)),
            ])
            .unwrap();
        assert!(engine.finish_loading().await);

        let events = engine.update();
        assert!(events.contains(&PlaybackEvent::LoadFinished {
            loaded: 2,
            failed: vec!["bad".to_string()],
        }));
        assert_eq!(engine.stream_count(), 2);
        assert_eq!(engine.streams()[1].frame_rate, 60);

        // The failed file does not count as a stream missing the cube
        let binders = engine.binders();
        assert_eq!(binders.len(), 1);
        assert!(binders.iter().all(|b| b.count == 2 && b.bound));
        assert!(unit.has_record());
    }

    #[test]
    fn test_default_stream_applies_to_first_load() {
        let config = PlaybackConfig {
            default_stream: 1,
            ..fast_config()
        };
        let (mut engine, _) = engine_with_cube(config);
        engine
            .load_streams(vec![
                buffer("a", &cube_stream(30, 90)),
                buffer("b", &cube_stream(60, 10)),
            ])
            .unwrap();
        engine.finish_loading_blocking();
        assert_eq!(engine.active_stream(), Some(1));
    }

    #[test]
    fn test_reload_keeps_active_stream() {
        let (mut engine, _) = engine_with_cube(fast_config());
        let batch = || {
            vec![
                buffer("a", &cube_stream(30, 90)),
                buffer("b", &cube_stream(60, 10)),
            ]
        };
        engine.load_streams(batch()).unwrap();
        engine.finish_loading_blocking();
        engine.set_active_stream(1).unwrap();
        engine.update();

        engine.load_streams(batch()).unwrap();
        engine.finish_loading_blocking();
        assert_eq!(engine.active_stream(), Some(1));
        assert!(engine.update().contains(&PlaybackEvent::ActiveStreamChanged {
            index: 1,
            frame_rate: 60,
            frame_count: 10,
        }));
    }

    #[test]
    fn test_load_flags_resync_for_timer() {
        let (mut engine, _) = engine_with_cube(fast_config());
        engine
            .load_streams(vec![buffer("take", &status_stream(30, true))])
            .unwrap();
        engine.finish_loading_blocking();
        assert!(engine.shared.resync.load(Ordering::SeqCst));

        // Starting dispatches its own discontinuity at tick 0
        engine.start_playing().unwrap();
        assert!(!engine.shared.resync.load(Ordering::SeqCst));
        engine.stop();
    }

    #[test]
    fn test_reload_while_playing_rederives_status() {
        let (mut engine, unit) = engine_with_cube(fast_config());
        engine
            .load_streams(vec![buffer("on", &status_stream(30, true))])
            .unwrap();
        engine.finish_loading_blocking();
        engine.start_playing().unwrap();
        assert_eq!(unit.activations(), vec![true]);

        // The new take never records a change after tick 0, so only a full
        // history lookup on the first tick after the swap turns the cube off
        engine
            .load_streams(vec![buffer("off", &status_stream(30, false))])
            .unwrap();
        engine.finish_loading_blocking();
        pump_until(&mut engine, |_, _| unit.activations().last() == Some(&false));
        engine.stop();
    }

    #[test]
    fn test_unit_attached_during_playback_is_started() {
        let (mut engine, cube) = engine_with_cube(fast_config());
        engine
            .load_streams(vec![buffer("take", &cube_stream(30, 10_000))])
            .unwrap();
        engine.finish_loading_blocking();
        engine.start_playing().unwrap();

        let sphere = Arc::new(MockUnit::new("Sphere", "transform"));
        engine.registry_mut().register(sphere.clone());

        let mut both = cube_stream(30, 10_000);
        both.entities.push(Arc::new(EntityRecord::new("Sphere", "transform")));
        engine.load_streams(vec![buffer("both", &both)]).unwrap();
        engine.finish_loading_blocking();

        assert_eq!(sphere.start_count(), 1);
        assert!(sphere.has_record());
        assert_eq!(cube.start_count(), 1);
        engine.stop();
    }

    #[test]
    fn test_rebind_attaches_registered_units() {
        let mut engine = PlaybackEngine::new(UnitRegistry::new(), fast_config());
        engine
            .load_streams(vec![buffer("take", &cube_stream(30, 90))])
            .unwrap();
        engine.finish_loading_blocking();
        assert!(!engine.binders()[0].bound);

        let unit = Arc::new(MockUnit::new("Cube", "transform"));
        engine.registry_mut().register(unit.clone());
        let report = engine.rebind().unwrap();

        assert_eq!(report.attached, vec![EntityKey::new("Cube", "transform")]);
        assert!(engine.binders()[0].bound);
        assert!(unit.has_record());
        assert_eq!(unit.start_count(), 0);

        engine.start_playing().unwrap();
        assert_eq!(unit.start_count(), 1);
        assert_eq!(unit.played_ticks().first(), Some(&0));
        engine.stop();
    }

    #[test]
    fn test_start_requires_streams() {
        let (mut engine, _) = engine_with_cube(fast_config());
        assert!(matches!(engine.start_playing(), Err(ReplayError::NoStreamsLoaded)));
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(engine.toggle_pause());
    }

    #[test]
    fn test_start_dispatches_tick_zero_and_applies_status() {
        let (mut engine, unit) = engine_with_cube(fast_config());
        engine
            .load_streams(vec![buffer("take", &cube_stream(30, 90))])
            .unwrap();
        engine.finish_loading_blocking();
        engine.update();

        engine.start_playing().unwrap();
        assert_eq!(unit.played_ticks().first(), Some(&0));
        assert_eq!(unit.activations(), vec![true]);
        assert_eq!(unit.start_count(), 1);
        engine.stop();
        assert_eq!(engine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_playback_reaches_end_and_ticks_once_each() {
        let (mut engine, unit) = engine_with_cube(fast_config());
        engine
            .load_streams(vec![buffer("take", &cube_stream(64, 30))])
            .unwrap();
        engine.finish_loading_blocking();
        engine.update();

        engine.start_playing().unwrap();
        let events = pump_until(&mut engine, |_, events| {
            events.iter().any(|e| matches!(e, PlaybackEvent::ReachedEnd { .. }))
        });
        assert!(events.contains(&PlaybackEvent::ReachedEnd { tick: 30 }));
        engine.stop();

        assert_eq!(unit.played_ticks(), (0..=30).collect::<Vec<_>>());
        // On at 0, off at 10, on at 25
        assert_eq!(unit.activations(), vec![true, false, true]);
        assert_eq!(engine.current_tick(), 30);
    }

    #[test]
    fn test_pause_and_resume() {
        let (mut engine, unit) = engine_with_cube(fast_config());
        engine
            .load_streams(vec![buffer("take", &cube_stream(30, 10_000))])
            .unwrap();
        engine.finish_loading_blocking();

        assert!(!engine.toggle_pause());
        assert_eq!(engine.state(), PlaybackState::Playing);

        assert!(engine.toggle_pause());
        assert_eq!(engine.state(), PlaybackState::Paused);
        // Let any in-flight iteration finish before sampling
        std::thread::sleep(Duration::from_millis(20));
        let frozen = unit.played_ticks().len();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(unit.played_ticks().len(), frozen);

        assert!(!engine.toggle_pause());
        pump_until(&mut engine, |_, _| unit.played_ticks().len() > frozen);
        engine.stop();
    }

    #[test]
    fn test_scrub_applies_latest_status() {
        let (mut engine, unit) = engine_with_cube(fast_config());
        engine
            .load_streams(vec![buffer("take", &cube_stream(1, 90))])
            .unwrap();
        engine.finish_loading_blocking();
        engine.start_playing().unwrap();

        assert_eq!(engine.scrub_to(15), Some(15));
        pump_until(&mut engine, |engine, _| engine.current_tick() == 15);
        engine.stop();

        // Jumping into the "off" span between 10 and 25
        assert_eq!(unit.activations().last(), Some(&false));
        let applied = unit.applied_frames();
        let (tick, payload) = applied.last().unwrap();
        assert_eq!(*tick, 15);
        assert_eq!(payload.as_transform().unwrap().position.x(), 10.0);
    }

    #[test]
    fn test_scrub_clamped_and_ignored_when_stopped() {
        let (mut engine, _) = engine_with_cube(fast_config());
        assert_eq!(engine.scrub_to(5), None);

        engine
            .load_streams(vec![buffer("take", &cube_stream(1, 90))])
            .unwrap();
        engine.finish_loading_blocking();
        engine.start_playing().unwrap();
        assert_eq!(engine.scrub_to(500), Some(90));
        engine.stop();
    }

    #[test]
    fn test_set_active_stream_clamps() {
        let (mut engine, unit) = engine_with_cube(fast_config());
        assert!(matches!(
            engine.set_active_stream(0),
            Err(ReplayError::NoStreamsLoaded)
        ));

        engine
            .load_streams(vec![
                buffer("a", &cube_stream(30, 90)),
                buffer("b", &RecordingStream::new(60, 10, Vec::new())),
            ])
            .unwrap();
        engine.finish_loading_blocking();
        engine.update();

        assert_eq!(engine.set_active_stream(7).unwrap(), 1);
        assert_eq!(engine.active_stream(), Some(1));
        assert!(!unit.has_record());
        assert_eq!(
            engine.update(),
            vec![PlaybackEvent::ActiveStreamChanged {
                index: 1,
                frame_rate: 60,
                frame_count: 10,
            }]
        );
    }

    #[test]
    fn test_reload_refused_while_loading() {
        let (mut engine, _) = engine_with_cube(fast_config());
        let big: Vec<NamedBuffer> = (0..50)
            .map(|i| buffer(&format!("take_{i}"), &cube_stream(30, 90)))
            .collect();
        engine.load_streams(big).unwrap();

        if engine.is_loading() {
            assert!(matches!(
                engine.load_streams(Vec::new()),
                Err(ReplayError::LoadInProgress)
            ));
            assert!(matches!(engine.start_playing(), Err(ReplayError::LoadInProgress)));
        }
        engine.finish_loading_blocking();
        assert_eq!(engine.stream_count(), 50);
    }

    #[test]
    fn test_empty_batch_clears_streams() {
        let (mut engine, unit) = engine_with_cube(fast_config());
        engine
            .load_streams(vec![buffer("take", &cube_stream(30, 90))])
            .unwrap();
        engine.finish_loading_blocking();

        engine.load_streams(Vec::new()).unwrap();
        engine.finish_loading_blocking();
        assert_eq!(engine.stream_count(), 0);
        assert!(engine.binders().is_empty());
        assert_eq!(engine.active_stream(), None);
        assert_eq!(unit.record_swaps(), 1);
    }

    #[test]
    fn test_negative_rate_clamped() {
        let (mut engine, _) = engine_with_cube(fast_config());
        engine.set_playback_rate(-2.0);
        assert_eq!(engine.playback_rate(), 0.0);
        engine.set_playback_rate(1.5);
        assert_eq!(engine.playback_rate(), 1.5);
    }

    #[test]
    fn test_play_messages_surface_as_events() {
        let (mut engine, unit) = engine_with_cube(fast_config());
        unit.script_message(0, "no live transform");
        engine
            .load_streams(vec![buffer("take", &cube_stream(30, 90))])
            .unwrap();
        engine.finish_loading_blocking();
        engine.update();

        engine.start_playing().unwrap();
        let events = engine.update();
        engine.stop();

        assert!(events.contains(&PlaybackEvent::PlayMessages {
            key: EntityKey::new("Cube", "transform"),
            messages: vec!["no live transform".to_string()],
        }));
    }
}
