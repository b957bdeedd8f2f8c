//! Tick clock driven by wall-time deltas.
//!
//! The clock owns no thread and reads no time source; the timing thread feeds
//! it deltas and dispatches whatever ticks it returns.

use crate::core::Tick;

/// Default debounce window for scrub requests, in seconds
pub const DEFAULT_SCRUB_WAIT: f64 = 0.2;

/// One tick to dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickStep {
    pub tick: Tick,
    /// The tick does not follow the previously dispatched one; status must be
    /// derived from the full history
    pub discontinuity: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingScrub {
    target: Tick,
    remaining: f64,
}

#[derive(Debug, Clone)]
pub struct PlaybackClock {
    current_tick: Tick,
    accumulator: f64,
    frame_rate: u32,
    tick_interval: f64,
    rate: f64,
    end_tick: Tick,
    looping: bool,
    paused: bool,
    scrub_wait: f64,
    scrub: Option<PendingScrub>,
    discontinuity: bool,
    at_end: bool,
    end_reported: bool,
}

impl PlaybackClock {
    pub fn new(frame_rate: u32, end_tick: Tick) -> Self {
        let frame_rate = frame_rate.max(1);
        Self {
            current_tick: 0,
            accumulator: 0.0,
            frame_rate,
            tick_interval: 1.0 / frame_rate as f64,
            rate: 1.0,
            end_tick,
            looping: false,
            paused: false,
            scrub_wait: DEFAULT_SCRUB_WAIT,
            scrub: None,
            discontinuity: false,
            at_end: false,
            end_reported: false,
        }
    }

    pub fn with_scrub_wait(mut self, secs: f64) -> Self {
        self.scrub_wait = secs.max(0.0);
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Position of the current tick in seconds
    pub fn current_time(&self) -> f64 {
        self.current_tick as f64 / self.frame_rate as f64
    }

    pub fn tick_interval(&self) -> f64 {
        self.tick_interval
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn scrub_pending(&self) -> bool {
        self.scrub.is_some()
    }

    pub fn at_end(&self) -> bool {
        self.at_end
    }

    /// Place the clock on `tick` without dispatching it
    pub fn set_current_tick(&mut self, tick: Tick) {
        self.current_tick = tick;
        self.accumulator = 0.0;
        self.at_end = false;
        self.end_reported = false;
    }

    /// Takes effect on the next advance
    pub fn set_frame_rate(&mut self, frame_rate: u32) {
        if frame_rate == 0 || frame_rate == self.frame_rate {
            return;
        }
        self.frame_rate = frame_rate;
        self.tick_interval = 1.0 / frame_rate as f64;
    }

    pub fn set_end_tick(&mut self, end_tick: Tick) {
        self.end_tick = end_tick;
        if self.current_tick < end_tick {
            self.at_end = false;
            self.end_reported = false;
        }
    }

    /// Playback speed multiplier, never negative
    pub fn set_rate(&mut self, rate: f64) {
        self.rate = if rate >= 0.0 { rate } else { 0.0 };
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Paused clocks neither accumulate time nor count down scrubs
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Mark the next dispatched tick as a discontinuity
    pub fn resync(&mut self) {
        self.discontinuity = true;
    }

    /// Arm (or re-arm) the scrub countdown toward `target`, clamped to the end
    /// tick. Later requests inside the window replace the target and restart
    /// the countdown. Returns the clamped target.
    pub fn request_scrub(&mut self, target: Tick) -> Tick {
        let target = target.min(self.end_tick);
        self.scrub = Some(PendingScrub {
            target,
            remaining: self.scrub_wait,
        });
        target
    }

    /// True once after the clock first holds at the end tick
    pub fn take_end_reached(&mut self) -> bool {
        if self.at_end && !self.end_reported {
            self.end_reported = true;
            return true;
        }
        false
    }

    /// Feed `delta` seconds of wall time and return the ticks to dispatch, in
    /// order. Each tick is returned once; none are skipped.
    pub fn advance(&mut self, delta: f64) -> Vec<TickStep> {
        let mut steps = Vec::new();
        if self.paused || !(delta >= 0.0) {
            return steps;
        }

        if let Some(scrub) = self.scrub.as_mut() {
            scrub.remaining -= delta;
            if scrub.remaining <= 0.0 {
                let target = scrub.target;
                self.scrub = None;
                self.accumulator = 0.0;
                self.jump(target, &mut steps);
                return steps;
            }
        }

        self.accumulator += delta * self.rate;
        while self.accumulator >= self.tick_interval {
            self.accumulator -= self.tick_interval;

            if self.current_tick >= self.end_tick {
                if self.looping {
                    self.jump(0, &mut steps);
                    continue;
                }
                self.at_end = true;
                self.accumulator = 0.0;
                break;
            }

            self.current_tick += 1;
            steps.push(TickStep {
                tick: self.current_tick,
                discontinuity: std::mem::take(&mut self.discontinuity),
            });
        }

        steps
    }

    /// Leaves the accumulator alone so a loop wrap keeps the time left in the delta
    fn jump(&mut self, target: Tick, steps: &mut Vec<TickStep>) {
        self.current_tick = target;
        self.discontinuity = false;
        self.at_end = false;
        self.end_reported = false;
        steps.push(TickStep {
            tick: target,
            discontinuity: true,
        });
    }
}
