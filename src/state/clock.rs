//! Round countdown and the time sources the session reads instants from.
//!
//! The countdown itself never looks at the wall clock: a driver delivers one
//! [`RoundClock::tick`] per second, tagged with the generation it was
//! scheduled for. Starting or cancelling the clock bumps the generation, so a
//! tick that was already queued when the countdown got cancelled is reported
//! as [`ClockSignal::Stale`] and can never produce an event.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

/// Identifier of one countdown run.
pub type ClockGeneration = u64;

/// Outcome of delivering a tick to the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSignal {
    /// One second elapsed; `remaining` seconds are left.
    Tick { remaining: u32 },
    /// The countdown reached zero. Delivered exactly once per run.
    Expired,
    /// The tick belongs to a cancelled or superseded run.
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    generation: ClockGeneration,
    remaining: u32,
}

/// Cancelable once-per-second countdown for the question in play.
#[derive(Debug, Clone, Default)]
pub struct RoundClock {
    generation: ClockGeneration,
    running: Option<Countdown>,
}

impl RoundClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a countdown of `seconds`, cancelling any run in progress.
    pub fn start(&mut self, seconds: u32) -> ClockGeneration {
        self.generation += 1;
        self.running = Some(Countdown {
            generation: self.generation,
            remaining: seconds,
        });
        self.generation
    }

    /// Stop the current run. Returns whether a run was active.
    pub fn cancel(&mut self) -> bool {
        if self.running.take().is_some() {
            self.generation += 1;
            true
        } else {
            false
        }
    }

    /// Deliver a one-second tick scheduled for `generation`.
    pub fn tick(&mut self, generation: ClockGeneration) -> ClockSignal {
        let Some(countdown) = self.running.as_mut() else {
            return ClockSignal::Stale;
        };
        if countdown.generation != generation {
            return ClockSignal::Stale;
        }

        countdown.remaining = countdown.remaining.saturating_sub(1);
        if countdown.remaining == 0 {
            self.running = None;
            self.generation += 1;
            ClockSignal::Expired
        } else {
            ClockSignal::Tick {
                remaining: countdown.remaining,
            }
        }
    }

    /// Generation of the active run, if any.
    pub fn active_generation(&self) -> Option<ClockGeneration> {
        self.running.map(|countdown| countdown.generation)
    }

    /// Seconds left in the active run.
    pub fn remaining(&self) -> Option<u32> {
        self.running.map(|countdown| countdown.remaining)
    }
}

/// Source of "now" for commit timestamps and round starts.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven time source for replays and tests.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    base: Instant,
    offset_ms: Arc<AtomicU64>,
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward. Clones share the same timeline.
    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}
