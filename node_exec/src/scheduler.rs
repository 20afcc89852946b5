//! # Frame Scheduler
//!
//! Paces the control cycle against a periodic tick source. The tick source increments a shared
//! tick counter once per period and raises a binary wake event. The scheduler keeps its own frame
//! counter, incremented at the start of each cycle, and at the end of the cycle waits until the
//! tick counter has caught up with it.
//!
//! If a cycle overruns, the tick counter is already ahead when the wait starts and the wait
//! returns at once. The backlog is worked off by the following cycles unless [`FrameScheduler::resync`]
//! snaps the frame counter to the tick counter.
//!
//! Blocking delays inside a cycle go through [`DelayMs`] so they can be recorded in tests;
//! [`StdDelay`] sleeps the calling thread.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread,
    time::{Duration, Instant},
};
use embedded_hal::blocking::delay::DelayMs;
use log::{debug, trace};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Tick counter shared between the tick source and the scheduler.
#[derive(Debug, Clone, Default)]
pub struct TickCounter {
    inner: Arc<(Mutex<TickState>, Condvar)>,
}

#[derive(Debug, Default)]
struct TickState {
    ticks: u64,

    /// Binary wake event, raised by every tick and consumed by one wait
    event: bool,
}

/// A thread which ticks a [`TickCounter`] at a fixed period.
pub struct TickTimer {
    stop: Arc<AtomicBool>,

    handle: Option<thread::JoinHandle<()>>,
}

/// Delay source which sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

/// The cycle pacing state.
#[derive(Debug)]
pub struct FrameScheduler {
    frame: u64,

    ticks: TickCounter,

    state: SchedulerState,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// How a call to [`FrameScheduler::end_cycle_wait`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The cycle finished early and the scheduler waited for the tick
    OnTime,

    /// The tick counter had already reached the frame counter, `backlog` ticks past it
    Overrun { backlog: u64 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TickState> {
        // A panic while holding this lock leaves only a plain counter behind
        match self.inner.0.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Advance the counter by one tick and raise the wake event.
    pub fn tick(&self) {
        let mut state = self.lock();
        state.ticks += 1;
        state.event = true;
        drop(state);

        self.inner.1.notify_one();
    }

    /// The current tick count.
    pub fn ticks(&self) -> u64 {
        self.lock().ticks
    }

    /// Block until `ticks >= target`, consuming wake events as they arrive.
    fn wait_until(&self, target: u64) {
        let mut state = self.lock();

        while state.ticks < target {
            while !state.event {
                state = match self.inner.1.wait(state) {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            state.event = false;
        }
    }
}

impl TickTimer {
    /// Start ticking `counter` every `period`.
    ///
    /// Ticks are scheduled against absolute deadlines so the period does not drift.
    pub fn start(period: Duration, counter: TickCounter) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();

        let handle = thread::spawn(move || {
            let mut deadline = Instant::now() + period;

            while !stop_clone.load(Ordering::Relaxed) {
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }

                counter.tick();
                deadline += period;
            }
        });

        debug!("Tick timer started with period {:?}", period);

        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(jh) = self.handle.take() {
            jh.join().ok();
        }
    }
}

impl DelayMs<u32> for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

impl FrameScheduler {
    pub fn new(ticks: TickCounter) -> Self {
        Self {
            frame: 0,
            ticks,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.ticks()
    }

    /// Start a cycle, advancing the frame counter.
    pub fn begin_cycle(&mut self) {
        if self.state == SchedulerState::Idle {
            self.resync();
            self.state = SchedulerState::Running;
        }

        self.frame += 1;
    }

    /// Wait for the tick counter to reach the frame counter.
    ///
    /// Returns at once, reporting an overrun, if it already has.
    pub fn end_cycle_wait(&mut self) -> WaitOutcome {
        let ticks = self.ticks.ticks();

        if ticks >= self.frame {
            return WaitOutcome::Overrun { backlog: ticks - self.frame };
        }

        self.ticks.wait_until(self.frame);
        trace!("Frame {} reached", self.frame);

        WaitOutcome::OnTime
    }

    /// Snap the frame counter to the tick counter, dropping any backlog.
    pub fn resync(&mut self) {
        self.frame = self.ticks.ticks();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_overrun_returns_immediately() {
        let ticks = TickCounter::new();
        let mut s = FrameScheduler::new(ticks.clone());

        s.begin_cycle();
        assert_eq!(s.frame(), 1);

        // A 25 ms cycle against a 10 ms period
        ticks.tick();
        ticks.tick();

        let start = Instant::now();
        assert_eq!(s.end_cycle_wait(), WaitOutcome::Overrun { backlog: 1 });
        assert!(start.elapsed() < Duration::from_millis(5));

        // Without a resync the next cycle is a catch-up cycle
        s.begin_cycle();
        assert_eq!(s.end_cycle_wait(), WaitOutcome::Overrun { backlog: 0 });
    }

    #[test]
    fn test_resync_drops_backlog() {
        let ticks = TickCounter::new();
        let mut s = FrameScheduler::new(ticks.clone());

        s.begin_cycle();
        for _ in 0..3 {
            ticks.tick();
        }
        s.resync();
        assert_eq!(s.frame(), 3);

        // The next cycle has to wait for a fresh tick
        s.begin_cycle();
        let t = ticks.clone();
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            t.tick();
        });

        let start = Instant::now();
        assert_eq!(s.end_cycle_wait(), WaitOutcome::OnTime);
        assert!(start.elapsed() >= Duration::from_millis(15));
        assert_eq!(s.ticks(), 4);
        h.join().unwrap();
    }

    #[test]
    fn test_first_cycle_starts_from_tick_count() {
        let ticks = TickCounter::new();
        for _ in 0..10 {
            ticks.tick();
        }

        let mut s = FrameScheduler::new(ticks);
        assert_eq!(s.state(), SchedulerState::Idle);
        s.begin_cycle();
        assert_eq!(s.state(), SchedulerState::Running);
        assert_eq!(s.frame(), 11);
    }

    #[test]
    fn test_tick_timer_paces_cycles() {
        let ticks = TickCounter::new();
        let timer = TickTimer::start(Duration::from_millis(5), ticks.clone());
        let mut s = FrameScheduler::new(ticks.clone());

        let start = Instant::now();
        for _ in 0..4 {
            s.begin_cycle();
            s.end_cycle_wait();
        }
        assert!(start.elapsed() >= Duration::from_millis(15));

        drop(timer);
        let after = ticks.ticks();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.ticks(), after);
    }
}
