//! # Delayed Release Scheduler
//!
//! "Put this bullet back in 2 seconds." Tracks pending timed releases and
//! fires them as the host advances time.
//!
//! ## Design
//!
//! - Tick-driven. No background timers, no threads. The host calls
//!   [`tick`](DelayedReleaseScheduler::tick) once per step with the frame `dt`.
//! - At most ONE entry per handle. Scheduling again replaces the old entry.
//! - Cancellation is immediate. A cancelled entry never fires.
//! - `tick` removes due entries before handing them back, so running their
//!   actions can freely schedule or cancel other entries.
//! - Time is an `f64` clock summed from the tick deltas. Each entry stores an
//!   absolute deadline, so per-entry countdowns never accumulate `f32`
//!   rounding.

use std::collections::HashMap;
use std::hash::Hash;

use crate::handle::TemplateKey;

/// An entry fires once the clock is within this many seconds of its deadline.
///
/// Absorbs the representation error of `f32` deltas so that `n` ticks of
/// `d/n` land on the same step as one tick of `d`.
pub const FIRE_EPSILON: f64 = 1e-6;

/// One scheduled release.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingRelease<H, A> {
    /// Handle to release.
    pub handle: H,
    /// Pool the handle belongs to.
    pub owner: TemplateKey,
    /// What to run when the release fires.
    pub action: A,
    /// Scheduler clock reading at which the release fires.
    deadline: f64,
    /// Monotonic scheduling order, used to fire same-tick entries in order.
    sequence: u64,
}

impl<H, A> PendingRelease<H, A> {
    /// Scheduler clock reading, in seconds, at which this entry fires.
    #[inline]
    #[must_use]
    pub const fn deadline(&self) -> f64 {
        self.deadline
    }

    /// Order in which this entry was scheduled.
    #[inline]
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Entries ever scheduled.
    pub scheduled: u64,
    /// Entries discarded because the same handle was scheduled again.
    pub replaced: u64,
    /// Entries removed by an explicit cancel.
    pub cancelled: u64,
    /// Entries that fired.
    pub fired: u64,
}

/// Pending-release timers, keyed by handle.
///
/// Generic over the handle `H` and the completion action `A` carried with
/// each entry. The scheduler never runs actions itself; [`tick`] returns the
/// fired entries and the caller runs them.
///
/// [`tick`]: Self::tick
pub struct DelayedReleaseScheduler<H, A = ()> {
    pending: HashMap<H, PendingRelease<H, A>>,
    /// Seconds ticked since creation.
    now: f64,
    next_sequence: u64,
    stats: SchedulerStats,
}

impl<H, A> DelayedReleaseScheduler<H, A>
where
    H: Copy + Eq + Hash,
{
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            now: 0.0,
            next_sequence: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Number of pending entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True if `handle` has a pending entry.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, handle: H) -> bool {
        self.pending.contains_key(&handle)
    }

    /// Seconds ticked since the scheduler was created.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> f64 {
        self.now
    }

    /// Seconds left for `handle`, if pending.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn remaining(&self, handle: H) -> Option<f32> {
        self.pending
            .get(&handle)
            .map(|entry| (entry.deadline - self.now).max(0.0) as f32)
    }

    /// Returns the counters.
    #[must_use]
    pub const fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Schedules `handle` to fire after `delay` seconds.
    ///
    /// Any existing entry for `handle` is discarded first, so there is never
    /// more than one timer per handle. Negative or non-finite delays fire on
    /// the next tick.
    ///
    /// # Returns
    ///
    /// The replaced entry, if there was one. It will not fire.
    pub fn schedule(
        &mut self,
        handle: H,
        owner: TemplateKey,
        delay: f32,
        action: A,
    ) -> Option<PendingRelease<H, A>> {
        let replaced = self.pending.remove(&handle);
        if replaced.is_some() {
            self.stats.replaced += 1;
        }

        let entry = PendingRelease {
            handle,
            owner,
            action,
            deadline: self.now + f64::from(sanitize(delay)),
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.stats.scheduled += 1;
        self.pending.insert(handle, entry);

        replaced
    }

    /// Removes the entry for `handle` without firing it.
    ///
    /// A no-op returning `None` if nothing is pending.
    pub fn cancel(&mut self, handle: H) -> Option<PendingRelease<H, A>> {
        let cancelled = self.pending.remove(&handle);
        if cancelled.is_some() {
            self.stats.cancelled += 1;
        }
        cancelled
    }

    /// Advances the clock by `dt` seconds.
    ///
    /// Negative or non-finite `dt` counts as zero.
    ///
    /// # Returns
    ///
    /// Every entry whose delay elapsed, in scheduling order. They are already
    /// removed; each fires exactly once, through the caller.
    pub fn tick(&mut self, dt: f32) -> Vec<PendingRelease<H, A>> {
        self.now += f64::from(sanitize(dt));

        let due: Vec<H> = self
            .pending
            .iter()
            .filter(|(_, entry)| self.now >= entry.deadline - FIRE_EPSILON)
            .map(|(handle, _)| *handle)
            .collect();

        let mut fired: Vec<PendingRelease<H, A>> = due
            .into_iter()
            .filter_map(|handle| self.pending.remove(&handle))
            .collect();
        fired.sort_unstable_by_key(|entry| entry.sequence);

        self.stats.fired += fired.len() as u64;
        fired
    }

    /// Removes and returns every pending entry without firing any.
    pub fn clear(&mut self) -> Vec<PendingRelease<H, A>> {
        let mut drained: Vec<_> = self.pending.drain().map(|(_, entry)| entry).collect();
        drained.sort_unstable_by_key(|entry| entry.sequence);
        self.stats.cancelled += drained.len() as u64;
        drained
    }
}

impl<H, A> Default for DelayedReleaseScheduler<H, A>
where
    H: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Clamps a time value to a finite, non-negative number of seconds.
#[inline]
fn sanitize(seconds: f32) -> f32 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: TemplateKey = TemplateKey::new(1);

    fn fired_handles(fired: &[PendingRelease<u32, ()>]) -> Vec<u32> {
        fired.iter().map(|entry| entry.handle).collect()
    }

    #[test]
    fn test_fires_after_delay() {
        let mut scheduler: DelayedReleaseScheduler<u32> = DelayedReleaseScheduler::new();
        scheduler.schedule(7, OWNER, 1.0, ());

        assert!(scheduler.tick(0.5).is_empty());
        assert!(scheduler.is_pending(7));

        let fired = scheduler.tick(0.5);
        assert_eq!(fired_handles(&fired), vec![7]);
        assert_eq!(fired[0].owner, OWNER);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_split_ticks_match_single_tick() {
        for delay in [0.3_f32, 1.0, 2.5, 0.1] {
            let mut single: DelayedReleaseScheduler<u32> = DelayedReleaseScheduler::new();
            single.schedule(1, OWNER, delay, ());
            let mut split: DelayedReleaseScheduler<u32> = DelayedReleaseScheduler::new();
            split.schedule(1, OWNER, delay, ());

            let once = single.tick(delay);
            let mut twice = split.tick(delay / 2.0);
            twice.extend(split.tick(delay / 2.0));

            assert_eq!(fired_handles(&once), vec![1], "delay {delay}");
            assert_eq!(fired_handles(&twice), vec![1], "delay {delay}");
        }
    }

    #[test]
    fn test_fixed_step_fires_on_exact_tick() {
        // (delay, dt, ticks until due)
        for (delay, dt, steps) in [
            (2.0_f32, 1.0_f32 / 60.0, 120_u32),
            (1.0, 1.0 / 60.0, 60),
            (0.5, 1.0 / 30.0, 15),
            (1.0, 0.1, 10),
            (10.0, 0.1, 100),
            (0.3, 0.1, 3),
        ] {
            let mut scheduler: DelayedReleaseScheduler<u32> = DelayedReleaseScheduler::new();
            scheduler.schedule(1, OWNER, delay, ());

            for step in 1..steps {
                assert!(
                    scheduler.tick(dt).is_empty(),
                    "delay {delay} dt {dt} fired early at step {step}"
                );
            }
            assert_eq!(
                fired_handles(&scheduler.tick(dt)),
                vec![1],
                "delay {delay} dt {dt} did not fire at step {steps}"
            );
        }
    }

    #[test]
    fn test_deadline_relative_to_schedule_time() {
        let mut scheduler: DelayedReleaseScheduler<u32> = DelayedReleaseScheduler::new();
        for _ in 0..90 {
            scheduler.tick(1.0 / 60.0);
        }
        scheduler.schedule(1, OWNER, 1.0, ());
        assert_eq!(scheduler.remaining(1), Some(1.0));

        for _ in 0..59 {
            assert!(scheduler.tick(1.0 / 60.0).is_empty());
        }
        assert_eq!(scheduler.tick(1.0 / 60.0).len(), 1);
    }

    #[test]
    fn test_reschedule_replaces_entry() {
        let mut scheduler: DelayedReleaseScheduler<u32> = DelayedReleaseScheduler::new();
        assert!(scheduler.schedule(3, OWNER, 1.0, ()).is_none());
        scheduler.tick(0.5);

        let replaced = scheduler.schedule(3, OWNER, 2.0, ()).unwrap();
        assert!((replaced.deadline() - 1.0).abs() < 1e-9);
        assert_eq!(scheduler.remaining(3), Some(2.0));
        assert_eq!(scheduler.len(), 1);

        // The first timer would have fired here
        assert!(scheduler.tick(0.5).is_empty());
        assert!(scheduler.tick(1.0).is_empty());
        assert_eq!(scheduler.tick(0.5).len(), 1);
        assert!(scheduler.tick(10.0).is_empty());
        assert_eq!(scheduler.stats().replaced, 1);
        assert_eq!(scheduler.stats().fired, 1);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let mut scheduler: DelayedReleaseScheduler<u32> = DelayedReleaseScheduler::new();
        scheduler.schedule(4, OWNER, 0.25, ());

        assert!(scheduler.cancel(4).is_some());
        assert!(scheduler.cancel(4).is_none());
        assert!(scheduler.tick(1.0).is_empty());
        assert_eq!(scheduler.stats().cancelled, 1);
    }

    #[test]
    fn test_same_tick_fires_in_schedule_order() {
        let mut scheduler: DelayedReleaseScheduler<u32> = DelayedReleaseScheduler::new();
        for handle in [9, 2, 5, 1] {
            scheduler.schedule(handle, OWNER, 0.1, ());
        }

        assert_eq!(fired_handles(&scheduler.tick(1.0)), vec![9, 2, 5, 1]);
    }

    #[test]
    fn test_bad_time_values_sanitized() {
        let mut scheduler: DelayedReleaseScheduler<u32> = DelayedReleaseScheduler::new();
        scheduler.schedule(1, OWNER, f32::NAN, ());
        scheduler.schedule(2, OWNER, 1.0, ());

        assert_eq!(scheduler.remaining(1), Some(0.0));
        assert!(scheduler.tick(-5.0).len() == 1);
        assert_eq!(scheduler.remaining(2), Some(1.0));
        assert!(scheduler.tick(f32::INFINITY).is_empty());
        assert!(scheduler.is_pending(2));
    }

    #[test]
    fn test_action_payload_returned() {
        let mut scheduler: DelayedReleaseScheduler<u32, &str> = DelayedReleaseScheduler::new();
        scheduler.schedule(1, OWNER, 0.0, "done");

        let fired = scheduler.tick(0.0);
        assert_eq!(fired[0].action, "done");
    }

    #[test]
    fn test_clear_drains_without_firing() {
        let mut scheduler: DelayedReleaseScheduler<u32> = DelayedReleaseScheduler::new();
        scheduler.schedule(1, OWNER, 1.0, ());
        scheduler.schedule(2, OWNER, 1.0, ());

        assert_eq!(fired_handles(&scheduler.clear()), vec![1, 2]);
        assert!(scheduler.tick(5.0).is_empty());
    }
}
