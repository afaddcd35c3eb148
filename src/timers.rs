//! One-shot timers keyed by purpose.
//!
//! There is never more than one outstanding deadline per [`TimerKind`]:
//! arming a kind replaces its previous deadline. Time is supplied by the
//! caller as milliseconds from an arbitrary epoch, so tests drive the clock
//! directly and hosts feed a monotonic `Instant`.

use std::collections::BTreeMap;

/// Milliseconds on the caller's monotonic clock.
pub type Millis = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    /// Long-press speed ramp.
    Ramp,
    /// Debounced re-scan after video-bearing mutations.
    Rescan,
    /// Discovery restart after a same-document navigation.
    Restart,
    DiscoveryTimeout,
    DiscoveryRetry,
    FallbackPoll,
    /// Bounded wait for a pending source to become ready.
    ReadyWait,
}

#[derive(Clone, Debug, Default)]
pub struct Timers {
    deadlines: BTreeMap<TimerKind, Millis>,
}

impl Timers {
    /// Arm `kind` for `at`. Returns true if a previous deadline was replaced.
    pub fn arm(&mut self, kind: TimerKind, at: Millis) -> bool {
        self.deadlines.insert(kind, at).is_some()
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.deadlines.remove(&kind).is_some()
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Millis> {
        self.deadlines.get(&kind).copied()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return the earliest timer due at `now`. Ties resolve in
    /// `TimerKind` order.
    pub fn next_due(&mut self, now: Millis) -> Option<TimerKind> {
        let (kind, _) = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .min_by_key(|(kind, at)| (**at, **kind))?;
        let kind = *kind;
        self.deadlines.remove(&kind);
        Some(kind)
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearming_replaces() {
        let mut t = Timers::default();
        assert!(!t.arm(TimerKind::Rescan, 500));
        assert!(t.arm(TimerKind::Rescan, 900));
        assert_eq!(t.len(), 1);
        assert_eq!(t.next_due(600), None);
        assert_eq!(t.next_due(900), Some(TimerKind::Rescan));
        assert!(t.is_empty());
    }

    #[test]
    fn pops_in_deadline_order() {
        let mut t = Timers::default();
        t.arm(TimerKind::FallbackPoll, 300);
        t.arm(TimerKind::Ramp, 200);
        t.arm(TimerKind::Rescan, 200);
        assert_eq!(t.next_deadline(), Some(200));
        assert_eq!(t.next_due(1000), Some(TimerKind::Ramp));
        assert_eq!(t.next_due(1000), Some(TimerKind::Rescan));
        assert_eq!(t.next_due(1000), Some(TimerKind::FallbackPoll));
        assert_eq!(t.next_due(1000), None);
    }

    #[test]
    fn cancel_and_clear() {
        let mut t = Timers::default();
        t.arm(TimerKind::Ramp, 10);
        assert!(t.cancel(TimerKind::Ramp));
        assert!(!t.cancel(TimerKind::Ramp));
        t.arm(TimerKind::Restart, 10);
        t.arm(TimerKind::ReadyWait, 10);
        t.clear();
        assert_eq!(t.next_due(u64::MAX), None);
    }
}
