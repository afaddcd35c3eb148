//! Change watcher: page mutations, same-document navigation and the
//! discovery/fallback cycle.
//!
//! The watcher never scans by itself. Each entry point reports whether the
//! caller should scan now, and the caller reports back with [`scanned`].
//! Removals are not debounced; the controller forgets removed nodes before
//! the watcher ever sees the batch.
//!
//! [`scanned`]: ChangeWatcher::scanned

use log::{debug, info};

use crate::dom::{MutationRecord, NodeId};
use crate::error::Error;
use crate::timers::{Millis, TimerKind, Timers};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchConfig {
    /// Collapse window for re-scans after video-bearing insertions.
    pub rescan_debounce_ms: Millis,
    /// Wait after navigation before discovery restarts.
    pub restart_delay_ms: Millis,
    pub discovery_timeout_ms: Millis,
    /// Mutation batches a single discovery attempt may consume.
    pub max_attempts: u32,
    pub retry_delay_ms: Millis,
    pub max_retries: u32,
    pub fallback_poll_ms: Millis,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            rescan_debounce_ms: 500,
            restart_delay_ms: 1000,
            discovery_timeout_ms: 10_000,
            max_attempts: 10,
            retry_delay_ms: 2000,
            max_retries: 3,
            fallback_poll_ms: 5000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Discovery {
    Idle,
    /// Navigated; waiting for the new view to materialize.
    Restarting,
    Searching { attempts: u32, retries: u32 },
    /// An active video exists; mutations drive debounced re-scans.
    Watching,
    /// Discovery gave up; a slow poll keeps looking.
    Fallback,
}

/// What one mutation batch means to us.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Changes {
    pub removed: Vec<NodeId>,
    pub video_added: bool,
    pub any: bool,
}

/// Fold a batch of records. `is_video_subtree` answers whether an added node
/// is or contains a `<video>`.
pub fn summarize(
    records: &[MutationRecord],
    is_video_subtree: impl Fn(NodeId) -> bool,
) -> Changes {
    let mut changes = Changes {
        any: !records.is_empty(),
        ..Default::default()
    };
    for r in records {
        match r {
            MutationRecord::Added { node } => {
                changes.video_added |= is_video_subtree(*node);
            }
            MutationRecord::Removed { nodes, .. } => {
                changes.removed.extend_from_slice(nodes);
            }
        }
    }
    changes
}

const DISCOVERY_TIMERS: [TimerKind; 5] = [
    TimerKind::Rescan,
    TimerKind::Restart,
    TimerKind::DiscoveryTimeout,
    TimerKind::DiscoveryRetry,
    TimerKind::FallbackPoll,
];

#[derive(Clone, Debug)]
pub struct ChangeWatcher {
    config: WatchConfig,
    state: Discovery,
}

impl Default for ChangeWatcher {
    fn default() -> Self {
        ChangeWatcher::new(WatchConfig::default())
    }
}

impl ChangeWatcher {
    pub fn new(config: WatchConfig) -> Self {
        ChangeWatcher {
            config,
            state: Discovery::Idle,
        }
    }

    pub fn state(&self) -> Discovery {
        self.state
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Begin discovery. Always asks for an immediate scan.
    pub fn start(&mut self, now: Millis, timers: &mut Timers) -> bool {
        self.cancel_all(timers);
        self.search(now, 0, timers);
        true
    }

    fn search(&mut self, now: Millis, retries: u32, timers: &mut Timers) {
        self.state = Discovery::Searching {
            attempts: 0,
            retries,
        };
        timers.arm(
            TimerKind::DiscoveryTimeout,
            now + self.config.discovery_timeout_ms,
        );
    }

    pub fn on_mutations(&mut self, now: Millis, changes: &Changes, timers: &mut Timers) -> bool {
        match &mut self.state {
            Discovery::Searching { attempts, .. } if changes.any => {
                // Waiting out a retry delay: the retry timer owns the next scan.
                if !timers.is_armed(TimerKind::DiscoveryTimeout) {
                    return false;
                }
                *attempts += 1;
                true
            }
            Discovery::Watching | Discovery::Fallback if changes.video_added => {
                timers.arm(TimerKind::Rescan, now + self.config.rescan_debounce_ms);
                false
            }
            _ => false,
        }
    }

    /// Same-document URL change. Tears down every discovery timer and
    /// schedules the restart.
    pub fn navigated(&mut self, now: Millis, timers: &mut Timers) {
        self.cancel_all(timers);
        self.state = Discovery::Restarting;
        timers.arm(TimerKind::Restart, now + self.config.restart_delay_ms);
    }

    /// The active video was lost. Look again from scratch once the removal
    /// burst settles.
    pub fn lost(&mut self, now: Millis, timers: &mut Timers) {
        if matches!(self.state, Discovery::Idle | Discovery::Restarting) {
            return;
        }
        self.cancel_all(timers);
        self.search(now, 0, timers);
        timers.arm(TimerKind::Rescan, now + self.config.rescan_debounce_ms);
    }

    /// A watcher-owned timer fired. Returns true if the caller should scan.
    pub fn on_timer(&mut self, kind: TimerKind, now: Millis, timers: &mut Timers) -> bool {
        match (kind, self.state) {
            (TimerKind::Restart, Discovery::Restarting) => self.start(now, timers),
            (TimerKind::Rescan, Discovery::Idle | Discovery::Restarting) => false,
            (TimerKind::Rescan, _) => true,
            (TimerKind::DiscoveryTimeout, Discovery::Searching { .. }) => {
                self.failed(Error::Timeout, now, timers);
                false
            }
            (TimerKind::DiscoveryRetry, Discovery::Searching { retries, .. }) => {
                self.search(now, retries, timers);
                true
            }
            (TimerKind::FallbackPoll, Discovery::Fallback) => {
                timers.arm(TimerKind::FallbackPoll, now + self.config.fallback_poll_ms);
                true
            }
            (kind, state) => {
                debug!("watcher: stale {:?} timer in {:?}", kind, state);
                false
            }
        }
    }

    /// Report the outcome of a scan the watcher asked for.
    pub fn scanned(&mut self, found: bool, now: Millis, timers: &mut Timers) {
        if found {
            if self.state != Discovery::Watching {
                debug!("watcher: {:?} -> Watching", self.state);
                // A rescan armed while searching has nothing left to find.
                timers.cancel(TimerKind::Rescan);
            }
            timers.cancel(TimerKind::DiscoveryTimeout);
            timers.cancel(TimerKind::DiscoveryRetry);
            timers.cancel(TimerKind::FallbackPoll);
            self.state = Discovery::Watching;
            return;
        }
        match self.state {
            Discovery::Searching { attempts, .. } if attempts >= self.config.max_attempts => {
                self.failed(Error::NoVideoFound, now, timers);
            }
            Discovery::Watching => self.lost(now, timers),
            _ => {}
        }
    }

    fn failed(&mut self, err: Error, now: Millis, timers: &mut Timers) {
        let Discovery::Searching { retries, .. } = self.state else {
            return;
        };
        timers.cancel(TimerKind::DiscoveryTimeout);
        if retries < self.config.max_retries {
            info!(
                "watcher: {} (retry {}/{})",
                err,
                retries + 1,
                self.config.max_retries
            );
            self.state = Discovery::Searching {
                attempts: 0,
                retries: retries + 1,
            };
            timers.arm(TimerKind::DiscoveryRetry, now + self.config.retry_delay_ms);
        } else {
            info!("watcher: {}; polling every {} ms", err, self.config.fallback_poll_ms);
            self.state = Discovery::Fallback;
            timers.arm(TimerKind::FallbackPoll, now + self.config.fallback_poll_ms);
        }
    }

    fn cancel_all(&self, timers: &mut Timers) {
        for kind in DISCOVERY_TIMERS {
            timers.cancel(kind);
        }
    }

    pub fn teardown(&mut self, timers: &mut Timers) {
        self.cancel_all(timers);
        self.state = Discovery::Idle;
    }
}
