//! Per-page session: owns all controller state and routes events.
//!
//! The host owns the [`Document`] and hands it in with every call. All
//! timing comes in as `now`; due timers always run before the event that
//! carried the newer timestamp, each at its own deadline.

use log::{debug, info};

use crate::commands::{self, Command, CommandEnv, Ran};
use crate::dom::{Document, NodeId};
use crate::error::Result;
use crate::keys::{KeyCode, KeyEvent};
use crate::press::{PressEffect, PressMachine};
use crate::scanner::{scan, ScanLimits};
use crate::selection::{Affordance, SelectOutcome, Selection, READY_WAIT_MS};
use crate::settings::{SettingKey, Settings, SettingsStore};
use crate::site::{AllowList, SiteProfile};
use crate::timers::{Millis, TimerKind, Timers};
use crate::toast::{Notifier, ToastQueue};
use crate::watcher::{summarize, ChangeWatcher, Discovery, WatchConfig};

/// The key whose hold ramps the speed.
pub const HOLD_KEY: KeyCode = KeyCode::ArrowRight;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Start,
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    Blur,
    Hidden,
    /// Drain the document's mutation log.
    Mutations,
    Navigated(String),
    AffordanceClicked(NodeId),
    MediaReady(NodeId),
}

pub struct Controller {
    settings: Settings,
    /// Hold rate for this session; starts at the stored setting.
    target_rate: f64,
    profile: SiteProfile,
    enabled: bool,
    limits: ScanLimits,
    selection: Selection,
    press: PressMachine,
    watcher: ChangeWatcher,
    timers: Timers,
    toasts: ToastQueue,
    url: String,
}

impl Controller {
    pub fn new(doc: &Document, settings: Settings, allow: &AllowList) -> Self {
        Controller::with_config(doc, settings, allow, WatchConfig::default(), ScanLimits::default())
    }

    pub fn with_config(
        doc: &Document,
        settings: Settings,
        allow: &AllowList,
        watch: WatchConfig,
        limits: ScanLimits,
    ) -> Self {
        let profile = SiteProfile::for_origin(doc.origin());
        let enabled = allow.is_enabled_for_origin(doc.origin());
        if !enabled {
            info!("controller: {} is not enabled", doc.origin());
        }
        Controller {
            target_rate: settings.target_rate,
            settings,
            profile,
            enabled,
            limits,
            selection: Selection::default(),
            press: PressMachine::default(),
            watcher: ChangeWatcher::new(watch),
            timers: Timers::default(),
            toasts: ToastQueue::default(),
            url: doc.url().to_string(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn target_rate(&self) -> f64 {
        self.target_rate
    }

    /// The active video, if it is still part of `doc`.
    pub fn active_video(&self, doc: &Document) -> Option<NodeId> {
        self.selection.active().filter(|v| doc.contains(*v))
    }

    pub fn affordances(&self) -> &[Affordance] {
        self.selection.affordances()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn press(&self) -> &PressMachine {
        &self.press
    }

    pub fn discovery(&self) -> Discovery {
        self.watcher.state()
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn toasts(&self) -> &ToastQueue {
        &self.toasts
    }

    pub fn toasts_mut(&mut self) -> &mut ToastQueue {
        &mut self.toasts
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    // ── Events ───────────────────────────────────────────────────────────

    /// Route one event. Returns true when the event was consumed (for keys:
    /// the page should not see it).
    pub fn handle(&mut self, doc: &mut Document, now: Millis, event: Event) -> bool {
        self.tick(doc, now);
        if !self.enabled {
            return false;
        }
        match event {
            Event::Start => {
                self.url = doc.url().to_string();
                self.selection.begin_search();
                if self.watcher.start(now, &mut self.timers) {
                    self.rescan(doc, now);
                }
                false
            }
            Event::KeyDown(key) => self.key_down(doc, now, key),
            Event::KeyUp(key) => self.key_up(doc, now, key),
            Event::Blur | Event::Hidden => {
                let effects = self.press.interrupt();
                self.apply(doc, now, effects);
                false
            }
            Event::Mutations => {
                self.mutations(doc, now);
                false
            }
            Event::Navigated(url) => self.navigated(doc, now, &url),
            Event::AffordanceClicked(video) => {
                let previous = self.active_video(doc);
                if !self.selection.override_with(video) {
                    return false;
                }
                info!("selection: user picked {}", doc.label(video));
                self.activated(doc, now, video, previous);
                true
            }
            Event::MediaReady(video) => {
                if self.selection.ready(video) {
                    self.timers.cancel(TimerKind::ReadyWait);
                    self.rescan(doc, now);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Run every timer due at `now`.
    pub fn tick(&mut self, doc: &mut Document, now: Millis) {
        while let Some(at) = self.timers.next_deadline().filter(|at| *at <= now) {
            let Some(kind) = self.timers.next_due(at) else {
                break;
            };
            self.fire(doc, at, kind);
        }
        self.toasts.advance(now);
    }

    fn fire(&mut self, doc: &mut Document, at: Millis, kind: TimerKind) {
        match kind {
            TimerKind::Ramp => {
                let effects = self.press.ramp_due(self.target_rate);
                self.apply(doc, at, effects);
            }
            TimerKind::ReadyWait => {
                if let Some(v) = self.selection.abandon_wait() {
                    debug!("selection: gave up waiting on {}", doc.label(v));
                }
            }
            _ => {
                if self.watcher.on_timer(kind, at, &mut self.timers) {
                    if self.watcher.state() != Discovery::Restarting {
                        self.selection.begin_search();
                    }
                    self.rescan(doc, at);
                }
            }
        }
    }

    fn key_down(&mut self, doc: &mut Document, now: Millis, key: KeyEvent) -> bool {
        if doc.focus_is_editable() || !self.profile.key_in_scope(doc, key.target) {
            return false;
        }
        let Some(video) = self.active_video(doc) else {
            return false;
        };

        if key.code == HOLD_KEY {
            let rate = doc.media(video).map_or(1.0, |m| m.playback_rate);
            let effects =
                self.press
                    .key_down(now, key.repeat, rate, self.settings.hold_delay());
            self.apply(doc, now, effects);
            return true;
        }

        let Some(cmd) = Command::for_key(key.code) else {
            return false;
        };
        let ran = commands::run(
            cmd,
            CommandEnv {
                doc,
                video,
                settings: &self.settings,
                target_rate: &mut self.target_rate,
                profile: &self.profile,
                notifier: &mut self.toasts,
            },
        );
        if ran == Ran::RateChanged {
            self.selection.note_manual_rate(now);
        }
        ran != Ran::Skipped
    }

    fn key_up(&mut self, doc: &mut Document, now: Millis, key: KeyEvent) -> bool {
        if key.code != HOLD_KEY {
            return false;
        }
        let effects = self.press.key_up(
            now,
            self.settings.hold_delay(),
            self.settings.seek_step,
        );
        let consumed = !effects.is_empty();
        self.apply(doc, now, effects);
        consumed
    }

    fn apply(&mut self, doc: &mut Document, now: Millis, effects: Vec<PressEffect>) {
        let video = self.active_video(doc);
        self.apply_to(doc, now, video, effects);
    }

    /// Run press effects against `video`, which need not be the active one.
    fn apply_to(
        &mut self,
        doc: &mut Document,
        now: Millis,
        video: Option<NodeId>,
        effects: Vec<PressEffect>,
    ) {
        for effect in effects {
            match effect {
                PressEffect::ArmRamp { at } => {
                    self.timers.arm(TimerKind::Ramp, at);
                }
                PressEffect::CancelRamp => {
                    self.timers.cancel(TimerKind::Ramp);
                }
                PressEffect::SetRate(rate) => {
                    if let Some(v) = video {
                        doc.set_playback_rate(v, rate);
                        self.selection.note_manual_rate(now);
                    }
                }
                PressEffect::SeekBy(delta) => {
                    if let Some(v) = video {
                        let t = doc.media(v).map_or(0.0, |m| m.current_time);
                        doc.seek(v, t + delta);
                    }
                }
                PressEffect::Resume => {
                    if let Some(v) = video {
                        if doc.media(v).is_some_and(|m| m.paused) {
                            doc.play(v);
                        }
                    }
                }
                PressEffect::Notify(text) => self.toasts.notify(&text),
            }
        }
    }

    fn mutations(&mut self, doc: &mut Document, now: Millis) {
        let records = doc.take_mutations();
        if records.is_empty() {
            return;
        }
        let changes = summarize(&records, |n| doc.subtree_has_video(n));

        if !changes.removed.is_empty() {
            let had_deferred = self.selection.deferred().is_some();
            if self.selection.forget(&changes.removed) {
                info!("selection: active video removed");
                self.drop_press();
                self.watcher.lost(now, &mut self.timers);
                self.selection.begin_search();
            }
            if had_deferred && self.selection.deferred().is_none() {
                self.timers.cancel(TimerKind::ReadyWait);
            }
        }

        if self.watcher.on_mutations(now, &changes, &mut self.timers) {
            self.rescan(doc, now);
        }
    }

    fn navigated(&mut self, doc: &mut Document, now: Millis, url: &str) -> bool {
        if url == self.url {
            return false;
        }
        info!("controller: navigated to {}", url);
        // Do not leave the old video stuck at the hold rate.
        let effects = self.press.interrupt();
        self.apply(doc, now, effects);
        self.reset_session();
        self.url = url.to_string();
        if doc.url() != url {
            doc.set_url(url);
        }
        self.watcher.navigated(now, &mut self.timers);
        true
    }

    fn rescan(&mut self, doc: &mut Document, now: Millis) {
        let previous = self.active_video(doc);
        let found = scan(doc, self.limits);
        if found.denied_frames > 0 {
            debug!("scan: {} cross-origin frame(s) skipped", found.denied_frames);
        }
        match self
            .selection
            .select(doc, &found.candidates, &self.profile.rule)
        {
            SelectOutcome::Selected(video) => self.activated(doc, now, video, previous),
            SelectOutcome::Deferred(video) => {
                if !self.timers.is_armed(TimerKind::ReadyWait) {
                    debug!("selection: waiting on {}", doc.label(video));
                    self.timers.arm(TimerKind::ReadyWait, now + READY_WAIT_MS);
                }
            }
            SelectOutcome::Cleared => self.release_press(doc, now, previous),
            SelectOutcome::Kept(_) | SelectOutcome::NotFound => {}
        }
        let active = self.selection.active().is_some();
        self.watcher.scanned(active, now, &mut self.timers);
    }

    /// A video just became active, automatically or by user override.
    fn activated(
        &mut self,
        doc: &mut Document,
        now: Millis,
        video: NodeId,
        previous: Option<NodeId>,
    ) {
        self.release_press(doc, now, previous.filter(|p| *p != video));
        self.timers.cancel(TimerKind::ReadyWait);
        if self.selection.may_apply_default_rate(now) {
            doc.set_playback_rate(video, self.settings.default_rate);
        } else {
            debug!("selection: recent manual rate, leaving {}", doc.label(video));
        }
    }

    /// End a press whose video is no longer active. A ramped `previous`
    /// gets its original rate back.
    fn release_press(&mut self, doc: &mut Document, now: Millis, previous: Option<NodeId>) {
        let effects = self.press.interrupt();
        let previous = previous.filter(|p| doc.contains(*p));
        self.apply_to(doc, now, previous, effects);
        self.drop_press();
    }

    fn drop_press(&mut self) {
        self.press.reset();
        self.timers.cancel(TimerKind::Ramp);
    }

    fn reset_session(&mut self) {
        self.press.reset();
        self.selection.reset();
        self.timers.clear();
        self.target_rate = self.settings.target_rate;
    }

    /// Persist a user-entered setting and apply it to this session.
    pub fn update_setting(
        &mut self,
        doc: &mut Document,
        store: &mut dyn SettingsStore,
        key: SettingKey,
        text: &str,
    ) -> Result<f64> {
        let value = self
            .settings
            .parse_and_update(store, &mut self.toasts, key, text)?;
        match key {
            SettingKey::TargetRate => self.target_rate = value,
            SettingKey::DefaultRate => {
                if let Some(v) = self.active_video(doc) {
                    doc.set_playback_rate(v, value);
                }
            }
            _ => {}
        }
        Ok(value)
    }

    /// End of the page session. Clears every timer and all session state.
    pub fn teardown(&mut self, doc: &mut Document, now: Millis) {
        let effects = self.press.interrupt();
        self.apply(doc, now, effects);
        self.reset_session();
        self.watcher.teardown(&mut self.timers);
    }
}

impl Notifier for Controller {
    fn notify(&mut self, text: &str) {
        self.toasts.notify(text);
    }
}
