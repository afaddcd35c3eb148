//! Which video the keys act on.
//!
//! The active video only changes when it stops being valid, disappears from
//! the page, or the user picks another one through an affordance. Re-scans
//! that still see it leave it alone, whatever else turned up.

use log::info;

use crate::dom::{Document, NodeId};
use crate::scanner::{valid, VideoCandidate};
use crate::site::SiteRule;
use crate::timers::Millis;

/// Automatic rate changes are suppressed this long after a manual one.
pub const MANUAL_GUARD_MS: Millis = 5000;
/// Longest wait for a pending source before giving up on it.
pub const READY_WAIT_MS: Millis = 3000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Searching,
    Selected,
}

/// On-screen button letting the user pick a candidate by hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Affordance {
    pub video: NodeId,
    pub active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The previous selection is still valid and present.
    Kept(NodeId),
    /// A new active video.
    Selected(NodeId),
    /// Nothing valid yet; waiting for this element's source to load.
    Deferred(NodeId),
    /// The previous selection is gone and nothing replaces it.
    Cleared,
    NotFound,
}

#[derive(Clone, Debug)]
pub struct Selection {
    phase: Phase,
    active: Option<NodeId>,
    affordances: Vec<Affordance>,
    last_manual_adjustment_at: Option<Millis>,
    deferred: Option<NodeId>,
}

impl Default for Selection {
    fn default() -> Self {
        Selection {
            phase: Phase::Empty,
            active: None,
            affordances: Vec::new(),
            last_manual_adjustment_at: None,
            deferred: None,
        }
    }
}

impl Selection {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn active(&self) -> Option<NodeId> {
        self.active
    }

    pub fn affordances(&self) -> &[Affordance] {
        &self.affordances
    }

    pub fn deferred(&self) -> Option<NodeId> {
        self.deferred
    }

    pub fn begin_search(&mut self) {
        if self.phase == Phase::Empty {
            self.phase = Phase::Searching;
        }
    }

    /// Re-evaluate against a fresh scan.
    pub fn select(
        &mut self,
        doc: &Document,
        candidates: &[VideoCandidate],
        rule: &SiteRule,
    ) -> SelectOutcome {
        let valid = valid(candidates);
        let ruled = if valid.len() > 1 {
            rule.pick(doc, &valid)
        } else {
            None
        };

        if let Some(active) = self.active {
            if valid.iter().any(|c| c.node == active) {
                self.sync_affordances(&valid, ruled);
                return SelectOutcome::Kept(active);
            }
        }

        if !valid.is_empty() {
            let pick = ruled
                .or_else(|| valid.iter().find(|c| !c.paused).map(|c| c.node))
                .unwrap_or(valid[0].node);
            info!(
                "selection: {} ({} valid of {})",
                doc.label(pick),
                valid.len(),
                candidates.len()
            );
            self.active = Some(pick);
            self.phase = Phase::Selected;
            self.deferred = None;
            self.sync_affordances(&valid, ruled);
            return SelectOutcome::Selected(pick);
        }

        if let Some(pending) = candidates.iter().find(|c| c.source_pending) {
            self.deferred = Some(pending.node);
            return SelectOutcome::Deferred(pending.node);
        }

        self.affordances.clear();
        if self.active.take().is_some() {
            info!("selection: cleared");
            self.phase = Phase::Empty;
            SelectOutcome::Cleared
        } else {
            SelectOutcome::NotFound
        }
    }

    /// Affordances only appear for several valid candidates that the site
    /// rule could not narrow down.
    fn sync_affordances(&mut self, valid: &[VideoCandidate], ruled: Option<NodeId>) {
        self.affordances.clear();
        if valid.len() < 2 || ruled.is_some() {
            return;
        }
        self.affordances
            .extend(valid.iter().map(|c| Affordance {
                video: c.node,
                active: Some(c.node) == self.active,
            }));
    }

    /// User clicked the affordance for `video`.
    pub fn override_with(&mut self, video: NodeId) -> bool {
        if !self.affordances.iter().any(|a| a.video == video) {
            return false;
        }
        for a in &mut self.affordances {
            a.active = a.video == video;
        }
        self.active = Some(video);
        self.phase = Phase::Selected;
        self.deferred = None;
        true
    }

    /// Drop every reference to nodes that left the page. Returns true if the
    /// active video was among them.
    pub fn forget(&mut self, removed: &[NodeId]) -> bool {
        self.affordances.retain(|a| !removed.contains(&a.video));
        if self.deferred.is_some_and(|d| removed.contains(&d)) {
            self.deferred = None;
        }
        if self.active.is_some_and(|a| removed.contains(&a)) {
            self.active = None;
            self.phase = Phase::Empty;
            return true;
        }
        false
    }

    /// The deferred element reported ready. Returns true if we were waiting
    /// on it.
    pub fn ready(&mut self, video: NodeId) -> bool {
        if self.deferred == Some(video) {
            self.deferred = None;
            true
        } else {
            false
        }
    }

    pub fn abandon_wait(&mut self) -> Option<NodeId> {
        self.deferred.take()
    }

    pub fn note_manual_rate(&mut self, now: Millis) {
        self.last_manual_adjustment_at = Some(now);
    }

    pub fn may_apply_default_rate(&self, now: Millis) -> bool {
        self.last_manual_adjustment_at
            .map_or(true, |t| now.saturating_sub(t) >= MANUAL_GUARD_MS)
    }

    /// Session teardown. The manual-adjustment guard survives it.
    pub fn reset(&mut self) {
        let guard = self.last_manual_adjustment_at;
        *self = Selection::default();
        self.last_manual_adjustment_at = guard;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MediaState, ReadyState};
    use crate::scanner::{scan, ScanLimits};
    use crate::site::{SitePredicate, SiteProfile};
    use proptest::prelude::*;

    fn video(doc: &mut Document, media: MediaState) -> NodeId {
        let v = doc.create_element("video");
        doc.observe_media(v, |m| *m = media);
        let body = doc.body();
        doc.append_child(body, v);
        v
    }

    fn playable(paused: bool) -> MediaState {
        MediaState {
            has_source: true,
            ready_state: ReadyState::HaveEnoughData,
            width: 640,
            height: 360,
            paused,
            ..Default::default()
        }
    }

    fn candidates(doc: &Document) -> Vec<VideoCandidate> {
        scan(doc, ScanLimits::default()).candidates
    }

    #[test]
    fn single_valid_candidate_is_selected() {
        let mut doc = Document::new("https://example.com/");
        let v = video(
            &mut doc,
            MediaState {
                ready_state: ReadyState::HaveMetadata,
                ..Default::default()
            },
        );
        let mut sel = Selection::default();
        sel.begin_search();
        assert_eq!(sel.phase(), Phase::Searching);
        assert_eq!(
            sel.select(&doc, &candidates(&doc), &SiteRule::Default),
            SelectOutcome::Selected(v)
        );
        assert_eq!(sel.phase(), Phase::Selected);
        assert!(sel.affordances().is_empty());
    }

    #[test]
    fn prefers_playing_then_first() {
        let mut doc = Document::new("https://example.com/");
        video(&mut doc, playable(true));
        let playing = video(&mut doc, playable(false));
        let mut sel = Selection::default();
        assert_eq!(
            sel.select(&doc, &candidates(&doc), &SiteRule::Default),
            SelectOutcome::Selected(playing)
        );

        let mut doc = Document::new("https://example.com/");
        let first2 = video(&mut doc, playable(true));
        video(&mut doc, playable(true));
        let mut sel = Selection::default();
        assert_eq!(
            sel.select(&doc, &candidates(&doc), &SiteRule::Default),
            SelectOutcome::Selected(first2)
        );
    }

    #[test]
    fn keeps_previous_selection_while_valid() {
        let mut doc = Document::new("https://example.com/");
        let a = video(&mut doc, playable(true));
        let mut sel = Selection::default();
        sel.select(&doc, &candidates(&doc), &SiteRule::Default);

        // A playing newcomer would win a fresh selection, but not this one.
        video(&mut doc, playable(false));
        assert_eq!(
            sel.select(&doc, &candidates(&doc), &SiteRule::Default),
            SelectOutcome::Kept(a)
        );
        assert_eq!(sel.affordances().len(), 2);
        assert_eq!(sel.affordances().iter().filter(|x| x.active).count(), 1);
    }

    #[test]
    fn site_rule_suppresses_affordances() {
        let mut doc = Document::new("https://www.bilibili.com/video/BV1");
        let small = video(
            &mut doc,
            MediaState {
                width: 200,
                ..playable(false)
            },
        );
        let wide = video(
            &mut doc,
            MediaState {
                width: 900,
                ..playable(true)
            },
        );
        let rule = SiteProfile::bilibili().rule;
        let mut sel = Selection::default();
        assert_eq!(
            sel.select(&doc, &candidates(&doc), &rule),
            SelectOutcome::Selected(wide)
        );
        assert!(sel.affordances().is_empty());
        assert_ne!(sel.active(), Some(small));

        let rule = SiteRule::Predicate(SitePredicate::MinWidth(5000));
        let mut sel = Selection::default();
        sel.select(&doc, &candidates(&doc), &rule);
        assert_eq!(sel.affordances().len(), 2);
    }

    #[test]
    fn override_marks_exactly_one_affordance() {
        let mut doc = Document::new("https://example.com/");
        let a = video(&mut doc, playable(true));
        let b = video(&mut doc, playable(true));
        let mut sel = Selection::default();
        sel.select(&doc, &candidates(&doc), &SiteRule::Default);
        assert_eq!(sel.active(), Some(a));

        assert!(sel.override_with(b));
        assert_eq!(sel.active(), Some(b));
        let active: Vec<_> = sel
            .affordances()
            .iter()
            .filter(|x| x.active)
            .map(|x| x.video)
            .collect();
        assert_eq!(active, vec![b]);

        // The override sticks across re-scans.
        assert_eq!(
            sel.select(&doc, &candidates(&doc), &SiteRule::Default),
            SelectOutcome::Kept(b)
        );
        let stray = doc.create_element("video");
        assert!(!sel.override_with(stray));
    }

    #[test]
    fn invalid_candidates_are_never_selected() {
        let mut doc = Document::new("https://example.com/");
        video(&mut doc, MediaState::default());
        let mut sel = Selection::default();
        assert_eq!(
            sel.select(&doc, &candidates(&doc), &SiteRule::Default),
            SelectOutcome::NotFound
        );
        assert_eq!(sel.active(), None);
    }

    #[test]
    fn pending_source_defers() {
        let mut doc = Document::new("https://example.com/");
        let v = video(
            &mut doc,
            MediaState {
                source_pending: true,
                ..Default::default()
            },
        );
        let mut sel = Selection::default();
        assert_eq!(
            sel.select(&doc, &candidates(&doc), &SiteRule::Default),
            SelectOutcome::Deferred(v)
        );
        assert_eq!(sel.deferred(), Some(v));
        assert!(sel.ready(v));
        assert!(!sel.ready(v));
    }

    #[test]
    fn removal_clears_active_and_affordances() {
        let mut doc = Document::new("https://example.com/");
        let a = video(&mut doc, playable(true));
        let b = video(&mut doc, playable(true));
        let mut sel = Selection::default();
        sel.select(&doc, &candidates(&doc), &SiteRule::Default);

        let removed = doc.remove(a);
        assert!(sel.forget(&removed));
        assert_eq!(sel.active(), None);
        assert_eq!(sel.phase(), Phase::Empty);
        assert_eq!(sel.affordances().len(), 1);
        assert!(sel.affordances().iter().all(|x| !x.active));

        assert_eq!(
            sel.select(&doc, &candidates(&doc), &SiteRule::Default),
            SelectOutcome::Selected(b)
        );
    }

    #[test]
    fn losing_every_candidate_clears() {
        let mut doc = Document::new("https://example.com/");
        let a = video(&mut doc, playable(true));
        let mut sel = Selection::default();
        sel.select(&doc, &candidates(&doc), &SiteRule::Default);
        doc.observe_media(a, |m| *m = MediaState::default());
        assert_eq!(
            sel.select(&doc, &candidates(&doc), &SiteRule::Default),
            SelectOutcome::Cleared
        );
        assert_eq!(sel.phase(), Phase::Empty);
    }

    #[test]
    fn manual_guard_window() {
        let mut sel = Selection::default();
        assert!(sel.may_apply_default_rate(0));
        sel.note_manual_rate(10_000);
        assert!(!sel.may_apply_default_rate(10_000));
        assert!(!sel.may_apply_default_rate(14_999));
        assert!(sel.may_apply_default_rate(15_000));
        sel.reset();
        assert!(!sel.may_apply_default_rate(12_000));
    }

    proptest! {
        /// Adding, invalidating and removing other videos never moves the
        /// selection while the active one stays valid.
        #[test]
        fn stable_while_active_stays_valid(ops in prop::collection::vec((0u8..3, any::<bool>()), 1..30)) {
            let mut doc = Document::new("https://example.com/");
            let active = video(&mut doc, playable(true));
            let mut others = Vec::new();
            let mut sel = Selection::default();
            sel.select(&doc, &candidates(&doc), &SiteRule::Default);
            for (op, flag) in ops {
                match op {
                    0 => others.push(video(&mut doc, playable(flag))),
                    1 => {
                        if let Some(v) = others.pop() {
                            let removed = doc.remove(v);
                            sel.forget(&removed);
                        }
                    }
                    _ => {
                        if let Some(v) = others.last() {
                            doc.observe_media(*v, |m| m.paused = !flag);
                        }
                    }
                }
                prop_assert_eq!(
                    sel.select(&doc, &candidates(&doc), &SiteRule::Default),
                    SelectOutcome::Kept(active)
                );
                prop_assert!(sel.affordances().iter().filter(|a| a.active).count() <= 1);
            }
        }
    }
}
