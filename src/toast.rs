//! Transient on-screen messages.

use std::collections::VecDeque;

use crate::timers::Millis;

/// How long a toast stays fully opaque.
pub const VISIBLE_MS: Millis = 2000;
/// Fade-out after the visible period.
pub const FADE_MS: Millis = 500;
/// Shown messages kept for `history`; older ones are dropped.
pub const HISTORY_LEN: usize = 64;

/// Fire-and-forget user notification.
pub trait Notifier {
    fn notify(&mut self, text: &str);
}

#[derive(Clone, Debug, PartialEq)]
pub struct Toast {
    pub text: String,
    pub shown_at: Millis,
}

impl Toast {
    /// Opacity at `now`, or `None` once fully faded.
    pub fn alpha(&self, now: Millis) -> Option<f32> {
        let age = now.saturating_sub(self.shown_at);
        if age < VISIBLE_MS {
            Some(1.0)
        } else if age < VISIBLE_MS + FADE_MS {
            Some(1.0 - (age - VISIBLE_MS) as f32 / FADE_MS as f32)
        } else {
            None
        }
    }
}

/// Toasts waiting to be drawn, plus the most recent messages shown.
#[derive(Clone, Debug, Default)]
pub struct ToastQueue {
    now: Millis,
    live: VecDeque<Toast>,
    history: VecDeque<String>,
}

impl ToastQueue {
    /// Moves the queue's clock forward and drops faded toasts.
    pub fn advance(&mut self, now: Millis) {
        self.now = self.now.max(now);
        let now = self.now;
        self.live.retain(|t| t.alpha(now).is_some());
    }

    /// Live toasts, oldest first, with their current opacity.
    pub fn visible(&self) -> impl Iterator<Item = (&str, f32)> {
        self.live
            .iter()
            .filter_map(move |t| t.alpha(self.now).map(|a| (t.text.as_str(), a)))
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.history.back().map(String::as_str)
    }

    pub fn take_history(&mut self) -> Vec<String> {
        std::mem::take(&mut self.history).into()
    }
}

impl Notifier for ToastQueue {
    fn notify(&mut self, text: &str) {
        self.live.push_back(Toast {
            text: text.to_string(),
            shown_at: self.now,
        });
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(text.to_string());
    }
}

/// `2.5x`, `1x`, `0.75x`.
pub fn rate_label(rate: f64) -> String {
    let s = format!("{:.2}", rate);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    format!("{}x", s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(rate_label(2.5), "2.5x");
        assert_eq!(rate_label(1.0), "1x");
        assert_eq!(rate_label(0.75), "0.75x");
        assert_eq!(rate_label(16.0), "16x");
    }

    #[test]
    fn toasts_fade_out() {
        let mut q = ToastQueue::default();
        q.advance(1000);
        q.notify("Volume: 50%");
        assert_eq!(q.visible().collect::<Vec<_>>(), vec![("Volume: 50%", 1.0)]);

        q.advance(1000 + VISIBLE_MS + FADE_MS / 2);
        let (_, alpha) = q.visible().next().unwrap();
        assert!((alpha - 0.5).abs() < 1e-3);

        q.advance(1000 + VISIBLE_MS + FADE_MS);
        assert_eq!(q.visible().count(), 0);
        assert_eq!(q.history().collect::<Vec<_>>(), vec!["Volume: 50%"]);
    }

    #[test]
    fn history_keeps_only_recent_messages() {
        let mut q = ToastQueue::default();
        for i in 0..HISTORY_LEN + 10 {
            q.notify(&format!("Volume: {}%", i));
        }
        assert_eq!(q.history().count(), HISTORY_LEN);
        assert_eq!(q.history().next(), Some("Volume: 10%"));
        let last = format!("Volume: {}%", HISTORY_LEN + 9);
        assert_eq!(q.last(), Some(last.as_str()));
        assert_eq!(q.take_history().len(), HISTORY_LEN);
        assert_eq!(q.last(), None);
    }

    #[test]
    fn clock_never_runs_backwards() {
        let mut q = ToastQueue::default();
        q.advance(5000);
        q.advance(10);
        q.notify("x");
        q.advance(5000 + VISIBLE_MS + FADE_MS);
        assert_eq!(q.visible().count(), 0);
    }
}
