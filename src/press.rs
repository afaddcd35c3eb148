//! Long-press state machine for the hold-to-speed-up key.
//!
//! A tap shorter than the hold delay seeks forward; holding past it switches
//! to the target rate until release. The machine never touches the page
//! itself: every transition returns the [`PressEffect`]s the controller has
//! to carry out, so it can be driven with literal timestamps in tests.

use crate::timers::Millis;
use crate::toast::rate_label;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PressState {
    Idle,
    /// Key is down, ramp timer armed.
    Pressed { at: Millis, original_rate: f64 },
    /// Key is down and the target rate has been applied.
    Ramped { at: Millis, original_rate: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum PressEffect {
    ArmRamp { at: Millis },
    CancelRamp,
    SetRate(f64),
    SeekBy(f64),
    /// Start playback if the video is paused.
    Resume,
    Notify(String),
}

#[derive(Clone, Debug)]
pub struct PressMachine {
    state: PressState,
    /// Set once a release or interrupt has been processed; cleared only by
    /// the next qualifying key-down.
    handled: bool,
}

impl Default for PressMachine {
    fn default() -> Self {
        PressMachine {
            state: PressState::Idle,
            handled: true,
        }
    }
}

impl PressMachine {
    pub fn state(&self) -> PressState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == PressState::Idle
    }

    /// Rate captured when the current press began.
    pub fn original_rate(&self) -> Option<f64> {
        match self.state {
            PressState::Idle => None,
            PressState::Pressed { original_rate, .. }
            | PressState::Ramped { original_rate, .. } => Some(original_rate),
        }
    }

    /// Only the first down of a press counts. OS auto-repeat and downs that
    /// arrive while a press is already in flight are ignored.
    pub fn key_down(
        &mut self,
        now: Millis,
        repeat: bool,
        current_rate: f64,
        hold_delay: Millis,
    ) -> Vec<PressEffect> {
        if repeat || self.state != PressState::Idle {
            return Vec::new();
        }
        self.state = PressState::Pressed {
            at: now,
            original_rate: current_rate,
        };
        self.handled = false;
        vec![PressEffect::ArmRamp {
            at: now + hold_delay,
        }]
    }

    /// The ramp timer fired.
    pub fn ramp_due(&mut self, target_rate: f64) -> Vec<PressEffect> {
        let PressState::Pressed { at, original_rate } = self.state else {
            return Vec::new();
        };
        self.state = PressState::Ramped { at, original_rate };
        vec![
            PressEffect::SetRate(target_rate),
            PressEffect::Notify(format!("Playing at {}", rate_label(target_rate))),
        ]
    }

    pub fn key_up(&mut self, now: Millis, hold_delay: Millis, seek_step: f64) -> Vec<PressEffect> {
        if self.handled {
            return Vec::new();
        }
        let effects = match self.state {
            PressState::Idle => return Vec::new(),
            PressState::Pressed { at, original_rate } => {
                if now.saturating_sub(at) < hold_delay {
                    vec![
                        PressEffect::CancelRamp,
                        PressEffect::SeekBy(seek_step),
                        PressEffect::Resume,
                    ]
                } else {
                    // Released after the delay but before the timer was
                    // serviced: still a hold.
                    restore(original_rate)
                }
            }
            PressState::Ramped { original_rate, .. } => restore(original_rate),
        };
        self.state = PressState::Idle;
        self.handled = true;
        effects
    }

    /// Window blur or page hidden mid-press.
    pub fn interrupt(&mut self) -> Vec<PressEffect> {
        let effects = match self.state {
            PressState::Idle => return Vec::new(),
            PressState::Pressed { .. } => vec![PressEffect::CancelRamp],
            PressState::Ramped { original_rate, .. } => {
                vec![PressEffect::CancelRamp, PressEffect::SetRate(original_rate)]
            }
        };
        self.state = PressState::Idle;
        self.handled = true;
        effects
    }

    pub fn reset(&mut self) {
        *self = PressMachine::default();
    }
}

fn restore(original_rate: f64) -> Vec<PressEffect> {
    vec![
        PressEffect::CancelRamp,
        PressEffect::SetRate(original_rate),
        PressEffect::Notify(format!("Back to {}", rate_label(original_rate))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DELAY: Millis = 200;

    fn rates(effects: &[PressEffect]) -> Vec<f64> {
        effects
            .iter()
            .filter_map(|e| match e {
                PressEffect::SetRate(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn short_tap_seeks_and_resumes() {
        let mut m = PressMachine::default();
        assert_eq!(
            m.key_down(1000, false, 1.0, DELAY),
            vec![PressEffect::ArmRamp { at: 1200 }]
        );
        let up = m.key_up(1050, DELAY, 5.0);
        assert_eq!(
            up,
            vec![
                PressEffect::CancelRamp,
                PressEffect::SeekBy(5.0),
                PressEffect::Resume
            ]
        );
        assert!(m.is_idle());
    }

    #[test]
    fn hold_ramps_then_restores() {
        let mut m = PressMachine::default();
        m.key_down(0, false, 1.25, DELAY);
        let ramp = m.ramp_due(2.5);
        assert_eq!(rates(&ramp), vec![2.5]);
        assert!(matches!(m.state(), PressState::Ramped { .. }));
        let up = m.key_up(250, DELAY, 5.0);
        assert_eq!(rates(&up), vec![1.25]);
        assert!(!up.iter().any(|e| matches!(e, PressEffect::SeekBy(_))));
    }

    #[test]
    fn late_release_before_timer_still_restores() {
        let mut m = PressMachine::default();
        m.key_down(0, false, 1.0, DELAY);
        let up = m.key_up(DELAY, DELAY, 5.0);
        assert_eq!(rates(&up), vec![1.0]);
        // The stale timer landing afterwards does nothing.
        assert!(m.ramp_due(2.5).is_empty());
    }

    #[test]
    fn repeats_do_not_restart_the_press() {
        let mut m = PressMachine::default();
        m.key_down(0, false, 1.0, DELAY);
        assert!(m.key_down(30, true, 2.0, DELAY).is_empty());
        assert!(m.key_down(60, false, 2.0, DELAY).is_empty());
        assert_eq!(m.original_rate(), Some(1.0));
    }

    #[test]
    fn repeat_down_while_idle_is_ignored() {
        let mut m = PressMachine::default();
        assert!(m.key_down(0, true, 1.0, DELAY).is_empty());
        assert!(m.is_idle());
    }

    #[test]
    fn duplicate_key_up_is_processed_once() {
        let mut m = PressMachine::default();
        m.key_down(0, false, 1.0, DELAY);
        assert!(!m.key_up(10, DELAY, 5.0).is_empty());
        assert!(m.key_up(11, DELAY, 5.0).is_empty());
        assert!(m.key_up(500, DELAY, 5.0).is_empty());
    }

    #[test]
    fn key_up_without_press_is_ignored() {
        let mut m = PressMachine::default();
        assert!(m.key_up(10, DELAY, 5.0).is_empty());
    }

    #[test]
    fn interrupt_restores_ramped_rate() {
        let mut m = PressMachine::default();
        m.key_down(0, false, 0.75, DELAY);
        m.ramp_due(3.0);
        assert_eq!(
            m.interrupt(),
            vec![PressEffect::CancelRamp, PressEffect::SetRate(0.75)]
        );
        assert!(m.is_idle());
        assert!(m.key_up(400, DELAY, 5.0).is_empty());
    }

    #[test]
    fn interrupt_before_ramp_only_cancels() {
        let mut m = PressMachine::default();
        m.key_down(0, false, 1.0, DELAY);
        assert_eq!(m.interrupt(), vec![PressEffect::CancelRamp]);
        assert!(m.interrupt().is_empty());
    }

    #[derive(Clone, Debug)]
    enum Step {
        Down { dt: u64, repeat: bool },
        Up { dt: u64 },
        Timer,
        Blur,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u64..400, any::<bool>()).prop_map(|(dt, repeat)| Step::Down { dt, repeat }),
            (0u64..400).prop_map(|dt| Step::Up { dt }),
            Just(Step::Timer),
            Just(Step::Blur),
        ]
    }

    proptest! {
        /// Simulates a video whose rate is only changed by the machine and
        /// checks that every completed press leaves the rate where it began.
        #[test]
        fn rate_always_restored(steps in prop::collection::vec(step(), 1..40)) {
            let mut m = PressMachine::default();
            let mut now = 0;
            let mut rate = 1.0;
            let mut armed = false;
            let mut releases = 0usize;
            let mut downs = 0usize;
            for s in steps {
                let effects = match s {
                    Step::Down { dt, repeat } => {
                        now += dt;
                        let e = m.key_down(now, repeat, rate, DELAY);
                        if !e.is_empty() { downs += 1; }
                        e
                    }
                    Step::Up { dt } => {
                        now += dt;
                        let e = m.key_up(now, DELAY, 5.0);
                        if !e.is_empty() { releases += 1; }
                        e
                    }
                    Step::Timer if armed => {
                        armed = false;
                        m.ramp_due(4.0)
                    }
                    Step::Timer => Vec::new(),
                    Step::Blur => {
                        let e = m.interrupt();
                        if !e.is_empty() { releases += 1; }
                        e
                    }
                };
                for e in effects {
                    match e {
                        PressEffect::ArmRamp { .. } => armed = true,
                        PressEffect::CancelRamp => armed = false,
                        PressEffect::SetRate(r) => rate = r,
                        _ => {}
                    }
                }
                if m.is_idle() {
                    prop_assert_eq!(rate, 1.0);
                    prop_assert!(!armed);
                }
            }
            prop_assert!(releases <= downs);
        }
    }
}
