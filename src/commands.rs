//! One-shot key commands against the active video.

use crate::dom::{Document, NodeId};
use crate::keys::KeyCode;
use crate::settings::Settings;
use crate::site::SiteProfile;
use crate::toast::Notifier;

pub const MAX_RATE: f64 = 16.0;
pub const MIN_RATE: f64 = 0.1;
/// Frame step assumes 30 fps.
pub const FRAME_STEP: f64 = 1.0 / 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    VolumeUp,
    VolumeDown,
    SeekBack,
    QuickRateUp,
    QuickRateDown,
    ResetRate,
    TargetRateUp,
    TargetRateDown,
    FrameForward,
    FrameBack,
    ToggleFullscreen,
    TogglePlay,
}

impl Command {
    /// `ArrowRight` is not a command; it belongs to the press machine.
    pub fn for_key(code: KeyCode) -> Option<Command> {
        Some(match code {
            KeyCode::ArrowUp => Command::VolumeUp,
            KeyCode::ArrowDown => Command::VolumeDown,
            KeyCode::ArrowLeft => Command::SeekBack,
            KeyCode::BracketRight => Command::QuickRateUp,
            KeyCode::BracketLeft => Command::QuickRateDown,
            KeyCode::KeyP => Command::ResetRate,
            KeyCode::Equal => Command::TargetRateUp,
            KeyCode::Minus => Command::TargetRateDown,
            KeyCode::Period => Command::FrameForward,
            KeyCode::Comma => Command::FrameBack,
            KeyCode::Enter => Command::ToggleFullscreen,
            KeyCode::Space => Command::TogglePlay,
            KeyCode::ArrowRight => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ran {
    /// Not applicable right now; the key should reach the page.
    Skipped,
    Done,
    /// The playback rate was changed by hand.
    RateChanged,
}

/// Everything a command may touch.
pub struct CommandEnv<'a> {
    pub doc: &'a mut Document,
    pub video: NodeId,
    pub settings: &'a Settings,
    /// Session hold rate, adjusted by `+`/`-`.
    pub target_rate: &'a mut f64,
    pub profile: &'a SiteProfile,
    pub notifier: &'a mut dyn Notifier,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn run(cmd: Command, env: CommandEnv<'_>) -> Ran {
    let CommandEnv {
        doc,
        video,
        settings,
        target_rate,
        profile,
        notifier,
    } = env;
    let Some(media) = doc.media(video).cloned() else {
        return Ran::Skipped;
    };

    match cmd {
        Command::VolumeUp | Command::VolumeDown => {
            let step = if cmd == Command::VolumeUp {
                settings.volume_step
            } else {
                -settings.volume_step
            };
            let at_limit = if step > 0.0 {
                media.volume >= 1.0
            } else {
                media.volume <= 0.0
            };
            if !at_limit {
                let volume = round2(media.volume + step).clamp(0.0, 1.0);
                doc.set_volume(video, volume);
                notifier.notify(&format!("Volume: {}%", (volume * 100.0).round()));
            }
            Ran::Done
        }
        Command::SeekBack => {
            doc.seek(video, (media.current_time - settings.seek_step).max(0.0));
            Ran::Done
        }
        Command::QuickRateUp => {
            let rate = round2(media.playback_rate + settings.quick_rate_step).min(MAX_RATE);
            doc.set_playback_rate(video, rate);
            notifier.notify(&format!("Speed: {:.2}x", rate));
            Ran::RateChanged
        }
        Command::QuickRateDown => {
            let rate = round2(media.playback_rate - settings.quick_rate_step);
            if rate >= MIN_RATE {
                doc.set_playback_rate(video, rate);
                notifier.notify(&format!("Speed: {:.2}x", rate));
                Ran::RateChanged
            } else {
                notifier.notify("Speed is already at the minimum 0.1x");
                Ran::Done
            }
        }
        Command::ResetRate => {
            doc.set_playback_rate(video, 1.0);
            notifier.notify("Normal speed");
            Ran::RateChanged
        }
        Command::TargetRateUp => {
            *target_rate = round2(*target_rate + settings.target_rate_step).min(MAX_RATE);
            notifier.notify(&format!("Hold speed: {:.2}x", *target_rate));
            Ran::Done
        }
        Command::TargetRateDown => {
            let next = round2(*target_rate - settings.target_rate_step);
            if next >= MIN_RATE {
                *target_rate = next;
                notifier.notify(&format!("Hold speed: {:.2}x", next));
            } else {
                notifier.notify("Hold speed is already at the minimum 0.1x");
            }
            Ran::Done
        }
        Command::FrameForward | Command::FrameBack => {
            if !media.paused {
                return Ran::Skipped;
            }
            let delta = if cmd == Command::FrameForward {
                FRAME_STEP
            } else {
                -FRAME_STEP
            };
            doc.seek(video, media.current_time + delta);
            Ran::Done
        }
        Command::ToggleFullscreen => {
            if let Some(button) = profile.fullscreen_button(doc) {
                doc.click(button);
            } else if doc.fullscreen().is_none() {
                doc.request_fullscreen(video);
                notifier.notify("Fullscreen");
            } else {
                doc.exit_fullscreen();
                notifier.notify("Exit fullscreen");
            }
            Ran::Done
        }
        Command::TogglePlay => {
            if media.paused {
                doc.play(video);
            } else {
                doc.pause(video);
            }
            Ran::Done
        }
    }
}
