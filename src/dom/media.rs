//! Media element state and the outbox of writes made against it.

use super::NodeId;

/// `HTMLMediaElement.readyState` ordinal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    #[default]
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl ReadyState {
    /// Out-of-range ordinals saturate at `HaveEnoughData`.
    pub fn from_ordinal(n: u8) -> Self {
        match n {
            0 => ReadyState::HaveNothing,
            1 => ReadyState::HaveMetadata,
            2 => ReadyState::HaveCurrentData,
            3 => ReadyState::HaveFutureData,
            _ => ReadyState::HaveEnoughData,
        }
    }
}

/// Playback-relevant properties of a `<video>` element.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaState {
    /// A playable source is resolved (`currentSrc` is set).
    pub has_source: bool,
    /// A source is declared but still being fetched/resolved.
    pub source_pending: bool,
    /// Rendered size in CSS pixels; 0 when hidden or not laid out.
    pub width: u32,
    pub height: u32,
    pub ready_state: ReadyState,
    pub paused: bool,
    /// Seconds.
    pub current_time: f64,
    /// Seconds; 0 when unknown.
    pub duration: f64,
    pub playback_rate: f64,
    /// 0.0..=1.0
    pub volume: f64,
}

impl Default for MediaState {
    fn default() -> Self {
        MediaState {
            has_source: false,
            source_pending: false,
            width: 0,
            height: 0,
            ready_state: ReadyState::HaveNothing,
            paused: true,
            current_time: 0.0,
            duration: 0.0,
            playback_rate: 1.0,
            volume: 1.0,
        }
    }
}

/// A write made through [`Document`](super::Document) on behalf of the
/// controller. Hosts drain these and mirror them onto the real player.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaCommand {
    SetRate { node: NodeId, rate: f64 },
    Seek { node: NodeId, time: f64 },
    SetVolume { node: NodeId, volume: f64 },
    Play { node: NodeId },
    Pause { node: NodeId },
    EnterFullscreen { node: NodeId },
    ExitFullscreen,
    Click { node: NodeId },
}
