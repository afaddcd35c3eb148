//! Video discovery: walk the page and snapshot every `<video>` element.
//!
//! The walk descends into shadow roots and same-origin frames, bounded by
//! [`ScanLimits`]. Cross-origin frames are expected and skipped quietly.
//! Scanning never writes to the page; validity filtering is a separate step
//! ([`valid`]) so the walk can be tested without a selection policy.

use log::debug;

use crate::dom::{Document, NodeId, ReadyState};

/// Boundary-crossing limits. Every shadow root or frame entered counts one
/// level against `max_depth`; shadow roots also count against the tighter
/// `max_shadow_depth`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanLimits {
    pub max_depth: usize,
    pub max_shadow_depth: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        ScanLimits {
            max_depth: 10,
            max_shadow_depth: 3,
        }
    }
}

/// Snapshot of one discovered element. Identity is `node`; the remaining
/// fields are only meaningful for the scan that produced them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoCandidate {
    pub node: NodeId,
    pub has_source: bool,
    pub source_pending: bool,
    pub width: u32,
    pub height: u32,
    pub ready_state: ReadyState,
    pub paused: bool,
    pub current_time: f64,
    pub duration: f64,
}

impl VideoCandidate {
    /// Filters out placeholder/ad elements with no source, no metadata and
    /// no rendered size.
    pub fn is_valid(&self) -> bool {
        self.has_source
            || self.ready_state >= ReadyState::HaveMetadata
            || (self.width > 0 && self.height > 0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Scan {
    /// Composed tree order.
    pub candidates: Vec<VideoCandidate>,
    /// Frames skipped because their content was cross-origin.
    pub denied_frames: usize,
}

/// Every `<video>` reachable from the document body within `limits`.
pub fn scan(doc: &Document, limits: ScanLimits) -> Scan {
    let mut out = Scan::default();
    // (node, depth, shadow_depth)
    let mut stack = vec![(doc.body(), 0usize, 0usize)];

    while let Some((node, depth, shadow_depth)) = stack.pop() {
        if let Some(media) = doc.media(node) {
            out.candidates.push(VideoCandidate {
                node,
                has_source: media.has_source,
                source_pending: media.source_pending,
                width: media.width,
                height: media.height,
                ready_state: media.ready_state,
                paused: media.paused,
                current_time: media.current_time,
                duration: media.duration,
            });
        }

        // Pushed in reverse so the pop order is: shadow, frame, children.
        stack.extend(
            doc.children(node)
                .iter()
                .rev()
                .map(|c| (*c, depth, shadow_depth)),
        );

        if depth < limits.max_depth {
            match doc.frame_body(node) {
                Ok(Some(body)) => stack.push((body, depth + 1, shadow_depth)),
                Ok(None) => {}
                Err(e) => {
                    debug!("scan: skipping {}: {}", doc.label(node), e);
                    out.denied_frames += 1;
                }
            }
        }

        if depth < limits.max_depth && shadow_depth < limits.max_shadow_depth {
            if let Some(root) = doc.shadow_root(node) {
                stack.push((root, depth + 1, shadow_depth + 1));
            }
        }
    }

    out
}

/// The candidates that pass [`VideoCandidate::is_valid`], in scan order.
pub fn valid(candidates: &[VideoCandidate]) -> Vec<VideoCandidate> {
    candidates.iter().copied().filter(|c| c.is_valid()).collect()
}
