//! In-memory page model: elements, shadow roots, frames and media state.
//!
//! Nodes live in an arena. A [`NodeId`] carries the slot generation, so a
//! handle to a removed element stops resolving instead of aliasing whatever
//! reuses the slot later. That is what lets the controller hold the active
//! video as a weak reference.
//!
//! Structural changes are logged as [`MutationRecord`]s and writes made on the
//! controller's behalf (rate, seek, volume, fullscreen, clicks) are queued as
//! [`MediaCommand`]s. Both are drained by whoever drives the page.

mod media;
mod selector;

pub use media::{MediaCommand, MediaState, ReadyState};
pub use selector::Selector;

use crate::error::{Error, Result};

/// Opaque element handle. Compared by identity only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// One observed change to the connected tree.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationRecord {
    Added { node: NodeId },
    /// Every id of the detached subtree. They no longer resolve.
    Removed { nodes: Vec<NodeId>, had_video: bool },
}

#[derive(Debug)]
struct FrameContent {
    origin: String,
    body: NodeId,
}

#[derive(Debug)]
struct Node {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
    parent: Option<NodeId>,
    /// Owner element, set on shadow roots and frame bodies.
    host: Option<NodeId>,
    children: Vec<NodeId>,
    shadow: Option<NodeId>,
    frame: Option<FrameContent>,
    media: Option<MediaState>,
}

impl Node {
    fn new(tag: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        let media = (tag == "video").then(MediaState::default);
        Node {
            tag,
            id: None,
            classes: Vec::new(),
            attrs: Vec::new(),
            parent: None,
            host: None,
            children: Vec::new(),
            shadow: None,
            frame: None,
            media,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Tags whose focus means keystrokes belong to the page, not to us.
const EDITABLE_TAGS: &[&str] = &["input", "textarea", "bili-comment-rich-textarea"];

#[derive(Debug)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    body: NodeId,
    url: String,
    origin: String,
    focused: Option<NodeId>,
    fullscreen: Option<NodeId>,
    mutations: Vec<MutationRecord>,
    commands: Vec<MediaCommand>,
}

/// `scheme://host[:port]` of a URL. `file:` URLs collapse to `file://`.
pub fn origin_of(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.trim_end_matches('/').to_ascii_lowercase();
    };
    let scheme = scheme.to_ascii_lowercase();
    if scheme == "file" {
        return "file://".to_string();
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    format!("{}://{}", scheme, authority.to_ascii_lowercase())
}

impl Document {
    pub fn new(url: &str) -> Self {
        let mut doc = Document {
            slots: Vec::new(),
            free: Vec::new(),
            body: NodeId {
                index: 0,
                generation: 0,
            },
            url: url.to_string(),
            origin: origin_of(url),
            focused: None,
            fullscreen: None,
            mutations: Vec::new(),
            commands: Vec::new(),
        };
        doc.body = doc.alloc(Node::new("body"));
        doc
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Same-document URL change (history push/replace/pop). The origin is
    /// unchanged by definition.
    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    // ── Arena ───────────────────────────────────────────────────────────

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    fn release(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation && slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
            }
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    /// Whether the handle still resolves to a live element.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    // ── Element construction ────────────────────────────────────────────

    /// Create a detached element. `<video>` elements get default media state.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(Node::new(tag))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        match name {
            "id" => node.id = Some(value.to_string()),
            "class" => {
                node.classes = value.split_whitespace().map(str::to_string).collect();
            }
            _ => match node.attrs.iter_mut().find(|(k, _)| k == name) {
                Some((_, v)) => *v = value.to_string(),
                None => node.attrs.push((name.to_string(), value.to_string())),
            },
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let Some(node) = self.node_mut(id) {
            if !node.classes.iter().any(|c| c == class) {
                node.classes.push(class.to_string());
            }
        }
    }

    /// Attach (or return the existing) open shadow root of `host`.
    pub fn attach_shadow(&mut self, host: NodeId) -> Option<NodeId> {
        let existing = self.node(host)?.shadow;
        if existing.is_some() {
            return existing;
        }
        let mut root = Node::new("#shadow-root");
        root.host = Some(host);
        let root = self.alloc(root);
        if let Some(h) = self.node_mut(host) {
            h.shadow = Some(root);
        }
        Some(root)
    }

    /// Give `iframe` a content document. `origin` defaults to ours.
    pub fn attach_frame(&mut self, iframe: NodeId, origin: Option<&str>) -> Option<NodeId> {
        if let Some(frame) = &self.node(iframe)?.frame {
            return Some(frame.body);
        }
        let origin = origin.map_or_else(|| self.origin.clone(), origin_of);
        let mut body = Node::new("body");
        body.host = Some(iframe);
        let body = self.alloc(body);
        if let Some(f) = self.node_mut(iframe) {
            f.frame = Some(FrameContent { origin, body });
        }
        Some(body)
    }

    // ── Tree access ─────────────────────────────────────────────────────

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.tag.as_str())
    }

    pub fn element_id(&self, id: NodeId) -> Option<&str> {
        self.node(id).and_then(|n| n.id.as_deref())
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.node(id)
            .is_some_and(|n| n.classes.iter().any(|c| c == class))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        let node = self.node(id)?;
        match name {
            "id" => node.id.as_deref(),
            _ => node
                .attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
        }
    }

    /// Parent within the same tree. Shadow roots and frame bodies have none.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    fn composed_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id)?;
        node.parent.or(node.host)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.node(id) {
            Some(n) => &n.children,
            None => &[],
        }
    }

    pub fn shadow_root(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.shadow
    }

    /// Content document body of a frame element.
    ///
    /// Returns `Ok(None)` for non-frames and `CrossOriginAccessDenied` when the
    /// frame's origin differs from ours.
    pub fn frame_body(&self, id: NodeId) -> Result<Option<NodeId>> {
        let Some(frame) = self.node(id).and_then(|n| n.frame.as_ref()) else {
            return Ok(None);
        };
        if frame.origin != self.origin {
            return Err(Error::CrossOriginAccessDenied {
                origin: frame.origin.clone(),
            });
        }
        Ok(Some(frame.body))
    }

    /// Reachable from the document body across shadow and frame boundaries.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.body {
                return true;
            }
            match self.composed_parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// `ancestor` is `node` or contains it (crossing shadow/frame boundaries).
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.composed_parent(n);
        }
        false
    }

    /// Composed subtree rooted at `id` in pre-order: the node, its shadow
    /// content, its frame content, then its children.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let Some(node) = self.node(n) else {
                continue;
            };
            out.push(n);
            stack.extend(node.children.iter().rev().copied());
            if let Some(frame) = &node.frame {
                stack.push(frame.body);
            }
            if let Some(shadow) = node.shadow {
                stack.push(shadow);
            }
        }
        out
    }

    pub fn is_video(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.media.is_some())
    }

    pub fn subtree_has_video(&self, id: NodeId) -> bool {
        self.subtree(id).into_iter().any(|n| self.is_video(n))
    }

    /// First descendant of `root` (same tree, tree order) matching `selector`.
    pub fn query(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            if selector.matches(self, n) {
                return Some(n);
            }
            stack.extend(self.children(n).iter().rev().copied());
        }
        None
    }

    /// First match of the first selector that matches anything.
    pub fn query_any(&self, root: NodeId, selectors: &[Selector]) -> Option<NodeId> {
        selectors.iter().find_map(|s| self.query(root, s))
    }

    /// Short human label: `#id` when the element has one, `tag@index` otherwise.
    pub fn label(&self, id: NodeId) -> String {
        match self.node(id) {
            Some(Node { id: Some(eid), .. }) => format!("#{}", eid),
            Some(node) => format!("{}@{}", node.tag, id.index),
            None => format!("<gone@{}>", id.index),
        }
    }

    // ── Mutation ────────────────────────────────────────────────────────

    /// Append `child` under `parent`, moving it if it already had a parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.contains(parent) || !self.contains(child) || child == self.body {
            return false;
        }
        // Refuse cycles.
        if self.is_inclusive_ancestor(child, parent) {
            return false;
        }
        if let Some(old) = self.node(child).and_then(|n| n.parent) {
            if let Some(op) = self.node_mut(old) {
                op.children.retain(|c| *c != child);
            }
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.node_mut(parent) {
            p.children.push(child);
        }
        if self.is_connected(child) {
            self.mutations.push(MutationRecord::Added { node: child });
        }
        true
    }

    /// Detach and destroy `id` with its whole composed subtree. Returns the
    /// destroyed ids; none of them resolve afterwards.
    pub fn remove(&mut self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.node(id).and_then(|n| n.parent) else {
            return Vec::new();
        };
        let was_connected = self.is_connected(id);
        let nodes = self.subtree(id);
        let had_video = nodes.iter().any(|n| self.is_video(*n));

        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        for n in &nodes {
            self.release(*n);
        }
        if self.focused.is_some_and(|f| nodes.contains(&f)) {
            self.focused = None;
        }
        if self.fullscreen.is_some_and(|f| nodes.contains(&f)) {
            self.fullscreen = None;
        }
        if was_connected {
            self.mutations.push(MutationRecord::Removed {
                nodes: nodes.clone(),
                had_video,
            });
        }
        nodes
    }

    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    pub fn has_pending_mutations(&self) -> bool {
        !self.mutations.is_empty()
    }

    // ── Focus ───────────────────────────────────────────────────────────

    pub fn focus(&mut self, id: Option<NodeId>) {
        self.focused = id.filter(|n| self.contains(*n));
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    fn is_editable(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        if EDITABLE_TAGS.contains(&node.tag.as_str()) {
            return true;
        }
        node.attrs
            .iter()
            .any(|(k, v)| k == "contenteditable" && v != "false")
    }

    /// An editable element (or one inside an editable host, including across
    /// shadow roots) currently holds focus.
    pub fn focus_is_editable(&self) -> bool {
        let mut cur = self.focused;
        while let Some(n) = cur {
            if self.is_editable(n) {
                return true;
            }
            cur = self.composed_parent(n);
        }
        false
    }

    // ── Media ───────────────────────────────────────────────────────────

    pub fn media(&self, id: NodeId) -> Option<&MediaState> {
        self.node(id)?.media.as_ref()
    }

    /// Apply an observation from the real player. Does not queue a command.
    pub fn observe_media(&mut self, id: NodeId, f: impl FnOnce(&mut MediaState)) -> bool {
        match self.node_mut(id).and_then(|n| n.media.as_mut()) {
            Some(m) => {
                f(m);
                true
            }
            None => false,
        }
    }

    fn command(&mut self, id: NodeId, f: impl FnOnce(&mut MediaState) -> MediaCommand) -> bool {
        let Some(media) = self.node_mut(id).and_then(|n| n.media.as_mut()) else {
            return false;
        };
        let cmd = f(media);
        self.commands.push(cmd);
        true
    }

    pub fn set_playback_rate(&mut self, id: NodeId, rate: f64) -> bool {
        self.command(id, |m| {
            m.playback_rate = rate;
            MediaCommand::SetRate { node: id, rate }
        })
    }

    /// Seek to an absolute position, clamped to `0..=duration` when the
    /// duration is known.
    pub fn seek(&mut self, id: NodeId, time: f64) -> bool {
        self.command(id, |m| {
            let mut t = time.max(0.0);
            if m.duration > 0.0 {
                t = t.min(m.duration);
            }
            m.current_time = t;
            MediaCommand::Seek { node: id, time: t }
        })
    }

    pub fn set_volume(&mut self, id: NodeId, volume: f64) -> bool {
        self.command(id, |m| {
            m.volume = volume.clamp(0.0, 1.0);
            MediaCommand::SetVolume {
                node: id,
                volume: m.volume,
            }
        })
    }

    pub fn play(&mut self, id: NodeId) -> bool {
        self.command(id, |m| {
            m.paused = false;
            MediaCommand::Play { node: id }
        })
    }

    pub fn pause(&mut self, id: NodeId) -> bool {
        self.command(id, |m| {
            m.paused = true;
            MediaCommand::Pause { node: id }
        })
    }

    pub fn fullscreen(&self) -> Option<NodeId> {
        self.fullscreen.filter(|n| self.contains(*n))
    }

    pub fn request_fullscreen(&mut self, id: NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.fullscreen = Some(id);
        self.commands.push(MediaCommand::EnterFullscreen { node: id });
        true
    }

    pub fn exit_fullscreen(&mut self) {
        if self.fullscreen.take().is_some() {
            self.commands.push(MediaCommand::ExitFullscreen);
        }
    }

    /// Synthetic click, e.g. on a site's own fullscreen button.
    pub fn click(&mut self, id: NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.commands.push(MediaCommand::Click { node: id });
        true
    }

    pub fn take_commands(&mut self) -> Vec<MediaCommand> {
        std::mem::take(&mut self.commands)
    }
}
