//! Deterministic replay of a page and a timed event script.
//!
//! A scenario is JSON: the page URL, optional settings and opt-ins, the
//! initial element tree and a list of steps at absolute millisecond times.
//! Elements are addressed by their `id`. Every step produces one trace line
//! describing the controller state after it ran.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::controller::{Controller, Event};
use crate::dom::{Document, MediaState, NodeId, ReadyState};
use crate::error::{Error, Result};
use crate::keys::{KeyCode, KeyEvent};
use crate::settings::{MemoryStore, SettingKey, Settings, SettingsStore};
use crate::site::AllowList;
use crate::timers::Millis;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Scenario {
    pub url: String,
    #[serde(default)]
    pub settings: BTreeMap<String, f64>,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub page: Vec<ElementSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub media: Option<MediaSpec>,
    #[serde(default)]
    pub children: Vec<ElementSpec>,
    /// Open shadow root content.
    #[serde(default)]
    pub shadow: Option<Vec<ElementSpec>>,
    /// Frame content document.
    #[serde(default)]
    pub frame: Option<FrameSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FrameSpec {
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub children: Vec<ElementSpec>,
}

/// Partial media state; absent fields keep their current value.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MediaSpec {
    pub has_source: Option<bool>,
    pub source_pending: Option<bool>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub ready_state: Option<u8>,
    pub paused: Option<bool>,
    pub current_time: Option<f64>,
    pub duration: Option<f64>,
    pub playback_rate: Option<f64>,
    pub volume: Option<f64>,
}

impl MediaSpec {
    fn apply(&self, m: &mut MediaState) {
        if let Some(v) = self.has_source {
            m.has_source = v;
        }
        if let Some(v) = self.source_pending {
            m.source_pending = v;
        }
        if let Some(v) = self.width {
            m.width = v;
        }
        if let Some(v) = self.height {
            m.height = v;
        }
        if let Some(v) = self.ready_state {
            m.ready_state = ReadyState::from_ordinal(v);
        }
        if let Some(v) = self.paused {
            m.paused = v;
        }
        if let Some(v) = self.current_time {
            m.current_time = v;
        }
        if let Some(v) = self.duration {
            m.duration = v;
        }
        if let Some(v) = self.playback_rate {
            m.playback_rate = v;
        }
        if let Some(v) = self.volume {
            m.volume = v;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Step {
    pub at: Millis,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "do", rename_all = "camelCase")]
pub enum Action {
    Start,
    Tick,
    KeyDown {
        code: String,
        #[serde(default)]
        repeat: bool,
        #[serde(default)]
        target: Option<String>,
    },
    KeyUp {
        code: String,
        #[serde(default)]
        target: Option<String>,
    },
    /// Press and release `code` at `at` and `at + hold`.
    Hold {
        code: String,
        hold: Millis,
        #[serde(default)]
        target: Option<String>,
    },
    Focus {
        #[serde(default)]
        node: Option<String>,
    },
    Blur,
    Hidden,
    Append {
        #[serde(default)]
        parent: Option<String>,
        element: ElementSpec,
    },
    Remove {
        node: String,
    },
    Media {
        node: String,
        media: MediaSpec,
    },
    Ready {
        node: String,
    },
    Navigate {
        url: String,
    },
    Click {
        node: String,
    },
    Setting {
        name: String,
        value: String,
    },
}

/// State after one step.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceLine {
    pub at: Millis,
    pub what: String,
    pub active: Option<String>,
    pub rate: Option<f64>,
    pub time: Option<f64>,
    pub consumed: bool,
    pub toasts: Vec<String>,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>7} {:<22} active={:<10}",
            self.at,
            self.what,
            self.active.as_deref().unwrap_or("-")
        )?;
        if let Some(rate) = self.rate {
            write!(f, " rate={:.2}", rate)?;
        }
        if let Some(time) = self.time {
            write!(f, " t={:.2}", time)?;
        }
        if self.consumed {
            write!(f, " consumed")?;
        }
        for toast in &self.toasts {
            write!(f, " [{}]", toast)?;
        }
        Ok(())
    }
}

/// A finished replay: the final page, controller and full trace.
pub struct Replay {
    pub doc: Document,
    pub controller: Controller,
    pub store: MemoryStore,
    pub trace: Vec<TraceLine>,
    names: BTreeMap<String, NodeId>,
}

impl Replay {
    pub fn node(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn active_name(&self) -> Option<&str> {
        let active = self.controller.active_video(&self.doc)?;
        self.names
            .iter()
            .find(|(_, id)| **id == active)
            .map(|(name, _)| name.as_str())
    }
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Scenario::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn run(self) -> Result<Replay> {
        let mut store = MemoryStore::default();
        for (name, value) in &self.settings {
            let key = SettingKey::from_name(name)?;
            Settings::validate(key, *value)?;
            store.set_setting(key.name(), *value)?;
        }
        let allow = AllowList::new(&self.allow);

        let mut doc = Document::new(&self.url);
        let mut names = BTreeMap::new();
        let body = doc.body();
        for el in &self.page {
            build(&mut doc, &mut names, body, el);
        }
        doc.take_mutations();
        doc.take_commands();

        let controller = Controller::new(&doc, Settings::load(&store), &allow);
        let mut replay = Replay {
            doc,
            controller,
            store,
            trace: Vec::new(),
            names,
        };

        let mut steps = self.steps;
        steps.sort_by_key(|s| s.at);
        for step in steps {
            replay.step(step)?;
        }
        Ok(replay)
    }
}

fn build(
    doc: &mut Document,
    names: &mut BTreeMap<String, NodeId>,
    parent: NodeId,
    spec: &ElementSpec,
) -> NodeId {
    let node = doc.create_element(&spec.tag);
    if let Some(id) = &spec.id {
        doc.set_attr(node, "id", id);
        names.insert(id.clone(), node);
    }
    if let Some(class) = &spec.class {
        doc.set_attr(node, "class", class);
    }
    for (k, v) in &spec.attrs {
        doc.set_attr(node, k, v);
    }
    if let Some(media) = &spec.media {
        doc.observe_media(node, |m| media.apply(m));
    }
    if let Some(shadow) = &spec.shadow {
        if let Some(root) = doc.attach_shadow(node) {
            for child in shadow {
                build(doc, names, root, child);
            }
        }
    }
    if let Some(frame) = &spec.frame {
        if let Some(fbody) = doc.attach_frame(node, frame.origin.as_deref()) {
            for child in &frame.children {
                build(doc, names, fbody, child);
            }
        }
    }
    for child in &spec.children {
        build(doc, names, node, child);
    }
    doc.append_child(parent, node);
    node
}

fn key_code(code: &str) -> Result<KeyCode> {
    KeyCode::from_code(code).ok_or_else(|| Error::UnknownElement(format!("key {}", code)))
}

impl Replay {
    fn resolve(&self, name: &str) -> Result<NodeId> {
        self.node(name)
            .ok_or_else(|| Error::UnknownElement(name.to_string()))
    }

    fn key(&self, code: &str, repeat: bool, target: Option<&str>) -> Result<KeyEvent> {
        let mut ev = KeyEvent::new(key_code(code)?);
        ev.repeat = repeat;
        ev.target = match target {
            Some(name) => Some(self.resolve(name)?),
            None => self.doc.focused(),
        };
        Ok(ev)
    }

    fn send(&mut self, at: Millis, event: Event) -> bool {
        self.controller.handle(&mut self.doc, at, event)
    }

    fn step(&mut self, step: Step) -> Result<()> {
        let mut at = step.at;
        let mut consumed = false;
        let what = match step.action {
            Action::Start => {
                self.send(at, Event::Start);
                "start".to_string()
            }
            Action::Tick => {
                self.controller.tick(&mut self.doc, at);
                "tick".to_string()
            }
            Action::KeyDown {
                code,
                repeat,
                target,
            } => {
                let ev = self.key(&code, repeat, target.as_deref())?;
                consumed = self.send(at, Event::KeyDown(ev));
                format!("down {}{}", code, if repeat { " (repeat)" } else { "" })
            }
            Action::KeyUp { code, target } => {
                let ev = self.key(&code, false, target.as_deref())?;
                consumed = self.send(at, Event::KeyUp(ev));
                format!("up {}", code)
            }
            Action::Hold { code, hold, target } => {
                let ev = self.key(&code, false, target.as_deref())?;
                consumed = self.send(at, Event::KeyDown(ev));
                self.controller.tick(&mut self.doc, at + hold);
                self.record(at, format!("down {}", code), consumed);
                at += hold;
                consumed = self.send(at, Event::KeyUp(ev));
                format!("up {} after {}ms", code, hold)
            }
            Action::Focus { node } => {
                let id = node.as_deref().map(|n| self.resolve(n)).transpose()?;
                self.doc.focus(id);
                format!("focus {}", node.as_deref().unwrap_or("-"))
            }
            Action::Blur => {
                self.send(at, Event::Blur);
                "blur".to_string()
            }
            Action::Hidden => {
                self.send(at, Event::Hidden);
                "hidden".to_string()
            }
            Action::Append { parent, element } => {
                let parent = match parent.as_deref() {
                    Some(name) => self.resolve(name)?,
                    None => self.doc.body(),
                };
                build(&mut self.doc, &mut self.names, parent, &element);
                self.send(at, Event::Mutations);
                format!("append {}", element.id.as_deref().unwrap_or(&element.tag))
            }
            Action::Remove { node } => {
                let id = self.resolve(&node)?;
                let gone = self.doc.remove(id);
                self.names.retain(|_, n| !gone.contains(n));
                self.send(at, Event::Mutations);
                format!("remove {}", node)
            }
            Action::Media { node, media } => {
                let id = self.resolve(&node)?;
                self.doc.observe_media(id, |m| media.apply(m));
                self.controller.tick(&mut self.doc, at);
                format!("media {}", node)
            }
            Action::Ready { node } => {
                let id = self.resolve(&node)?;
                consumed = self.send(at, Event::MediaReady(id));
                format!("ready {}", node)
            }
            Action::Navigate { url } => {
                consumed = self.send(at, Event::Navigated(url.clone()));
                format!("navigate {}", url)
            }
            Action::Click { node } => {
                let id = self.resolve(&node)?;
                consumed = self.send(at, Event::AffordanceClicked(id));
                format!("click {}", node)
            }
            Action::Setting { name, value } => {
                let key = SettingKey::from_name(&name)?;
                self.controller.tick(&mut self.doc, at);
                // Rejected input is reported through the toast, not the trace.
                self.controller
                    .update_setting(&mut self.doc, &mut self.store, key, &value)
                    .ok();
                format!("set {}={}", key.name(), value)
            }
        };
        self.record(at, what, consumed);
        Ok(())
    }

    fn record(&mut self, at: Millis, what: String, consumed: bool) {
        let active = self.controller.active_video(&self.doc);
        let media = active.and_then(|v| self.doc.media(v));
        let line = TraceLine {
            at,
            what,
            active: self
                .active_name()
                .map(str::to_string)
                .or_else(|| active.map(|v| self.doc.label(v))),
            rate: media.map(|m| m.playback_rate),
            time: media.map(|m| m.current_time),
            consumed,
            toasts: self.controller.toasts_mut().take_history(),
        };
        self.trace.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_VIDEOS: &str = r#"{
        "url": "file:///videos/",
        "page": [
            { "tag": "video", "id": "a", "media": { "hasSource": true, "readyState": 4, "width": 640, "height": 360 } },
            { "tag": "div", "children": [
                { "tag": "video", "id": "b", "media": { "hasSource": true, "readyState": 4, "width": 640, "height": 360 } }
            ] }
        ],
        "steps": [
            { "at": 0, "do": "start" },
            { "at": 100, "do": "click", "node": "b" },
            { "at": 200, "do": "keyDown", "code": "ArrowUp" }
        ]
    }"#;

    #[test]
    fn parses_and_replays() {
        let replay = Scenario::from_json(TWO_VIDEOS).unwrap().run().unwrap();
        assert_eq!(replay.trace.len(), 3);
        assert_eq!(replay.trace[0].active.as_deref(), Some("a"));
        assert_eq!(replay.active_name(), Some("b"));
        assert!(replay.trace[1].consumed);
        // Volume starts at 100%: consumed, but nothing to announce.
        assert!(replay.trace[2].consumed);
        assert!(replay.trace[2].toasts.is_empty());
    }

    #[test]
    fn trace_lines_render() {
        let line = TraceLine {
            at: 250,
            what: "up ArrowRight".into(),
            active: Some("a".into()),
            rate: Some(1.0),
            time: Some(15.0),
            consumed: true,
            toasts: vec!["Back to 1x".into()],
        };
        let s = line.to_string();
        assert!(s.contains("active=a"));
        assert!(s.contains("rate=1.00"));
        assert!(s.ends_with("consumed [Back to 1x]"));
    }

    #[test]
    fn bad_scenarios_are_errors() {
        assert!(matches!(
            Scenario::from_json("{\"url\": 1}"),
            Err(Error::Scenario(_))
        ));
        let s = Scenario::from_json(r#"{ "url": "file:///", "settings": { "targetRate": 40 } }"#)
            .unwrap();
        assert!(matches!(s.run(), Err(Error::InvalidSettingValue { .. })));
        let s = Scenario::from_json(
            r#"{ "url": "file:///", "steps": [ { "at": 0, "do": "remove", "node": "nope" } ] }"#,
        )
        .unwrap();
        assert!(matches!(s.run(), Err(Error::UnknownElement(_))));
    }
}
