//! End-to-end behaviour through the public API and the replay format.

use vspeed::dom::{Document, MediaCommand, MediaState, NodeId, ReadyState};
use vspeed::keys::{KeyCode, KeyEvent};
use vspeed::scenario::Scenario;
use vspeed::settings::{MemoryStore, Settings};
use vspeed::site::AllowList;
use vspeed::{Controller, Event};

const PAGE: &str = "https://example.com/watch";

fn playing(ready: ReadyState) -> MediaState {
    MediaState {
        has_source: true,
        width: 640,
        height: 360,
        ready_state: ready,
        paused: false,
        current_time: 10.0,
        duration: 120.0,
        ..MediaState::default()
    }
}

fn video(doc: &mut Document, media: MediaState) -> NodeId {
    let v = doc.create_element("video");
    doc.observe_media(v, |m| *m = media);
    let body = doc.body();
    doc.append_child(body, v);
    v
}

fn session(doc: &mut Document, store: &MemoryStore) -> Controller {
    doc.take_mutations();
    let allow = AllowList::new(["https://example.com"]);
    let mut c = Controller::new(doc, Settings::load(store), &allow);
    c.handle(doc, 0, Event::Start);
    c
}

fn rate(doc: &Document, v: NodeId) -> f64 {
    doc.media(v).map(|m| m.playback_rate).unwrap_or(f64::NAN)
}

fn right() -> KeyEvent {
    KeyEvent::new(KeyCode::ArrowRight)
}

#[test]
fn single_video_gets_default_rate() {
    let mut doc = Document::new(PAGE);
    let v = video(&mut doc, playing(ReadyState::HaveMetadata));
    let store = MemoryStore::default().with("defaultRate", 1.5);
    let c = session(&mut doc, &store);

    assert_eq!(c.active_video(&doc), Some(v));
    assert_eq!(rate(&doc, v), 1.5);
    assert!(doc
        .take_commands()
        .contains(&MediaCommand::SetRate { node: v, rate: 1.5 }));
}

#[test]
fn long_press_ramps_then_restores() {
    let mut doc = Document::new(PAGE);
    let v = video(&mut doc, playing(ReadyState::HaveEnoughData));
    let mut c = session(&mut doc, &MemoryStore::default());
    let before = rate(&doc, v);

    assert!(c.handle(&mut doc, 1000, Event::KeyDown(right())));
    assert_eq!(rate(&doc, v), before);
    c.tick(&mut doc, 1200);
    assert_eq!(rate(&doc, v), 2.5);
    assert_eq!(c.toasts().last(), Some("Playing at 2.5x"));

    assert!(c.handle(&mut doc, 1250, Event::KeyUp(right())));
    assert_eq!(rate(&doc, v), before);
    assert_eq!(c.toasts().last(), Some("Back to 1x"));
    assert!(c.press().is_idle());
}

#[test]
fn short_tap_seeks_without_touching_rate() {
    let mut doc = Document::new(PAGE);
    let v = video(&mut doc, playing(ReadyState::HaveEnoughData));
    let mut c = session(&mut doc, &MemoryStore::default());
    doc.take_commands();

    c.handle(&mut doc, 1000, Event::KeyDown(right()));
    c.handle(&mut doc, 1050, Event::KeyUp(right()));
    c.tick(&mut doc, 2000);

    assert_eq!(doc.media(v).map(|m| m.current_time), Some(15.0));
    let cmds = doc.take_commands();
    assert!(cmds.contains(&MediaCommand::Seek { node: v, time: 15.0 }));
    assert!(!cmds
        .iter()
        .any(|c| matches!(c, MediaCommand::SetRate { .. })));
}

#[test]
fn affordance_click_switches_exclusively() {
    let mut doc = Document::new(PAGE);
    let a = video(&mut doc, playing(ReadyState::HaveEnoughData));
    let b = video(&mut doc, playing(ReadyState::HaveEnoughData));
    let mut c = session(&mut doc, &MemoryStore::default());

    assert_eq!(c.active_video(&doc), Some(a));
    assert_eq!(c.affordances().len(), 2);

    assert!(c.handle(&mut doc, 500, Event::AffordanceClicked(b)));
    assert_eq!(c.active_video(&doc), Some(b));
    let active: Vec<NodeId> = c
        .affordances()
        .iter()
        .filter(|x| x.active)
        .map(|x| x.video)
        .collect();
    assert_eq!(active, vec![b]);
}

#[test]
fn removed_active_video_is_forgotten_in_the_same_turn() {
    let mut doc = Document::new(PAGE);
    let v = video(&mut doc, playing(ReadyState::HaveEnoughData));
    let mut c = session(&mut doc, &MemoryStore::default());
    assert_eq!(c.active_video(&doc), Some(v));
    doc.take_commands();

    doc.remove(v);
    c.handle(&mut doc, 1000, Event::Mutations);
    assert_eq!(c.active_video(&doc), None);
    assert_eq!(c.selection().active(), None);

    assert!(!c.handle(&mut doc, 1100, Event::KeyDown(right())));
    c.handle(&mut doc, 1400, Event::KeyUp(right()));
    c.tick(&mut doc, 20_000);
    assert!(doc.take_commands().is_empty());
}

#[test]
fn removal_mid_hold_falls_over_to_the_next_video() {
    let mut doc = Document::new(PAGE);
    let a = video(&mut doc, playing(ReadyState::HaveEnoughData));
    let b = video(&mut doc, playing(ReadyState::HaveEnoughData));
    let mut c = session(&mut doc, &MemoryStore::default());

    c.handle(&mut doc, 1000, Event::KeyDown(right()));
    c.tick(&mut doc, 1300);
    assert_eq!(rate(&doc, a), 2.5);

    doc.remove(a);
    c.handle(&mut doc, 1400, Event::Mutations);
    assert_eq!(c.active_video(&doc), Some(b));
    assert!(c.press().is_idle());

    // The release belongs to the abandoned press.
    c.handle(&mut doc, 1500, Event::KeyUp(right()));
    assert_eq!(rate(&doc, b), 1.0);
}

#[test]
fn blur_during_hold_restores_rate() {
    let mut doc = Document::new(PAGE);
    let v = video(&mut doc, playing(ReadyState::HaveEnoughData));
    let mut c = session(&mut doc, &MemoryStore::default());

    c.handle(&mut doc, 1000, Event::KeyDown(right()));
    c.tick(&mut doc, 1300);
    c.handle(&mut doc, 1400, Event::Blur);
    assert_eq!(rate(&doc, v), 1.0);
    assert!(c.press().is_idle());
}

#[test]
fn disallowed_origin_is_inert() {
    let mut doc = Document::new("https://elsewhere.org/");
    video(&mut doc, playing(ReadyState::HaveEnoughData));
    let allow = AllowList::default();
    let mut c = Controller::new(&doc, Settings::default(), &allow);
    assert!(!c.is_enabled());
    c.handle(&mut doc, 0, Event::Start);
    assert_eq!(c.active_video(&doc), None);
    assert!(!c.handle(&mut doc, 10, Event::KeyDown(right())));
    assert!(doc.take_commands().is_empty());
}

const LONG_PRESS: &str = r#"{
    "url": "https://www.youtube.com/watch?v=x",
    "settings": { "targetRate": 3 },
    "page": [
        { "tag": "div", "id": "movie_player", "children": [
            { "tag": "video", "id": "main",
              "media": { "hasSource": true, "readyState": 4, "width": 1280, "height": 720,
                         "paused": false, "currentTime": 30, "duration": 600 } }
        ] }
    ],
    "steps": [
        { "at": 0, "do": "start" },
        { "at": 1000, "do": "hold", "code": "ArrowRight", "hold": 400, "target": "main" },
        { "at": 3000, "do": "hold", "code": "ArrowRight", "hold": 60, "target": "main" },
        { "at": 3500, "do": "keyDown", "code": "ArrowRight" },
        { "at": 4000, "do": "keyDown", "code": "Equal", "target": "main" },
        { "at": 5000, "do": "setting", "name": "seekStep", "value": "500" }
    ]
}"#;

#[test]
fn replay_long_press_and_tap() {
    let replay = Scenario::from_json(LONG_PRESS).unwrap().run().unwrap();
    assert_eq!(replay.active_name(), Some("main"));

    let down = &replay.trace[1];
    assert_eq!(down.what, "down ArrowRight");
    assert_eq!(down.rate, Some(3.0));
    assert_eq!(down.toasts, vec!["Playing at 3x".to_string()]);

    let up = &replay.trace[2];
    assert_eq!(up.at, 1400);
    assert_eq!(up.rate, Some(1.0));
    assert_eq!(up.time, Some(30.0));

    let tap = &replay.trace[4];
    assert_eq!(tap.rate, Some(1.0));
    assert_eq!(tap.time, Some(35.0));

    // Outside the player container the key belongs to the page.
    let stray = &replay.trace[5];
    assert!(!stray.consumed);
    assert_eq!(stray.rate, Some(1.0));

    assert_eq!(replay.controller.target_rate(), 3.5);

    let rejected = replay.trace.last().unwrap();
    assert_eq!(rejected.toasts.len(), 1);
    assert!(rejected.toasts[0].starts_with("Enter a value between"));
    assert_eq!(replay.controller.settings().seek_step, 5.0);
}
