//! Keyboard playback control for video pages.
//!
//! The library is host-agnostic: an in-memory page model ([`dom`]), the
//! discovery and selection machinery, the long-press key machine and a
//! [`controller::Controller`] tying them together. Hosts feed it events and
//! a monotonic clock, then mirror the document's command outbox onto a real
//! player.

pub mod commands;
pub mod controller;
pub mod db;
pub mod dom;
pub mod error;
pub mod keys;
pub mod press;
pub mod scanner;
pub mod scenario;
pub mod selection;
pub mod settings;
pub mod site;
pub mod timers;
pub mod toast;
pub mod watcher;

pub use controller::{Controller, Event};
pub use error::{Error, Result};
