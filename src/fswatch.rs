//! Filesystem watcher for the directories that make up the page.
//!
//! A background thread runs `notify` on the page's directories and forwards
//! video file creations and removals to the main loop, which turns them into
//! page mutations.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::page::{clean_path, is_video};

/// Events sent from the watcher thread to the main loop.
#[derive(Debug, PartialEq)]
pub enum FsEvent {
    Created(PathBuf),
    Removed(PathBuf),
}

/// Commands sent from the main thread to the watcher thread.
pub enum WatchCmd {
    Watch(PathBuf),
    Unwatch(PathBuf),
}

/// Handle to the running watcher. Drop to stop.
pub struct FsWatcher {
    quit: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
    cmd_tx: mpsc::Sender<WatchCmd>,
}

impl FsWatcher {
    pub fn start() -> std::io::Result<(Self, mpsc::Receiver<FsEvent>)> {
        let (tx, rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let quit = Arc::new(AtomicBool::new(false));
        let quit2 = quit.clone();

        let thread = std::thread::Builder::new()
            .name("fs-watcher".into())
            .spawn(move || run_watcher(tx, quit2, cmd_rx))?;

        Ok((
            FsWatcher {
                quit,
                thread: Some(thread),
                cmd_tx,
            },
            rx,
        ))
    }

    pub fn watch_dir(&self, dir: &Path) {
        self.cmd_tx.send(WatchCmd::Watch(dir.to_path_buf())).ok();
    }

    pub fn unwatch_dir(&self, dir: &Path) {
        self.cmd_tx.send(WatchCmd::Unwatch(dir.to_path_buf())).ok();
    }

    pub fn stop(&mut self) {
        self.quit.store(true, Ordering::Release);
        if let Some(t) = self.thread.take() {
            t.join().ok();
        }
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_watcher(tx: mpsc::Sender<FsEvent>, quit: Arc<AtomicBool>, cmd_rx: mpsc::Receiver<WatchCmd>) {
    let (ntx, nrx) = mpsc::channel();

    let mut watcher: RecommendedWatcher = match notify::recommended_watcher(move |res| {
        if let Ok(event) = res {
            ntx.send(event).ok();
        }
    }) {
        Ok(w) => w,
        Err(e) => {
            warn!("watcher: failed to create: {}", e);
            return;
        }
    };

    while !quit.load(Ordering::Relaxed) {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                WatchCmd::Watch(dir) => match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                    Ok(()) => debug!("watcher: +watch {}", dir.display()),
                    Err(e) => warn!("watcher: failed to watch {}: {}", dir.display(), e),
                },
                WatchCmd::Unwatch(dir) => match watcher.unwatch(&dir) {
                    Ok(()) => debug!("watcher: -watch {}", dir.display()),
                    Err(e) => warn!("watcher: failed to unwatch {}: {}", dir.display(), e),
                },
            }
        }

        match nrx.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => {
                for ev in translate(&event) {
                    if tx.send(ev).is_err() {
                        return;
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("watcher: stopped");
}

/// Video files touched by a notify event, as page-level events. Renames
/// arrive as a removal of the old name and a creation of the new one.
fn translate(event: &notify::Event) -> Vec<FsEvent> {
    use notify::event::{ModifyKind, RenameMode};

    let mut out = Vec::new();
    for (i, path) in event.paths.iter().enumerate() {
        // Removed files can't be stat'ed, so filter by extension.
        if !is_video(path) {
            continue;
        }
        let path = PathBuf::from(clean_path(&path.to_string_lossy()));
        let ev = match event.kind {
            EventKind::Create(_) => FsEvent::Created(path),
            EventKind::Remove(_) => FsEvent::Removed(path),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FsEvent::Removed(path),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => FsEvent::Created(path),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if i == 0 => {
                FsEvent::Removed(path)
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => FsEvent::Created(path),
            EventKind::Modify(ModifyKind::Name(_)) if path.exists() => FsEvent::Created(path),
            EventKind::Modify(ModifyKind::Name(_)) => FsEvent::Removed(path),
            _ => continue,
        };
        out.push(ev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        paths
            .iter()
            .fold(notify::Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn create_and_remove_of_videos() {
        let ev = event(EventKind::Create(CreateKind::File), &["/v/a.mp4", "/v/a.txt"]);
        assert_eq!(translate(&ev), vec![FsEvent::Created("/v/a.mp4".into())]);

        let ev = event(EventKind::Remove(RemoveKind::File), &["/v/b.mkv"]);
        assert_eq!(translate(&ev), vec![FsEvent::Removed("/v/b.mkv".into())]);
    }

    #[test]
    fn rename_both_is_remove_then_create() {
        let ev = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/v/old.mp4", "/v/new.mp4"],
        );
        assert_eq!(
            translate(&ev),
            vec![
                FsEvent::Removed("/v/old.mp4".into()),
                FsEvent::Created("/v/new.mp4".into()),
            ]
        );
    }

    #[test]
    fn content_modifications_are_ignored() {
        let ev = event(
            EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content)),
            &["/v/a.mp4"],
        );
        assert!(translate(&ev).is_empty());
    }

    #[test]
    fn dynamic_watch_detects_new_video() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();

        let (watcher, rx) = FsWatcher::start().unwrap();
        watcher.watch_dir(&root);
        std::thread::sleep(Duration::from_millis(300));

        std::fs::write(root.join("new.mp4"), b"fake").unwrap();

        let mut got = false;
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            if let Ok(FsEvent::Created(p)) = rx.recv_timeout(Duration::from_millis(100)) {
                if p.file_name().is_some_and(|n| n == "new.mp4") {
                    got = true;
                    break;
                }
            }
        }
        assert!(got, "should receive Created for a new video");
    }

    #[test]
    fn dynamic_watch_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, rx) = FsWatcher::start().unwrap();
        watcher.watch_dir(dir.path());
        std::thread::sleep(Duration::from_millis(300));

        std::fs::write(dir.path().join("readme.txt"), b"hello").unwrap();
        std::thread::sleep(Duration::from_millis(500));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn watcher_stop_is_clean() {
        let (mut watcher, _rx) = FsWatcher::start().unwrap();
        watcher.watch_dir(Path::new("/nonexistent/path/12345"));
        watcher.unwatch_dir(Path::new("/nonexistent/path/12345"));
        watcher.stop();
    }
}
