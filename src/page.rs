//! Page built from files and directories on disk.
//!
//! Each video file argument becomes a `<video>` under the body. Each directory
//! argument becomes a same-origin `<iframe>` whose content holds the videos
//! found directly inside it; those are the directories the filesystem watcher
//! follows.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use vspeed::dom::{Document, NodeId, ReadyState};

pub const VIDEO_EXTS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "webm", "flv", "wmv", "m4v", "3gp",
];

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Strip Windows extended-length path prefix (`\\?\`) if present.
pub fn clean_path(p: &str) -> String {
    p.strip_prefix(r"\\?\").unwrap_or(p).to_string()
}

fn resolve(path: &Path) -> PathBuf {
    let abs = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    PathBuf::from(clean_path(&abs.to_string_lossy()))
}

/// Layout size for videos mpv has not measured yet. Only the active video is
/// loaded, so the others keep this until they are picked.
const PLACEHOLDER_SIZE: (u32, u32) = (320, 180);

pub struct Page {
    pub doc: Document,
    videos: HashMap<NodeId, PathBuf>,
    /// Directory → frame body holding its videos.
    dirs: Vec<(PathBuf, NodeId)>,
}

impl Page {
    /// `origin` overrides the page origin, e.g. to try a site profile on
    /// local files. Defaults to `file://`.
    pub fn open(paths: &[PathBuf], origin: Option<&str>) -> Page {
        let resolved: Vec<PathBuf> = paths.iter().map(|p| resolve(p)).collect();
        let first = resolved
            .first()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let url = match origin {
            Some(o) => format!("{}/{}", o.trim_end_matches('/'), first.trim_start_matches('/')),
            None => format!("file://{}", first),
        };

        let mut page = Page {
            doc: Document::new(&url),
            videos: HashMap::new(),
            dirs: Vec::new(),
        };
        let body = page.doc.body();
        for path in &resolved {
            if path.is_dir() {
                page.add_dir(body, path);
            } else if path.is_file() && is_video(path) {
                page.add_video(body, path);
            } else {
                warn!("page: skipping {}", path.display());
            }
        }
        // Construction is not a page change.
        page.doc.take_mutations();
        debug!(
            "page: {} ({} videos, {} dirs)",
            page.doc.url(),
            page.videos.len(),
            page.dirs.len()
        );
        page
    }

    fn add_dir(&mut self, parent: NodeId, dir: &Path) {
        let iframe = self.doc.create_element("iframe");
        self.doc.set_attr(iframe, "src", &dir.to_string_lossy());
        self.doc.append_child(parent, iframe);
        let Some(frame_body) = self.doc.attach_frame(iframe, None) else {
            return;
        };
        self.dirs.push((dir.to_path_buf(), frame_body));

        let files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_video(p))
            .collect();
        for file in &files {
            self.add_video(frame_body, file);
        }
    }

    fn add_video(&mut self, parent: NodeId, path: &Path) -> NodeId {
        let video = self.doc.create_element("video");
        self.doc.set_attr(video, "src", &path.to_string_lossy());
        self.doc.observe_media(video, |m| {
            m.has_source = true;
            m.ready_state = ReadyState::HaveMetadata;
            (m.width, m.height) = PLACEHOLDER_SIZE;
        });
        self.doc.append_child(parent, video);
        self.videos.insert(video, path.to_path_buf());
        video
    }

    /// Directories whose contents are part of the page.
    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(|(d, _)| d.as_path())
    }

    pub fn path_of(&self, video: NodeId) -> Option<&Path> {
        self.videos.get(&video).map(|p| p.as_path())
    }

    pub fn video_at(&self, path: &Path) -> Option<NodeId> {
        self.videos
            .iter()
            .find(|(_, p)| p.as_path() == path)
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    /// A file appeared in a watched directory. Records an `Added` mutation.
    pub fn file_created(&mut self, path: &Path) -> Option<NodeId> {
        if !is_video(path) || self.video_at(path).is_some() {
            return None;
        }
        let dir = path.parent()?;
        let frame_body = self.dirs.iter().find(|(d, _)| d == dir).map(|(_, b)| *b)?;
        Some(self.add_video(frame_body, path))
    }

    /// A file disappeared. Records a `Removed` mutation.
    pub fn file_removed(&mut self, path: &Path) -> bool {
        let Some(video) = self.video_at(path) else {
            return false;
        };
        self.videos.remove(&video);
        !self.doc.remove(video).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vspeed::dom::MutationRecord;
    use vspeed::scanner::{scan, ScanLimits};

    #[test]
    fn is_video_by_extension() {
        assert!(is_video(Path::new("/a/clip.mp4")));
        assert!(is_video(Path::new("/a/clip.MKV")));
        assert!(!is_video(Path::new("/a/photo.jpg")));
        assert!(!is_video(Path::new("/a/noext")));
    }

    #[test]
    fn clean_path_strips_verbatim_prefix() {
        assert_eq!(clean_path(r"\\?\C:\videos"), r"C:\videos");
        assert_eq!(clean_path("/home/v"), "/home/v");
    }

    #[test]
    fn directories_become_frames() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("a.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let page = Page::open(&[dir.path().to_path_buf()], None);
        assert_eq!(page.doc.origin(), "file://");
        assert_eq!(page.len(), 2);
        assert_eq!(page.dirs().count(), 1);

        let found = scan(&page.doc, ScanLimits::default());
        assert_eq!(found.candidates.len(), 2);
        assert!(found.candidates.iter().all(|c| c.is_valid()));
        let first = page.path_of(found.candidates[0].node).unwrap();
        assert_eq!(first.file_name().unwrap(), "a.webm");
    }

    #[test]
    fn origin_override() {
        let dir = tempfile::tempdir().unwrap();
        let page = Page::open(&[dir.path().to_path_buf()], Some("https://www.youtube.com"));
        assert_eq!(page.doc.origin(), "https://www.youtube.com");
    }

    #[test]
    fn created_and_removed_files_are_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = Page::open(&[dir.path().to_path_buf()], None);
        assert!(!page.doc.has_pending_mutations());

        let root = page.dirs().next().unwrap().to_path_buf();
        let file = root.join("new.mp4");
        let video = page.file_created(&file).unwrap();
        assert!(page.file_created(&file).is_none());
        assert!(page.file_created(&root.join("new.txt")).is_none());
        assert_eq!(
            page.doc.take_mutations(),
            vec![MutationRecord::Added { node: video }]
        );

        assert!(page.file_removed(&file));
        assert!(!page.doc.contains(video));
        match page.doc.take_mutations().as_slice() {
            [MutationRecord::Removed { had_video, .. }] => assert!(*had_video),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!page.file_removed(&file));
    }

    #[test]
    fn files_outside_watched_dirs_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = Page::open(&[dir.path().to_path_buf()], None);
        assert!(page.file_created(Path::new("/elsewhere/x.mp4")).is_none());
    }
}
