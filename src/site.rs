//! Per-site behaviour and the origin allow-list.
//!
//! A [`SiteProfile`] is chosen once per page from its origin. It carries the
//! main-video rule used to break ties between several valid candidates, the
//! element keystrokes must land in, and the site's own fullscreen buttons.

use std::collections::BTreeSet;

use crate::dom::{Document, NodeId, Selector};
use crate::scanner::VideoCandidate;

/// Hosts that are always enabled (the host itself and its subdomains).
const BUILTIN_HOSTS: &[&str] = &["youtube.com", "bilibili.com"];

#[derive(Clone, Debug, PartialEq)]
pub enum SitePredicate {
    /// Rendered width strictly greater than this many pixels.
    MinWidth(u32),
}

impl SitePredicate {
    fn test(&self, c: &VideoCandidate) -> bool {
        match self {
            SitePredicate::MinWidth(px) => c.width > *px,
        }
    }
}

/// How to single out the main video among several valid candidates.
#[derive(Clone, Debug, PartialEq)]
pub enum SiteRule {
    Predicate(SitePredicate),
    /// Tried in order; the first selector matching a candidate wins.
    Selector(Vec<Selector>),
    Default,
}

impl SiteRule {
    /// The main video among `valid`, if the rule identifies one.
    pub fn pick(&self, doc: &Document, valid: &[VideoCandidate]) -> Option<NodeId> {
        match self {
            SiteRule::Predicate(p) => valid.iter().find(|c| p.test(c)).map(|c| c.node),
            SiteRule::Selector(selectors) => selectors.iter().find_map(|s| {
                valid
                    .iter()
                    .find(|c| s.matches(doc, c.node))
                    .map(|c| c.node)
            }),
            SiteRule::Default => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SiteProfile {
    pub name: &'static str,
    pub rule: SiteRule,
    /// When non-empty, keys only count if their target sits inside the first
    /// matching container. No container on the page means no keys.
    pub key_scope: Vec<Selector>,
    pub fullscreen_buttons: Vec<Selector>,
}

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

/// Lower-cased host of an origin, without port.
pub fn host_of(origin: &str) -> &str {
    let rest = origin.split_once("://").map_or(origin, |(_, r)| r);
    let rest = rest.split('/').next().unwrap_or(rest);
    rest.rsplit_once(':').map_or(rest, |(h, port)| {
        if port.chars().all(|c| c.is_ascii_digit()) {
            h
        } else {
            rest
        }
    })
}

fn host_matches(host: &str, domain: &str) -> bool {
    host.eq_ignore_ascii_case(domain)
        || host
            .to_ascii_lowercase()
            .ends_with(&format!(".{}", domain))
}

impl SiteProfile {
    pub fn youtube() -> Self {
        SiteProfile {
            name: "youtube",
            rule: SiteRule::Selector(selectors(&[
                ".html5-main-video",
                "video.video-stream",
                ".html5-video-player video",
            ])),
            key_scope: selectors(&[".html5-video-player", "#movie_player"]),
            fullscreen_buttons: selectors(&[
                ".ytp-fullscreen-button",
                r#"[data-title-no-tooltip="全屏"]"#,
                r#"[aria-keyshortcuts="f"]"#,
                r#"[data-title-no-tooltip="全屏 (f)"]"#,
            ]),
        }
    }

    pub fn bilibili() -> Self {
        SiteProfile {
            name: "bilibili",
            rule: SiteRule::Predicate(SitePredicate::MinWidth(400)),
            key_scope: Vec::new(),
            fullscreen_buttons: selectors(&[
                ".bpx-player-ctrl-full",
                r#"[aria-label="全屏"]"#,
                ".bilibili-player-video-btn-fullscreen",
            ]),
        }
    }

    pub fn generic() -> Self {
        SiteProfile {
            name: "generic",
            rule: SiteRule::Default,
            key_scope: Vec::new(),
            fullscreen_buttons: Vec::new(),
        }
    }

    pub fn for_origin(origin: &str) -> Self {
        let host = host_of(origin);
        if host_matches(host, "youtube.com") {
            SiteProfile::youtube()
        } else if host_matches(host, "bilibili.com") {
            SiteProfile::bilibili()
        } else {
            SiteProfile::generic()
        }
    }

    /// Whether a key event targeting `target` is ours to handle.
    pub fn key_in_scope(&self, doc: &Document, target: Option<NodeId>) -> bool {
        if self.key_scope.is_empty() {
            return true;
        }
        let Some(container) = doc.query_any(doc.body(), &self.key_scope) else {
            return false;
        };
        target.is_some_and(|t| doc.is_inclusive_ancestor(container, t))
    }

    /// The site's own fullscreen control, if present on the page.
    pub fn fullscreen_button(&self, doc: &Document) -> Option<NodeId> {
        doc.query_any(doc.body(), &self.fullscreen_buttons)
    }
}

/// Origins the controller may attach to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowList {
    opted_in: BTreeSet<String>,
}

/// Canonical form used as the allow-list key.
pub fn normalize_origin(origin: &str) -> String {
    crate::dom::origin_of(origin.trim())
}

impl AllowList {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        AllowList {
            opted_in: origins
                .into_iter()
                .map(|o| normalize_origin(o.as_ref()))
                .collect(),
        }
    }

    /// Always-on hosts, local documents, then explicit opt-ins.
    pub fn is_enabled_for_origin(&self, origin: &str) -> bool {
        let origin = normalize_origin(origin);
        if origin == "file://" {
            return true;
        }
        let host = host_of(&origin);
        if BUILTIN_HOSTS.iter().any(|d| host_matches(host, d)) {
            return true;
        }
        self.opted_in.contains(&origin)
    }

    pub fn is_builtin(origin: &str) -> bool {
        let origin = normalize_origin(origin);
        BUILTIN_HOSTS
            .iter()
            .any(|d| host_matches(host_of(&origin), d))
    }

    pub fn allow(&mut self, origin: &str) -> bool {
        self.opted_in.insert(normalize_origin(origin))
    }

    pub fn deny(&mut self, origin: &str) -> bool {
        self.opted_in.remove(&normalize_origin(origin))
    }

    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.opted_in.iter().map(String::as_str)
    }
}
