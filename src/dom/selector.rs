//! The CSS subset site rules need: type, `#id`, `.class`, `[attr]`,
//! `[attr="value"]`, compounds of those, and the descendant combinator.

use std::fmt;
use std::str::FromStr;

use super::{Document, NodeId};
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
struct AttrTest {
    name: String,
    value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if doc.tag(node).map_or(true, |t| !t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if doc.element_id(node) != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| doc.has_class(node, c)) {
            return false;
        }
        self.attrs.iter().all(|a| match (&a.value, doc.attr(node, &a.name)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(want), Some(got)) => want == got,
        })
    }
}

/// A parsed selector. Compounds are stored outermost first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    source: String,
    parts: Vec<Compound>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let bad = || Error::InvalidSelector(source.to_string());
        let parts = split_compounds(source)
            .ok_or_else(bad)?
            .into_iter()
            .map(|s| parse_compound(&s).ok_or_else(bad))
            .collect::<Result<Vec<_>>>()?;
        if parts.is_empty() {
            return Err(bad());
        }
        Ok(Selector {
            source: source.trim().to_string(),
            parts,
        })
    }

    /// Whether `node` matches. Ancestor compounds are resolved within the
    /// node's own tree (shadow and frame boundaries are not crossed).
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some((subject, ancestors)) = self.parts.split_last() else {
            return false;
        };
        if !subject.matches(doc, node) {
            return false;
        }
        let mut cursor = doc.parent(node);
        for part in ancestors.iter().rev() {
            loop {
                match cursor {
                    None => return false,
                    Some(n) => {
                        cursor = doc.parent(n);
                        if part.matches(doc, n) {
                            break;
                        }
                    }
                }
            }
        }
        true
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split on whitespace that sits outside `[...]` and quotes.
fn split_compounds(source: &str) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_brackets = false;
    let mut quote: Option<char> = None;
    for c in source.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                cur.push(c);
            }
            (Some(_), c) => cur.push(c),
            (None, '"' | '\'') if in_brackets => {
                quote = Some(c);
                cur.push(c);
            }
            (None, '[') if !in_brackets => {
                in_brackets = true;
                cur.push(c);
            }
            (None, ']') if in_brackets => {
                in_brackets = false;
                cur.push(c);
            }
            (None, c) if c.is_whitespace() && !in_brackets => {
                if !cur.is_empty() {
                    out.push(std::mem::take(&mut cur));
                }
            }
            (None, c) => cur.push(c),
        }
    }
    if in_brackets || quote.is_some() {
        return None;
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    Some(out)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut s = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        s.push(c);
        chars.next();
    }
    (!s.is_empty()).then_some(s)
}

fn parse_compound(s: &str) -> Option<Compound> {
    let mut out = Compound::default();
    let mut chars = s.chars().peekable();

    match chars.peek() {
        Some('*') => {
            chars.next();
        }
        Some(&c) if is_ident_char(c) => out.tag = take_ident(&mut chars),
        _ => {}
    }

    while let Some(c) = chars.next() {
        match c {
            '#' => out.id = Some(take_ident(&mut chars)?),
            '.' => out.classes.push(take_ident(&mut chars)?),
            '[' => {
                let mut body = String::new();
                let mut quote: Option<char> = None;
                loop {
                    let c = chars.next()?;
                    match (quote, c) {
                        (None, ']') => break,
                        (None, '"' | '\'') => quote = Some(c),
                        (Some(q), c) if c == q => quote = None,
                        _ => body.push(c),
                    }
                }
                let (name, value) = match body.split_once('=') {
                    Some((n, v)) => (n.trim().to_string(), Some(v.to_string())),
                    None => (body.trim().to_string(), None),
                };
                if name.is_empty() || !name.chars().all(is_ident_char) {
                    return None;
                }
                out.attrs.push(AttrTest { name, value });
            }
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    #[test]
    fn parses_compounds_and_descendants() {
        assert_eq!(sel(".html5-video-player video").parts.len(), 2);
        let s = sel("video.video-stream");
        assert_eq!(s.parts[0].tag.as_deref(), Some("video"));
        assert_eq!(s.parts[0].classes, vec!["video-stream".to_string()]);
    }

    #[test]
    fn attribute_value_may_contain_spaces() {
        let s = sel(r#"[data-title-no-tooltip="全屏 (f)"]"#);
        assert_eq!(s.parts.len(), 1);
        assert_eq!(s.parts[0].attrs[0].value.as_deref(), Some("全屏 (f)"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("[unterminated").is_err());
        assert!(Selector::parse("a > b").is_err());
    }

    #[test]
    fn matches_descendant_within_tree() {
        let mut doc = Document::new("https://www.youtube.com/watch?v=x");
        let player = doc.create_element("div");
        doc.add_class(player, "html5-video-player");
        let wrapper = doc.create_element("div");
        let video = doc.create_element("video");
        doc.append_child(doc.body(), player);
        doc.append_child(player, wrapper);
        doc.append_child(wrapper, video);

        assert!(sel(".html5-video-player video").matches(&doc, video));
        assert!(sel("body video").matches(&doc, video));
        assert!(!sel(".other video").matches(&doc, video));
        assert!(!sel(".html5-video-player video").matches(&doc, wrapper));
    }

    #[test]
    fn matches_attributes() {
        let mut doc = Document::new("https://www.bilibili.com/video/BV1");
        let btn = doc.create_element("button");
        doc.set_attr(btn, "aria-label", "全屏");
        doc.append_child(doc.body(), btn);
        assert!(sel(r#"[aria-label="全屏"]"#).matches(&doc, btn));
        assert!(sel("[aria-label]").matches(&doc, btn));
        assert!(!sel(r#"[aria-label="x"]"#).matches(&doc, btn));
    }
}
