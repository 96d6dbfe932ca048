//! Marker-based shader templates.
//!
//! A template is WGSL text with insertion points of the form
//! `//TANDEM::<Group>::<Kind>`, e.g. `//TANDEM::Normal::Impl`. [`ShaderCode`]
//! keeps the text split into literal segments and pending markers so that
//! substituting is a splice rather than a string scan, and a replacement may
//! itself contain markers for later contributors to fill in. Markers still
//! pending when the code is finalized are dropped.

/// Prefix every marker starts with.
pub const MARKER_PREFIX: &str = "//TANDEM::";

/// A `Group::Kind` insertion point.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Marker {
    group: String,
    kind: String,
}

impl Marker {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// Parses `Group::Kind` or `//TANDEM::Group::Kind`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.strip_prefix(MARKER_PREFIX).unwrap_or(name);
        let (group, kind) = name.split_once("::")?;
        if !is_ident(group) || !is_ident(kind) {
            return None;
        }
        Some(Self::new(group, kind))
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// `Group::Kind`
    pub fn name(&self) -> String {
        format!("{}::{}", self.group, self.kind)
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}::{}", MARKER_PREFIX, self.group, self.kind)
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn ident_len(s: &str) -> usize {
    s.char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    Marker(Marker),
}

/// Shader source as an ordered list of text and pending markers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderCode {
    segments: Vec<Segment>,
}

impl ShaderCode {
    pub fn parse(source: &str) -> Self {
        Self {
            segments: parse_segments(source),
        }
    }

    /// Replaces the first (or every) occurrence of `marker` with the
    /// newline-joined `lines`. Returns whether anything was replaced.
    ///
    /// `marker` may be given as `Group::Kind` or with the full prefix.
    pub fn substitute<S: AsRef<str>>(&mut self, marker: &str, lines: &[S], all: bool) -> bool {
        let Some(target) = Marker::parse(marker) else {
            log::warn!("'{}' is not a shader marker", marker);
            return false;
        };
        let replacement = join_lines(lines);
        let mut replaced = false;
        let mut out = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            match segment {
                Segment::Marker(m) if m == target && (all || !replaced) => {
                    out.extend(parse_segments(&replacement));
                    replaced = true;
                }
                other => out.push(other),
            }
        }
        self.segments = out;
        if replaced {
            self.merge_text();
        }
        replaced
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        match Marker::parse(marker) {
            Some(target) => self.markers().any(|m| *m == target),
            None => false,
        }
    }

    /// Pending markers in source order.
    pub fn markers(&self) -> impl Iterator<Item = &Marker> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Marker(m) => Some(m),
            Segment::Text(_) => None,
        })
    }

    /// Unique pending marker groups in order of first appearance.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for marker in self.markers() {
            if !groups.iter().any(|g| g == marker.group()) {
                groups.push(marker.group().to_string());
            }
        }
        groups
    }

    /// Source with markers still rendered, for debugging.
    pub fn source(&self) -> String {
        self.render(true)
    }

    /// Final source. Unresolved markers are dropped.
    pub fn finalize(&self) -> String {
        let pending: Vec<String> = self.markers().map(Marker::name).collect();
        if !pending.is_empty() {
            log::trace!("dropping unresolved shader markers: {}", pending.join(", "));
        }
        self.render(false)
    }

    fn render(&self, with_markers: bool) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Marker(m) if with_markers => out.push_str(&m.to_string()),
                Segment::Marker(_) => {}
            }
        }
        out
    }

    fn merge_text(&mut self) {
        let mut merged: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            if let Segment::Text(next) = &segment {
                if let Some(Segment::Text(prev)) = merged.last_mut() {
                    prev.push_str(next);
                    continue;
                }
            }
            merged.push(segment);
        }
        self.segments = merged;
    }
}

fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines.iter().map(|l| l.as_ref()).collect::<Vec<_>>().join("\n")
}

fn parse_segments(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut rest = source;
    while let Some(start) = rest.find(MARKER_PREFIX) {
        let after = &rest[start + MARKER_PREFIX.len()..];
        let group_len = ident_len(after);
        let parsed = if group_len > 0 && after[group_len..].starts_with("::") {
            let kind_start = group_len + 2;
            let kind_len = ident_len(&after[kind_start..]);
            (kind_len > 0).then(|| {
                let marker = Marker::new(&after[..group_len], &after[kind_start..kind_start + kind_len]);
                (marker, MARKER_PREFIX.len() + kind_start + kind_len)
            })
        } else {
            None
        };
        match parsed {
            Some((marker, len)) => {
                text.push_str(&rest[..start]);
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Marker(marker));
                rest = &rest[start + len..];
            }
            None => {
                // Not a marker; keep the prefix as plain text.
                text.push_str(&rest[..start + MARKER_PREFIX.len()]);
                rest = &rest[start + MARKER_PREFIX.len()..];
            }
        }
    }
    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

/// Result of the string-level [`substitute`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Substitution {
    pub replaced: bool,
    pub result: String,
}

/// Substitutes `search` in plain source text, keeping unresolved markers.
pub fn substitute<S: AsRef<str>>(source: &str, search: &str, replace: &[S], all: bool) -> Substitution {
    let mut code = ShaderCode::parse(source);
    let replaced = code.substitute(search, replace, all);
    Substitution {
        replaced,
        result: code.source(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "fn main() {\n  //TANDEM::Color::Impl\n  //TANDEM::Normal::Impl\n  //TANDEM::Color::Impl\n}\n";

    #[test]
    fn test_parse_finds_markers_in_order() {
        let code = ShaderCode::parse(SOURCE);
        let names: Vec<String> = code.markers().map(Marker::name).collect();
        assert_eq!(names, ["Color::Impl", "Normal::Impl", "Color::Impl"]);
        assert_eq!(code.groups(), ["Color", "Normal"]);
        assert_eq!(code.source(), SOURCE);
    }

    #[test]
    fn test_substitute_first_or_all() {
        let mut first = ShaderCode::parse(SOURCE);
        assert!(first.substitute("Color::Impl", &["a = 1;"], false));
        assert_eq!(first.markers().filter(|m| m.group() == "Color").count(), 1);

        let mut all = ShaderCode::parse(SOURCE);
        assert!(all.substitute("//TANDEM::Color::Impl", &["a = 1;"], true));
        assert!(!all.has_marker("Color::Impl"));
        assert_eq!(all.finalize().matches("a = 1;").count(), 2);
    }

    #[test]
    fn test_replacement_may_introduce_markers() {
        let mut code = ShaderCode::parse(SOURCE);
        code.substitute("Normal::Impl", &["//TANDEM::Extra::Impl", "n = 2;"], true);
        assert!(code.has_marker("Extra::Impl"));
        assert!(code.substitute("Extra::Impl", &["e = 3;"], true));
        let out = code.finalize();
        assert!(out.contains("e = 3;\nn = 2;"));
    }

    #[test]
    fn test_finalize_drops_unresolved_markers() {
        let code = ShaderCode::parse(SOURCE);
        let out = code.finalize();
        assert!(!out.contains("TANDEM"));
        assert!(out.starts_with("fn main() {"));
    }

    #[test]
    fn test_missing_marker_is_not_replaced() {
        let mut code = ShaderCode::parse(SOURCE);
        assert!(!code.substitute("Light::Impl", &["x"], true));
        assert!(!code.substitute("not a marker", &["x"], true));
        assert_eq!(code.source(), SOURCE);
    }

    #[test]
    fn test_prefix_without_kind_stays_text() {
        let code = ShaderCode::parse("//TANDEM::Broken\n//TANDEM::Ok::Dec");
        assert_eq!(code.markers().count(), 1);
        assert_eq!(code.finalize(), "//TANDEM::Broken\n");
    }

    #[test]
    fn test_string_substitute() {
        let result = substitute(SOURCE, "Normal::Impl", &["n = 1;"], true);
        assert!(result.replaced);
        assert!(result.result.contains("n = 1;"));
        assert!(result.result.contains("//TANDEM::Color::Impl"));
    }
}
