//! JSON Pointer handling (RFC 6901) and instance pointer steps.

use std::fmt;

/// Absolute pointer into a schema document, stored as unescaped segments.
///
/// The root pointer has no segments and displays as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPointer {
    segments: Vec<String>,
}

impl JsonPointer {
    /// The document root.
    pub fn root() -> Self {
        JsonPointer::default()
    }

    /// Parse a pointer string (`""` or `"/a/b/0"`).
    ///
    /// Returns `None` for malformed pointers that are non-empty but do not
    /// start with `/`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return Some(JsonPointer::root());
        }
        if !s.starts_with('/') {
            return None;
        }
        let segments = s.split('/').skip(1).map(unescape_segment).collect();
        Some(JsonPointer { segments })
    }

    /// Pointer one level deeper.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        JsonPointer { segments }
    }

    /// Pointer one level up, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(JsonPointer { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True if `self` starts with all of `prefix`'s segments.
    pub fn starts_with(&self, prefix: &JsonPointer) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", escape_segment(segment))?;
        }
        Ok(())
    }
}

/// Unescape a single pointer segment (`~1` then `~0`, per RFC 6901).
pub(crate) fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

pub(crate) fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// A single step of an instance position: an object property or array index.
///
/// Step sequences are produced by whatever walks the instance document; the
/// engine only ever sees this representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PointerStep {
    Property(String),
    Index(usize),
}

impl PointerStep {
    pub fn property(name: impl Into<String>) -> Self {
        PointerStep::Property(name.into())
    }

    pub fn index(index: usize) -> Self {
        PointerStep::Index(index)
    }
}

impl fmt::Display for PointerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerStep::Property(name) => write!(f, "{}", name),
            PointerStep::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Convert an instance JSON Pointer into the step sequence the engine expects.
///
/// All-digit segments become array-index steps; everything else is a property
/// step. Returns `None` for non-empty input not starting with `/`.
pub fn parse_pointer_steps(path: &str) -> Option<Vec<PointerStep>> {
    let pointer = JsonPointer::parse(path)?;
    let steps = pointer
        .segments()
        .iter()
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) => PointerStep::Index(index),
            Err(_) => PointerStep::Property(segment.clone()),
        })
        .collect();
    Some(steps)
}

/// Render steps back into a display pointer, for messages.
pub fn steps_to_pointer(steps: &[PointerStep]) -> String {
    let mut out = String::new();
    for step in steps {
        out.push('/');
        match step {
            PointerStep::Property(name) => out.push_str(&escape_segment(name)),
            PointerStep::Index(index) => out.push_str(&index.to_string()),
        }
    }
    out
}
