//! Dot-separated addresses into the namespace and into shelf records.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Returns true if `name` is a valid path segment: ASCII alphanumeric runs
/// joined by single underscores, e.g. `book_1`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('_')
            .all(|run| !run.is_empty() && run.bytes().all(|b| b.is_ascii_alphanumeric()))
}

/// An immutable sequence of segment names.
///
/// The empty path addresses the library root. Segments past a shelf index
/// into that shelf's nested record.
///
/// Paths order segment by segment, so an ancestor always sorts before its
/// descendants. Lock acquisition relies on this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The library root.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parses a dotted path such as `lib.book1.author`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for the empty string, empty segments, or
    /// segments that are not valid names.
    pub fn parse(input: &str) -> CoreResult<Self> {
        if input.is_empty() {
            return Err(CoreError::invalid_path(input, "path is empty"));
        }
        let segments = input
            .split('.')
            .map(|segment| {
                if segment.is_empty() {
                    Err(CoreError::invalid_path(input, "empty segment"))
                } else if !is_valid_name(segment) {
                    Err(CoreError::invalid_path(
                        input,
                        format!("segment {segment:?} is not a valid name"),
                    ))
                } else {
                    Ok(segment.to_string())
                }
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self { segments })
    }

    /// Builds a path from already-split segments.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if any segment is not a valid name.
    pub fn from_segments<I, S>(segments: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if let Some(bad) = segments.iter().find(|s| !is_valid_name(s)) {
            return Err(CoreError::invalid_path(
                segments.join("."),
                format!("segment {bad:?} is not a valid name"),
            ));
        }
        Ok(Self { segments })
    }

    pub(crate) fn from_trusted(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// The segments of this path.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the library root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True for the library root.
    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// Last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        self.segments
            .split_last()
            .map(|(_, rest)| Self::from_trusted(rest.to_vec()))
    }

    /// Appends one segment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if `name` is not a valid name.
    pub fn child(&self, name: &str) -> CoreResult<Path> {
        if !is_valid_name(name) {
            return Err(CoreError::invalid_path(
                name,
                "segment is not a valid name",
            ));
        }
        Ok(self.child_trusted(name))
    }

    pub(crate) fn child_trusted(&self, name: &str) -> Path {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self::from_trusted(segments)
    }

    /// Concatenates two paths.
    #[must_use]
    pub fn join(&self, other: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self::from_trusted(segments)
    }

    /// The first `n` segments.
    #[must_use]
    pub fn prefix(&self, n: usize) -> Path {
        Self::from_trusted(self.segments[..n.min(self.len())].to_vec())
    }

    /// Every strict ancestor, root first.
    pub fn ancestors(&self) -> Vec<Path> {
        (0..self.len()).map(|n| self.prefix(n)).collect()
    }

    /// True if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<library>")
        } else {
            f.write_str(&self.segments.join("."))
        }
    }
}

impl FromStr for Path {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.segments.join("."))
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Path::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_pattern() {
        assert!(is_valid_name("book1"));
        assert!(is_valid_name("first_edition_2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("_lead"));
        assert!(!is_valid_name("trail_"));
        assert!(!is_valid_name("double__under"));
        assert!(!is_valid_name("dash-ed"));
        assert!(!is_valid_name("*all"));
        assert!(!is_valid_name("bök"));
    }

    #[test]
    fn parse_splits_on_dots() {
        let path = Path::parse("lib.book1.author").unwrap();
        assert_eq!(path.segments(), ["lib", "book1", "author"]);
        assert_eq!(path.to_string(), "lib.book1.author");
        assert_eq!(path.name(), Some("author"));
    }

    #[test]
    fn parse_rejects_bad_input() {
        for input in ["", "lib..book", ".lib", "lib.", "lib.bo ok", "lib.*all"] {
            assert!(
                matches!(Path::parse(input), Err(CoreError::InvalidPath { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn parent_and_child() {
        let path = Path::parse("lib.book1").unwrap();
        assert_eq!(path.parent().unwrap(), Path::parse("lib").unwrap());
        assert_eq!(Path::parse("lib").unwrap().parent().unwrap(), Path::root());
        assert!(Path::root().parent().is_none());
        assert_eq!(
            Path::parse("lib").unwrap().child("book1").unwrap(),
            path
        );
        assert!(path.child("bad name").is_err());
    }

    #[test]
    fn ancestors_are_root_first() {
        let path = Path::parse("a.b.c").unwrap();
        let ancestors: Vec<String> = path
            .ancestors()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(ancestors, vec!["<library>", "a", "a.b"]);
    }

    #[test]
    fn ancestors_sort_before_descendants() {
        let mut paths = vec![
            Path::parse("lib.b").unwrap(),
            Path::parse("lib").unwrap(),
            Path::root(),
            Path::parse("lib.a.z").unwrap(),
            Path::parse("lib.a").unwrap(),
        ];
        paths.sort();
        let rendered: Vec<String> = paths.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["<library>", "lib", "lib.a", "lib.a.z", "lib.b"]);
    }

    #[test]
    fn starts_with_and_join() {
        let lib = Path::parse("lib").unwrap();
        let rel = Path::parse("fiction.book1").unwrap();
        let full = lib.join(&rel);
        assert_eq!(full.to_string(), "lib.fiction.book1");
        assert!(full.starts_with(&lib));
        assert!(full.starts_with(&Path::root()));
        assert!(!lib.starts_with(&full));
        assert_eq!(full.prefix(2).to_string(), "lib.fiction");
    }

    #[test]
    fn serde_as_dotted_string() {
        let path: Path = serde_json::from_str("\"lib.book1\"").unwrap();
        assert_eq!(path, Path::parse("lib.book1").unwrap());
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"lib.book1\"");
        assert!(serde_json::from_str::<Path>("\"lib..x\"").is_err());
    }
}
