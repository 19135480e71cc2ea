//! Property path parsing.
//!
//! Paths look like `order.lines[0].product['sku.code']`: dot-separated
//! property names, each optionally followed by bracketed list indexes or
//! map keys. Quoted keys may contain dots and brackets.

use crate::error::ReflectionError;

/// One step of a property path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'p> {
    /// A named property (`name`).
    Property(&'p str),
    /// A bracketed index or key, quotes removed (`[0]`, `['key']`).
    Index(&'p str),
}

impl Segment<'_> {
    /// The property name or key text.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Property(name) | Self::Index(name) => name,
        }
    }
}

/// A parsed property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath<'p> {
    source: &'p str,
    // Each segment with the byte offset where it ends in `source`.
    segments: Vec<(Segment<'p>, usize)>,
}

impl<'p> PropertyPath<'p> {
    /// Parse a property path.
    pub fn parse(source: &'p str) -> Result<Self, ReflectionError> {
        let invalid = |reason| ReflectionError::InvalidPath {
            path: source.to_string(),
            reason,
        };

        if source.is_empty() {
            return Err(invalid("empty path"));
        }

        let bytes = source.as_bytes();
        let mut segments = Vec::new();
        let mut pos = 0;
        let mut expect_name = !source.starts_with('[');

        while pos < bytes.len() {
            if expect_name {
                let start = pos;
                while pos < bytes.len() && bytes[pos] != b'.' && bytes[pos] != b'[' {
                    if bytes[pos] == b']' {
                        return Err(invalid("unexpected ']'"));
                    }
                    pos += 1;
                }
                if start == pos {
                    return Err(invalid("empty property name"));
                }
                segments.push((Segment::Property(&source[start..pos]), pos));
                expect_name = false;
                continue;
            }

            match bytes[pos] {
                b'.' => {
                    pos += 1;
                    if pos == bytes.len() {
                        return Err(invalid("trailing '.'"));
                    }
                    expect_name = true;
                }
                b'[' => {
                    let (key, end) = parse_index(source, pos + 1).map_err(invalid)?;
                    segments.push((Segment::Index(key), end));
                    pos = end;
                }
                _ => return Err(invalid("expected '.' or '[' after ']'")),
            }
        }

        Ok(Self { source, segments })
    }

    /// The original path text.
    #[must_use]
    pub fn as_str(&self) -> &'p str {
        self.source
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check for a path without segments. Parsed paths always have one.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The segments in order.
    pub fn segments(&self) -> impl ExactSizeIterator<Item = Segment<'p>> + '_ {
        self.segments.iter().map(|(segment, _)| *segment)
    }

    /// The segment at `index`.
    #[must_use]
    pub fn segment(&self, index: usize) -> Option<Segment<'p>> {
        self.segments.get(index).map(|(segment, _)| *segment)
    }

    /// Path text up to and including segment `index`.
    #[must_use]
    pub fn prefix(&self, index: usize) -> &'p str {
        self.segments
            .get(index)
            .map_or(self.source, |(_, end)| &self.source[..*end])
    }

    /// Root property name and the remainder of the path, which starts with
    /// `.` or `[` or is empty. Returns `None` for paths starting with an index.
    #[must_use]
    pub fn split_root(&self) -> Option<(&'p str, &'p str)> {
        match self.segments.first() {
            Some((Segment::Property(name), end)) => Some((*name, &self.source[*end..])),
            _ => None,
        }
    }
}

// Parse the body of a bracket starting at `start` (just after `[`).
// Returns the key and the offset just past the closing `]`.
fn parse_index(source: &str, start: usize) -> Result<(&str, usize), &'static str> {
    let bytes = source.as_bytes();
    match bytes.get(start) {
        Some(&(quote @ (b'\'' | b'"'))) => {
            let body_start = start + 1;
            let close = source[body_start..]
                .find(quote as char)
                .map(|i| body_start + i)
                .ok_or("unterminated quoted key")?;
            if bytes.get(close + 1) != Some(&b']') {
                return Err("expected ']' after quoted key");
            }
            Ok((&source[body_start..close], close + 2))
        }
        Some(_) => {
            let close = source[start..]
                .find(']')
                .map(|i| start + i)
                .ok_or("unterminated '['")?;
            let key = source[start..close].trim();
            if key.is_empty() {
                return Err("empty index");
            }
            if key.contains('[') {
                return Err("nested '['");
            }
            Ok((key, close + 1))
        }
        None => Err("unterminated '['"),
    }
}

/// Parse a list index.
pub(crate) fn list_index(key: &str) -> Result<usize, ReflectionError> {
    key.parse::<usize>()
        .map_err(|_| ReflectionError::InvalidIndex(key.to_string()))
}
