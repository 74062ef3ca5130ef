//! Path expressions for nested config keys
//!
//! Parses keys like `db.port`, `servers[0].host` and `tags["team.name"]`
//! into segments. The first segment is always a map key and names the
//! top-level config entry; it may carry a `namespace:` prefix.

use crate::error::{Result, StrataError};
use std::fmt;

/// One step in a config path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Map field, from `.name` or `["name"]`
    Key(String),
    /// List element, from `[n]`
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    segments: Vec<PathSegment>,
}

impl ConfigPath {
    /// Parse a path expression
    pub fn parse(expr: &str) -> Result<Self> {
        let chars: Vec<char> = expr.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;

        if chars.is_empty() {
            return Err(StrataError::invalid_path(expr, "empty path"));
        }

        while pos < chars.len() {
            match chars[pos] {
                '[' => {
                    let (segment, next) = parse_bracket(expr, &chars, pos)?;
                    segments.push(segment);
                    pos = next;
                }
                '.' => {
                    if segments.is_empty() {
                        return Err(StrataError::invalid_path(expr, "path starts with '.'"));
                    }
                    pos += 1;
                    let (name, next) = parse_bare(&chars, pos);
                    if name.is_empty() {
                        return Err(StrataError::invalid_path(
                            expr,
                            format!("expected a key after '.' at position {}", pos),
                        ));
                    }
                    segments.push(PathSegment::Key(name));
                    pos = next;
                }
                _ if segments.is_empty() => {
                    let (name, next) = parse_bare(&chars, pos);
                    if name.is_empty() {
                        return Err(StrataError::invalid_path(
                            expr,
                            format!("unexpected '{}' at position {}", chars[pos], pos),
                        ));
                    }
                    segments.push(PathSegment::Key(name));
                    pos = next;
                }
                c => {
                    return Err(StrataError::invalid_path(
                        expr,
                        format!("unexpected '{}' at position {}", c, pos),
                    ));
                }
            }
        }

        if !matches!(segments.first(), Some(PathSegment::Key(_))) {
            return Err(StrataError::invalid_path(
                expr,
                "path must start with a key, not an index",
            ));
        }

        Ok(Self { segments })
    }

    /// A single-segment path for a literal key (no parsing)
    pub fn literal(key: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Key(key.into())],
        }
    }

    /// The top-level key this path starts from
    pub fn root(&self) -> &str {
        match self.segments.first() {
            Some(PathSegment::Key(key)) => key,
            _ => "",
        }
    }

    /// Replace the top-level key (used for namespace normalization)
    pub fn with_root(mut self, root: String) -> Self {
        if let Some(first) = self.segments.first_mut() {
            *first = PathSegment::Key(root);
        }
        self
    }

    /// Segments after the root
    pub fn rest(&self) -> &[PathSegment] {
        &self.segments[1..]
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if needs_quoting(key) => write!(f, "[{:?}]", key)?,
                PathSegment::Key(key) if i == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty() || key.contains(&['.', '[', ']', '"'][..])
}

/// Read a bare key up to the next `.` or `[`
fn parse_bare(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && !matches!(chars[end], '.' | '[' | ']' | '"') {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

/// Parse `[n]` or `["key"]` starting at the opening bracket
fn parse_bracket(expr: &str, chars: &[char], start: usize) -> Result<(PathSegment, usize)> {
    let mut pos = start + 1;

    if chars.get(pos) == Some(&'"') {
        pos += 1;
        let mut key = String::new();
        loop {
            match chars.get(pos) {
                Some('\\') => {
                    match chars.get(pos + 1) {
                        Some(c @ ('"' | '\\')) => key.push(*c),
                        _ => {
                            return Err(StrataError::invalid_path(
                                expr,
                                format!("invalid escape at position {}", pos),
                            ))
                        }
                    }
                    pos += 2;
                }
                Some('"') => {
                    pos += 1;
                    break;
                }
                Some(c) => {
                    key.push(*c);
                    pos += 1;
                }
                None => return Err(StrataError::invalid_path(expr, "unterminated quoted key")),
            }
        }
        if chars.get(pos) != Some(&']') {
            return Err(StrataError::invalid_path(
                expr,
                format!("expected ']' at position {}", pos),
            ));
        }
        return Ok((PathSegment::Key(key), pos + 1));
    }

    let digits_start = pos;
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos == digits_start {
        return Err(StrataError::invalid_path(
            expr,
            format!("expected an index or quoted key at position {}", digits_start),
        ));
    }
    if chars.get(pos) != Some(&']') {
        return Err(StrataError::invalid_path(
            expr,
            format!("expected ']' at position {}", pos),
        ));
    }
    let digits: String = chars[digits_start..pos].iter().collect();
    let index = digits
        .parse::<usize>()
        .map_err(|e| StrataError::invalid_path(expr, format!("bad index '{}': {}", digits, e)))?;
    Ok((PathSegment::Index(index), pos + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(k: &str) -> PathSegment {
        PathSegment::Key(k.to_string())
    }

    #[test]
    fn test_parse_dotted() {
        let path = ConfigPath::parse("db.port").unwrap();
        assert_eq!(path.segments(), &[key("db"), key("port")]);
        assert_eq!(path.root(), "db");
    }

    #[test]
    fn test_parse_indices_and_quoted_keys() {
        let path = ConfigPath::parse(r#"app:servers[1]["host.name"].port"#).unwrap();
        assert_eq!(
            path.segments(),
            &[
                key("app:servers"),
                PathSegment::Index(1),
                key("host.name"),
                key("port")
            ]
        );
    }

    #[test]
    fn test_parse_quoted_root() {
        let path = ConfigPath::parse(r#"["a.b"].c"#).unwrap();
        assert_eq!(path.segments(), &[key("a.b"), key("c")]);
    }

    #[test]
    fn test_malformed_paths() {
        for bad in ["", ".a", "a.", "a..b", "a[", "a[x]", "a[0", "[0]", r#"a["b"#, "a]", "a[1]b"] {
            assert!(
                matches!(ConfigPath::parse(bad), Err(StrataError::InvalidPath { .. })),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_display_roundtrip() {
        let expr = r#"db.hosts[0]["x.y"]"#;
        let path = ConfigPath::parse(expr).unwrap();
        assert_eq!(path.to_string(), expr);
        assert_eq!(ConfigPath::parse(&path.to_string()).unwrap(), path);
    }
}
