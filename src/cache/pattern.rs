//! Key Pattern Module
//!
//! Patterns used by bulk invalidation. A pattern is either:
//! - `*` alone: every key
//! - a string containing `*`: a glob where `*` matches any run of characters
//! - anything else: a substring that must appear somewhere in the key

// == Key Pattern ==
/// Parsed invalidation pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    /// Matches every key
    All,
    /// Matches keys containing the string
    Substring(String),
    /// Literal segments separated by `*` wildcards
    Glob(Vec<String>),
}

impl KeyPattern {
    // == Parse ==
    /// Parses a raw pattern string.
    pub fn parse(raw: &str) -> Self {
        if raw == "*" {
            KeyPattern::All
        } else if raw.contains('*') {
            KeyPattern::Glob(raw.split('*').map(str::to_string).collect())
        } else {
            KeyPattern::Substring(raw.to_string())
        }
    }

    // == Matches ==
    /// Tests a key against the pattern.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::All => true,
            KeyPattern::Substring(needle) => key.contains(needle.as_str()),
            KeyPattern::Glob(segments) => glob_match(segments, key),
        }
    }

    /// Returns true for the match-everything pattern.
    pub fn is_all(&self) -> bool {
        matches!(self, KeyPattern::All)
    }

    // == Redis Glob ==
    /// Translates the pattern into a Redis `SCAN MATCH` glob under `prefix`.
    pub fn to_redis_glob(&self, prefix: &str) -> String {
        let prefix = escape_redis(prefix);
        match self {
            KeyPattern::All => format!("{}*", prefix),
            KeyPattern::Substring(needle) => format!("{}*{}*", prefix, escape_redis(needle)),
            KeyPattern::Glob(segments) => {
                let body: Vec<String> = segments.iter().map(|s| escape_redis(s)).collect();
                format!("{}{}", prefix, body.join("*"))
            }
        }
    }
}

/// Segment-wise glob match: the first segment anchors the start, the last
/// anchors the end, middle segments must appear in order.
fn glob_match(segments: &[String], key: &str) -> bool {
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return key.is_empty(),
    };
    let Some(mut remaining) = key.strip_prefix(first.as_str()) else {
        return false;
    };

    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };

    for segment in middle {
        match remaining.find(segment.as_str()) {
            Some(pos) => remaining = &remaining[pos + segment.len()..],
            None => return false,
        }
    }

    remaining.len() >= last.len() && remaining.ends_with(last.as_str())
}

/// Escapes Redis glob metacharacters.
fn escape_redis(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
