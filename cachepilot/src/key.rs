//! Hierarchical cache keys.
//!
//! A [`CacheKey`] is an ordered tuple of string/number segments laid out as
//! `[data-type, subject-id, ...params]`. Equality is structural.
//!
//! # Canonical Form
//!
//! Pattern matching (tags, subject invalidation) runs against the canonical
//! serialization of a key, which is its JSON array text:
//!
//! ```text
//! ["user-profile","u1"]
//! ["activity","u1","page",2]
//! ```

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One segment of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    /// Numeric segment, serialized without quotes.
    Number(i64),
    /// Text segment, serialized as a JSON string.
    Text(String),
}

impl KeySegment {
    fn write_canonical(&self, out: &mut String) {
        match self {
            KeySegment::Number(n) => out.push_str(&n.to_string()),
            // Display on a JSON string value yields the escaped, quoted form
            KeySegment::Text(s) => out.push_str(&serde_json::Value::String(s.clone()).to_string()),
        }
    }

    /// Returns the segment as plain text (numbers are formatted).
    pub fn as_text(&self) -> String {
        match self {
            KeySegment::Number(n) => n.to_string(),
            KeySegment::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Number(n) => write!(f, "{}", n),
            KeySegment::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        KeySegment::Text(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        KeySegment::Text(value)
    }
}

impl From<&String> for KeySegment {
    fn from(value: &String) -> Self {
        KeySegment::Text(value.clone())
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        KeySegment::Number(value)
    }
}

impl From<u32> for KeySegment {
    fn from(value: u32) -> Self {
        KeySegment::Number(i64::from(value))
    }
}

impl From<i32> for KeySegment {
    fn from(value: i32) -> Self {
        KeySegment::Number(i64::from(value))
    }
}

/// Ordered, hierarchical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(Vec<KeySegment>);

impl CacheKey {
    /// Create the key `[data_type, subject_id]`.
    pub fn new(data_type: impl Into<String>, subject_id: impl Into<KeySegment>) -> Self {
        Self(vec![KeySegment::Text(data_type.into()), subject_id.into()])
    }

    /// Create a key from arbitrary segments.
    pub fn from_segments(segments: impl IntoIterator<Item = KeySegment>) -> Self {
        Self(segments.into_iter().collect())
    }

    /// Append a parameter segment.
    pub fn with_param(mut self, param: impl Into<KeySegment>) -> Self {
        self.0.push(param.into());
        self
    }

    /// Append several parameter segments.
    pub fn with_params(mut self, params: impl IntoIterator<Item = KeySegment>) -> Self {
        self.0.extend(params);
        self
    }

    /// All segments in order.
    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// The leading data-type segment, if it is text.
    pub fn data_type(&self) -> Option<&str> {
        match self.0.first() {
            Some(KeySegment::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// The subject segment as text.
    pub fn subject_id(&self) -> Option<String> {
        self.0.get(1).map(KeySegment::as_text)
    }

    /// Segments after data type and subject.
    pub fn params(&self) -> &[KeySegment] {
        self.0.get(2..).unwrap_or(&[])
    }

    /// Canonical serialization used for pattern matching.
    pub fn serialized(&self) -> String {
        let mut out = String::with_capacity(16 * self.0.len() + 2);
        out.push('[');
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            segment.write_canonical(&mut out);
        }
        out.push(']');
        out
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized())
    }
}

impl<S: Into<KeySegment>> FromIterator<S> for CacheKey {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Leading segment of a serialized key: a JSON string or an integer.
const LEADING_SEGMENT: &str = r#"(?:"(?:[^"\\]|\\.)*"|-?[0-9]+),"#;

/// Regex matching any serialized key whose subject segment (the second
/// one) is `subject_id`.
///
/// The subject is compared in its canonical form: as a JSON string, or as
/// a bare number when `subject_id` is an integer literal.
pub fn subject_pattern(subject_id: &str) -> Result<Regex, regex::Error> {
    let quoted = regex::escape(&serde_json::Value::String(subject_id.to_string()).to_string());
    let subject = match subject_id.parse::<i64>() {
        Ok(n) if n.to_string() == subject_id => format!("{}|{}", quoted, regex::escape(subject_id)),
        _ => quoted,
    };
    Regex::new(&format!(r"^\[{}(?:{})[,\]]", LEADING_SEGMENT, subject))
}

/// Regex matching any serialized key that contains `segment` as a whole
/// text segment.
pub fn segment_pattern(segment: &str) -> String {
    let quoted = serde_json::Value::String(segment.to_string()).to_string();
    format!(r"[\[,]{}[,\]]", regex::escape(&quoted))
}

/// Regex matching any serialized key whose data type (first segment) is
/// one of `data_types`.
pub fn data_type_pattern<S: AsRef<str>>(data_types: &[S]) -> String {
    let alternatives: Vec<String> = data_types
        .iter()
        .map(|data_type| regex::escape(&serde_json::Value::String(data_type.as_ref().to_string()).to_string()))
        .collect();
    format!(r"^\[(?:{})[,\]]", alternatives.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_serialization() {
        let key = CacheKey::new("activity", "u1").with_param("page").with_param(2);
        assert_eq!(key.serialized(), r#"["activity","u1","page",2]"#);
        assert_eq!(key.to_string(), key.serialized());
    }

    #[test]
    fn test_key_accessors() {
        let key = CacheKey::new("user-profile", 42).with_param("full");
        assert_eq!(key.data_type(), Some("user-profile"));
        assert_eq!(key.subject_id(), Some("42".to_string()));
        assert_eq!(key.params(), &[KeySegment::from("full")]);

        let bare = CacheKey::from_segments(vec![KeySegment::from(7)]);
        assert_eq!(bare.data_type(), None);
        assert!(bare.params().is_empty());
    }

    #[test]
    fn test_structural_equality() {
        let a: CacheKey = ["user-profile", "u1"].into_iter().collect();
        let b = CacheKey::new("user-profile", "u1");
        assert_eq!(a, b);
        assert_ne!(b, CacheKey::new("user-profile", "u2"));
    }

    #[test]
    fn test_text_segments_are_escaped() {
        let key = CacheKey::new("notes", r#"a"b"#);
        assert_eq!(key.serialized(), r#"["notes","a\"b"]"#);
    }

    #[test]
    fn test_subject_pattern_matches_subject_segment() {
        let re = subject_pattern("u1").unwrap();
        assert!(re.is_match(&CacheKey::new("user-profile", "u1").serialized()));
        assert!(re.is_match(&CacheKey::new("activity", "u1").with_param(3).serialized()));
        assert!(!re.is_match(&CacheKey::new("user-profile", "u12").serialized()));
        assert!(!re.is_match(&CacheKey::new("user-profile", "au1").serialized()));
        assert!(!re.is_match(&CacheKey::new("notes", "u2").with_param("u1").serialized()));

        let numeric = subject_pattern("42").unwrap();
        assert!(numeric.is_match(&CacheKey::new("user-profile", 42).serialized()));
        assert!(numeric.is_match(&CacheKey::new("user-profile", "42").serialized()));
        assert!(!numeric.is_match(&CacheKey::new("activity", "u1").with_param("page").with_param(42).serialized()));
    }

    #[test]
    fn test_subject_pattern_ignores_text_inside_segments() {
        let re = subject_pattern("1").unwrap();
        assert!(!re.is_match(&CacheKey::new("notes", "x,1").serialized()));
        assert!(!re.is_match(&CacheKey::new("a,1", "x").serialized()));
        assert!(re.is_match(&CacheKey::new("a,\"1", 1).serialized()));
    }

    #[test]
    fn test_subject_pattern_escapes_json() {
        for subject in [r#"a"b"#, r"back\slash", "tab\there", "x],[1"] {
            let re = subject_pattern(subject).unwrap();
            assert!(re.is_match(&CacheKey::new("user-profile", subject).serialized()), "{}", subject);
            assert!(!re.is_match(&CacheKey::new("user-profile", "other").serialized()));
        }
    }

    #[test]
    fn test_segment_pattern() {
        let re = Regex::new(&segment_pattern("user-profile")).unwrap();
        assert!(re.is_match(&CacheKey::new("user-profile", "u1").serialized()));
        assert!(!re.is_match(&CacheKey::new("user-profile-extra", "u1").serialized()));
    }

    #[test]
    fn test_data_type_pattern() {
        let re = Regex::new(&data_type_pattern(&["user-profile", "activity"])).unwrap();
        assert!(re.is_match(&CacheKey::new("user-profile", "u1").serialized()));
        assert!(re.is_match(&CacheKey::new("activity", "u1").with_param(2).serialized()));
        assert!(!re.is_match(&CacheKey::new("notes", "user-profile").serialized()));
        assert!(!re.is_match(&CacheKey::new("activity-feed", "u1").serialized()));
    }

    proptest! {
        #[test]
        fn prop_subject_pattern_matches_exactly_own_subject(
            subject in "[a-z0-9\"\\\\,\\[\\]]{1,6}",
            other in "[a-z0-9\"\\\\,\\[\\]]{1,6}",
            data_type in "[a-z,\"]{1,6}",
            param in "[a-z0-9,\"]{0,6}",
        ) {
            let re = subject_pattern(&subject).unwrap();
            let own = CacheKey::new(data_type.as_str(), subject.as_str()).with_param(param.as_str());
            prop_assert!(re.is_match(&own.serialized()));

            let foreign = CacheKey::new(data_type.as_str(), other.as_str()).with_param(subject.as_str());
            prop_assert_eq!(re.is_match(&foreign.serialized()), other == subject);
        }

        #[test]
        fn prop_serialization_is_injective(a in "[a-z]{1,6}", b in "[a-z]{1,6}") {
            let ka = CacheKey::new("t", a.as_str());
            let kb = CacheKey::new("t", b.as_str());
            prop_assert_eq!(ka == kb, ka.serialized() == kb.serialized());
        }
    }
}
