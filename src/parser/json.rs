//! Structured-data (JSON) parser
//!
//! Navigates a parsed document using a path such as `data.releases[0].tag`.
//! Field access requires an object and index access requires an array; the
//! first segment that does not resolve is reported in the error.

use serde_json::Value;

use crate::parser::traits::{ParseError, VersionParser, non_empty};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "{}", name),
            Segment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// Parser for JSON documents addressed by a dotted path
#[derive(Debug, Clone)]
pub struct JsonParser {
    segments: Vec<Segment>,
}

impl JsonParser {
    pub fn new(path: &str) -> Result<Self, ParseError> {
        let segments = Self::parse_path(path)?;
        Ok(Self { segments })
    }

    /// Split a path into field and index segments.
    ///
    /// Accepts an optional leading `$` or `.` so `$.version` and `.version`
    /// are equivalent to `version`. Top-level arrays are addressed as `[0].tag`.
    fn parse_path(path: &str) -> Result<Vec<Segment>, ParseError> {
        let trimmed = path.trim();
        let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
        let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(ParseError::InvalidPath(path.to_string()));
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            let (field, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };

            if field.is_empty() && (rest.is_empty() || !segments.is_empty()) {
                return Err(ParseError::InvalidPath(path.to_string()));
            }
            if !field.is_empty() {
                segments.push(Segment::Field(field.to_string()));
            }

            while !rest.is_empty() {
                let inner = rest
                    .strip_prefix('[')
                    .and_then(|r| r.find(']').map(|end| (&r[..end], &r[end + 1..])));
                let Some((index, remaining)) = inner else {
                    return Err(ParseError::InvalidPath(path.to_string()));
                };
                let index = index
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ParseError::InvalidPath(path.to_string()))?;
                segments.push(Segment::Index(index));
                rest = remaining;
            }
        }

        Ok(segments)
    }

    fn navigate<'a>(&self, root: &'a Value) -> Result<&'a Value, ParseError> {
        self.segments
            .iter()
            .try_fold(root, |current, segment| {
                let next = match segment {
                    Segment::Field(name) => current.as_object().and_then(|obj| obj.get(name)),
                    Segment::Index(index) => current.as_array().and_then(|arr| arr.get(*index)),
                };
                next.ok_or_else(|| ParseError::PathNotFound(segment.to_string()))
            })
    }

    fn render(value: &Value) -> Result<String, ParseError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(i.to_string())
                } else if let Some(u) = n.as_u64() {
                    Ok(u.to_string())
                } else if let Some(f) = n.as_f64() {
                    Ok(f.to_string())
                } else {
                    Err(ParseError::UnsupportedValue(n.to_string()))
                }
            }
            Value::Null => Err(ParseError::UnsupportedValue("null".to_string())),
            Value::Array(_) => Err(ParseError::UnsupportedValue("array".to_string())),
            Value::Object(_) => Err(ParseError::UnsupportedValue("object".to_string())),
        }
    }
}

impl VersionParser for JsonParser {
    fn parse(&self, content: &[u8]) -> Result<String, ParseError> {
        let document: Value = serde_json::from_slice(content)
            .map_err(|e| ParseError::InvalidContent(e.to_string()))?;
        let value = self.navigate(&document)?;
        non_empty(&Self::render(value)?)
    }
}
