//! Regular-expression parser
//!
//! The pattern is applied to the whole content (not line by line) and the
//! first capture group of the first match is the version.

use regex::bytes::Regex;

use crate::parser::traits::{ParseError, VersionParser, non_empty};

/// Parser that extracts the first capture group of a regular expression
#[derive(Debug, Clone)]
pub struct PatternParser {
    regex: Regex,
}

impl PatternParser {
    /// Compile the pattern, rejecting patterns without a capture group
    pub fn new(pattern: &str) -> Result<Self, ParseError> {
        let regex = Regex::new(pattern).map_err(|e| ParseError::InvalidPattern(e.to_string()))?;
        // captures_len counts the implicit whole-match group
        if regex.captures_len() < 2 {
            return Err(ParseError::NoCaptureGroup(pattern.to_string()));
        }
        Ok(Self { regex })
    }
}

impl VersionParser for PatternParser {
    fn parse(&self, content: &[u8]) -> Result<String, ParseError> {
        let captured = self
            .regex
            .captures(content)
            .and_then(|caps| caps.get(1))
            .filter(|m| !m.as_bytes().is_empty())
            .ok_or(ParseError::NoMatch)?;

        non_empty(&String::from_utf8_lossy(captured.as_bytes()))
    }
}

/// Apply a post-filter pattern to already extracted text.
///
/// Returns the first capture group when the pattern has one, otherwise the
/// whole match.
pub(crate) fn extract_with(regex: &regex::Regex, text: &str) -> Result<String, ParseError> {
    let caps = regex.captures(text).ok_or(ParseError::NoMatch)?;
    let matched = if regex.captures_len() > 1 {
        caps.get(1)
    } else {
        caps.get(0)
    };
    let matched = matched
        .filter(|m| !m.as_str().is_empty())
        .ok_or(ParseError::NoMatch)?;
    non_empty(matched.as_str())
}
