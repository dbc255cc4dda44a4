//! Parser selection and fallback

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parser::html::HtmlParser;
use crate::parser::json::JsonParser;
use crate::parser::pattern::PatternParser;
use crate::parser::traits::{ParseError, VersionParser};

/// Extraction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    Json,
    Regex,
    #[serde(alias = "xpath")]
    Html,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::Json => "json",
            ParserKind::Regex => "regex",
            ParserKind::Html => "html",
        }
    }
}

impl std::str::FromStr for ParserKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ParserKind::Json),
            "regex" => Ok(ParserKind::Regex),
            "html" | "xpath" => Ok(ParserKind::Html),
            other => Err(ParseError::UnsupportedParser(other.to_string())),
        }
    }
}

/// Strategy plus the parameters it needs
///
/// Which parameters are required depends on `kind`:
/// - `json`: `path`
/// - `regex`: `pattern`
/// - `html`: exactly one of `selector` / `xpath`, optional `pattern` post-filter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSpec {
    #[serde(rename = "parser", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ParserKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
}

impl ParserSpec {
    pub fn json(path: &str) -> Self {
        Self {
            kind: Some(ParserKind::Json),
            path: Some(path.to_string()),
            ..Default::default()
        }
    }

    pub fn regex(pattern: &str) -> Self {
        Self {
            kind: Some(ParserKind::Regex),
            pattern: Some(pattern.to_string()),
            ..Default::default()
        }
    }

    pub fn css(selector: &str, pattern: Option<&str>) -> Self {
        Self {
            kind: Some(ParserKind::Html),
            selector: Some(selector.to_string()),
            pattern: pattern.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn xpath(expression: &str, pattern: Option<&str>) -> Self {
        Self {
            kind: Some(ParserKind::Html),
            xpath: Some(expression.to_string()),
            pattern: pattern.map(str::to_string),
            ..Default::default()
        }
    }
}

/// Construct the parser described by `spec`
pub fn build_parser(spec: &ParserSpec) -> Result<Box<dyn VersionParser>, ParseError> {
    let kind = spec.kind.ok_or(ParseError::MissingParameter("parser"))?;
    match kind {
        ParserKind::Json => {
            let path = spec
                .path
                .as_deref()
                .ok_or(ParseError::MissingParameter("path"))?;
            Ok(Box::new(JsonParser::new(path)?))
        }
        ParserKind::Regex => {
            let pattern = spec
                .pattern
                .as_deref()
                .ok_or(ParseError::MissingParameter("pattern"))?;
            Ok(Box::new(PatternParser::new(pattern)?))
        }
        ParserKind::Html => Ok(Box::new(HtmlParser::new(
            spec.selector.as_deref(),
            spec.xpath.as_deref(),
            spec.pattern.as_deref(),
        )?)),
    }
}

/// Parse with the primary strategy, falling back to `fallback` on any failure.
///
/// When both fail the primary error is returned.
pub fn parse_version(
    content: &[u8],
    primary: &ParserSpec,
    fallback: Option<&ParserSpec>,
) -> Result<String, ParseError> {
    let primary_error = match build_parser(primary).and_then(|p| p.parse(content)) {
        Ok(version) => return Ok(version),
        Err(e) => e,
    };

    let Some(fallback) = fallback else {
        return Err(primary_error);
    };

    debug!("Primary parser failed ({}), trying fallback", primary_error);
    match build_parser(fallback).and_then(|p| p.parse(content)) {
        Ok(version) => Ok(version),
        Err(fallback_error) => {
            debug!("Fallback parser failed: {}", fallback_error);
            Err(primary_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parse_version_uses_primary_when_it_succeeds() {
        let result = parse_version(
            br#"{"version": "1.0.0"}"#,
            &ParserSpec::json("version"),
            Some(&ParserSpec::regex(r"(\d+)")),
        );

        assert_eq!(result, Ok("1.0.0".to_string()));
    }

    #[test]
    fn parse_version_falls_back_when_primary_fails() {
        let result = parse_version(
            b"release 2.4.1 is out",
            &ParserSpec::json("version"),
            Some(&ParserSpec::regex(r"release (\S+)")),
        );

        assert_eq!(result, Ok("2.4.1".to_string()));
    }

    #[test]
    fn parse_version_reports_primary_error_when_both_fail() {
        let result = parse_version(
            br#"{"other": "x"}"#,
            &ParserSpec::json("version"),
            Some(&ParserSpec::regex(r"release (\S+)")),
        );

        assert_eq!(result, Err(ParseError::PathNotFound("version".to_string())));
    }

    #[test]
    fn parse_version_falls_back_when_primary_is_misconfigured() {
        let primary = ParserSpec {
            kind: Some(ParserKind::Json),
            ..Default::default()
        };

        let result = parse_version(b"v3", &primary, Some(&ParserSpec::regex(r"v(\d)")));

        assert_eq!(result, Ok("3".to_string()));
    }

    #[test]
    fn parse_version_without_fallback_returns_primary_error() {
        let result = parse_version(b"nothing", &ParserSpec::regex(r"v(\d)"), None);

        assert_eq!(result, Err(ParseError::NoMatch));
    }

    #[rstest]
    #[case(ParserSpec::json("a"), br#"{"a": "1"}"#.as_slice(), "1")]
    #[case(ParserSpec::regex(r"v(\d)"), b"v2".as_slice(), "2")]
    #[case(ParserSpec::css("b", None), b"<b>3</b>".as_slice(), "3")]
    #[case(ParserSpec::xpath("//b", None), b"<b>4</b>".as_slice(), "4")]
    fn build_parser_dispatches_by_kind(
        #[case] spec: ParserSpec,
        #[case] content: &[u8],
        #[case] expected: &str,
    ) {
        assert_eq!(build_parser(&spec).unwrap().parse(content).unwrap(), expected);
    }

    #[rstest]
    #[case(ParserKind::Json, "path")]
    #[case(ParserKind::Regex, "pattern")]
    fn build_parser_requires_parameters(#[case] kind: ParserKind, #[case] missing: &'static str) {
        let spec = ParserSpec {
            kind: Some(kind),
            ..Default::default()
        };

        assert_eq!(
            build_parser(&spec).err(),
            Some(ParseError::MissingParameter(missing))
        );
    }

    #[test]
    fn build_parser_requires_kind() {
        assert_eq!(
            build_parser(&ParserSpec::default()).err(),
            Some(ParseError::MissingParameter("parser"))
        );
    }

    #[test]
    fn parser_kind_from_str_rejects_unknown_names() {
        assert_eq!(
            "yaml".parse::<ParserKind>(),
            Err(ParseError::UnsupportedParser("yaml".to_string()))
        );
        assert_eq!("XPath".parse::<ParserKind>(), Ok(ParserKind::Html));
    }

    #[test]
    fn parser_spec_deserializes_from_config() {
        let spec: ParserSpec = serde_json::from_value(serde_json::json!({
            "parser": "html",
            "selector": "span.version",
            "pattern": "(\\d+)"
        }))
        .unwrap();

        assert_eq!(spec, ParserSpec::css("span.version", Some("(\\d+)")));
    }

    #[test]
    fn parser_spec_rejects_unknown_parser_name() {
        let result = serde_json::from_value::<ParserSpec>(serde_json::json!({
            "parser": "yaml",
            "path": "version"
        }));

        assert!(result.is_err());
    }
}
