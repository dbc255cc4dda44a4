//! HTML parser
//!
//! Selects the first node matching a CSS selector or an XPath expression,
//! trims its text, and optionally narrows it with a post-filter pattern.

use regex::Regex;
use scraper::{Html, Selector};

use crate::parser::pattern::extract_with;
use crate::parser::traits::{ParseError, VersionParser, non_empty};
use crate::parser::xpath::XPath;

#[derive(Debug, Clone)]
enum Query {
    Css { source: String, selector: Selector },
    XPath(XPath),
}

/// Parser for HTML documents
#[derive(Debug, Clone)]
pub struct HtmlParser {
    query: Query,
    filter: Option<Regex>,
}

impl HtmlParser {
    /// Build from a CSS selector or an XPath expression, plus an optional post-filter.
    ///
    /// Exactly one of `selector` and `xpath` must be given.
    pub fn new(
        selector: Option<&str>,
        xpath: Option<&str>,
        pattern: Option<&str>,
    ) -> Result<Self, ParseError> {
        let query = match (selector, xpath) {
            (Some(css), None) => Query::Css {
                source: css.to_string(),
                selector: Selector::parse(css)
                    .map_err(|e| ParseError::InvalidSelector(format!("{}: {}", css, e)))?,
            },
            (None, Some(expression)) => Query::XPath(XPath::compile(expression)?),
            (None, None) => return Err(ParseError::MissingParameter("selector or xpath")),
            (Some(_), Some(_)) => {
                return Err(ParseError::ConflictingParameters("selector and xpath"));
            }
        };

        let filter = pattern
            .map(|p| Regex::new(p).map_err(|e| ParseError::InvalidPattern(e.to_string())))
            .transpose()?;

        Ok(Self { query, filter })
    }

    fn select_first(&self, document: &Html) -> Result<String, ParseError> {
        match &self.query {
            Query::Css { source, selector } => document
                .select(selector)
                .next()
                .map(|el| el.text().collect::<String>())
                .ok_or_else(|| ParseError::NoElement(source.clone())),
            Query::XPath(xpath) => xpath
                .evaluate(document)
                .into_iter()
                .next()
                .ok_or_else(|| ParseError::NoElement(xpath.expression().to_string())),
        }
    }
}

impl VersionParser for HtmlParser {
    fn parse(&self, content: &[u8]) -> Result<String, ParseError> {
        let document = Html::parse_document(&String::from_utf8_lossy(content));
        let text = self.select_first(&document)?;
        let text = text.trim();

        match &self.filter {
            Some(regex) => extract_with(regex, text),
            None => non_empty(text),
        }
    }
}
