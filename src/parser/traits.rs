//! Parser trait definition

/// Trait for extracting a version string from fetched upstream content
pub trait VersionParser: Send + Sync {
    /// Parse the raw content and extract a single, non-empty version string
    fn parse(&self, content: &[u8]) -> Result<String, ParseError>;
}

/// Error type for parser construction and extraction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A required parser parameter was not supplied
    #[error("Missing parser parameter: {0}")]
    MissingParameter(&'static str),

    /// Parameters that cannot be combined were both supplied
    #[error("Conflicting parser parameters: {0}")]
    ConflictingParameters(&'static str),

    /// The configured parser name is not known
    #[error("Unsupported parser: {0}")]
    UnsupportedParser(String),

    /// A regular expression failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// A text pattern was configured without a capture group
    #[error("Pattern has no capture group: {0}")]
    NoCaptureGroup(String),

    /// A structured-data path expression is malformed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A CSS selector failed to parse
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// An XPath expression failed to parse
    #[error("Invalid XPath expression: {0}")]
    InvalidXPath(String),

    /// The content could not be decoded as the expected format
    #[error("Failed to decode content: {0}")]
    InvalidContent(String),

    /// A segment of the structured-data path did not resolve
    #[error("Path not found at segment '{0}'")]
    PathNotFound(String),

    /// The value at the end of the path cannot be rendered as a version
    #[error("Unsupported value type at path: {0}")]
    UnsupportedValue(String),

    /// The text pattern did not match the content
    #[error("Pattern matched nothing")]
    NoMatch,

    /// The selector or XPath expression did not select any node
    #[error("No element matched {0}")]
    NoElement(String),

    /// Extraction succeeded but produced only whitespace
    #[error("Extracted version is empty")]
    EmptyVersion,
}

impl ParseError {
    /// Returns true for errors raised while constructing a parser
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ParseError::MissingParameter(_)
                | ParseError::ConflictingParameters(_)
                | ParseError::UnsupportedParser(_)
                | ParseError::InvalidPattern(_)
                | ParseError::NoCaptureGroup(_)
                | ParseError::InvalidPath(_)
                | ParseError::InvalidSelector(_)
                | ParseError::InvalidXPath(_)
        )
    }
}

/// Trim an extracted value, rejecting whitespace-only results.
pub(crate) fn non_empty(value: &str) -> Result<String, ParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ParseError::EmptyVersion)
    } else {
        Ok(trimmed.to_string())
    }
}
