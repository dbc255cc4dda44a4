use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::ParserSpec;
use crate::version::error::CheckError;

/// Update-check configuration for one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageUpdateSpec {
    /// `category/name`; filled from the package list key when absent
    pub package: String,
    pub url: String,
    /// Used to derive a source when `url` is empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(flatten)]
    pub parser: ParserSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_parser: Option<ParserSpec>,
    /// Prompt for the text-generation provider, used as a last resort
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_prompt: Option<String>,
    /// Per-request headers; values may contain `${ENV}` templates
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    pub binary: bool,
}

impl PackageUpdateSpec {
    pub fn new(package: &str, url: &str, parser: ParserSpec) -> Self {
        Self {
            package: package.to_string(),
            url: url.to_string(),
            parser,
            ..Default::default()
        }
    }

    pub fn with_fallback(mut self, url: &str, parser: ParserSpec) -> Self {
        self.fallback_url = Some(url.to_string());
        self.fallback_parser = Some(parser);
        self
    }

    pub fn with_llm_prompt(mut self, prompt: &str) -> Self {
        self.llm_prompt = Some(prompt.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}

/// Extraction stage of a package check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primary,
    Fallback,
    Generation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Primary => "primary",
            Stage::Fallback => "fallback",
            Stage::Generation => "generation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking one package
#[derive(Debug)]
pub struct CheckResult {
    pub package: String,
    pub current_version: Option<String>,
    pub upstream_version: Option<String>,
    pub has_update: bool,
    pub from_cache: bool,
    pub error: Option<CheckError>,
}

impl CheckResult {
    pub fn failed(package: &str, current_version: Option<String>, error: CheckError) -> Self {
        Self {
            package: package.to_string(),
            current_version,
            upstream_version: None,
            has_update: false,
            from_cache: false,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
