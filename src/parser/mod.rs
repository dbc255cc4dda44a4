//! Parser layer
//! - traits.rs: VersionParser trait and ParseError
//! - json.rs: structured-data path parser
//! - pattern.rs: capture-group regex parser
//! - html.rs: CSS selector / XPath parser with optional post-filter
//! - xpath.rs: XPath subset used by the HTML parser
//! - dispatch.rs: strategy selection and fallback

pub mod dispatch;
pub mod html;
pub mod json;
pub mod pattern;
pub mod traits;
pub mod xpath;

pub use dispatch::{ParserKind, ParserSpec, build_parser, parse_version};
pub use html::HtmlParser;
pub use json::JsonParser;
pub use pattern::PatternParser;
pub use traits::{ParseError, VersionParser};
