//! Hardened BBCode to HTML engine for forum posts.
//!
//! Untrusted markup goes in, sanitized HTML comes out. A [TagTable] describes which
//! tags exist and how they render; a [ParseConfig] adds the per-site settings. Parsing
//! itself never fails: anything that is not valid markup under the table is written
//! out as escaped text.
//!
//! ```
//! # #[cfg(feature = "builtin_tags")] {
//! let config = bbforum::ParseConfig::builtin();
//! assert_eq!(bbforum::parse("[b]Hello[/b]", &config), "<strong>Hello</strong>");
//! # }
//! ```

mod config;
mod error;
mod grammar;
mod html;
mod parser;

pub use config::{
    AuthorContext, ParseConfig, ParseFeature, ResourceKind, Smiley, SmileyTable, UrlRewrite,
};
pub use error::{ConfigError, Fallback};
pub use grammar::{
    ContentForm, Param, TagData, TagDefinition, TagFlags, TagTable, Trim, Validate,
    ValidateContext,
};
pub use html::HtmlSerializer;
pub use parser::{BBParser, OpenTag, Token, TokenKind};

#[cfg(feature = "builtin_tags")]
pub use html::builtins;

/// Render `input` to HTML under `config`.
pub fn parse(input: &str, config: &ParseConfig) -> String {
    HtmlSerializer::new(config).serialize(input)
}
