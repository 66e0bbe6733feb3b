//! Error types.
//!
//! Only a broken tag table is an error in the `Result` sense. Everything a user can
//! type ends up as literal text, and [Fallback] records why.
use std::fmt;

use crate::grammar::ContentForm;

/// A tag table that cannot be used. Returned once, when the table is built.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// A tag name that the scanner could never recognise.
    InvalidName(String),
    /// A `test` or parameter `match` pattern failed to compile.
    InvalidPattern {
        tag: String,
        pattern: String,
        source: regex::Error,
    },
    /// The definition lacks a template its content form needs.
    MissingTemplate {
        tag: String,
        form: ContentForm,
        template: &'static str,
    },
    /// Named parameters were declared on a form that already takes an `=` value.
    ParametersOnEqualsForm { tag: String, form: ContentForm },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidName(name) => write!(f, "invalid tag name `{}`", name),
            ConfigError::InvalidPattern {
                tag,
                pattern,
                source,
            } => write!(f, "invalid pattern `{}` on tag `{}`: {}", pattern, tag, source),
            ConfigError::MissingTemplate {
                tag,
                form,
                template,
            } => write!(
                f,
                "tag `{}` with form {:?} must define a `{}` template",
                tag, form, template
            ),
            ConfigError::ParametersOnEqualsForm { tag, form } => write!(
                f,
                "tag `{}` declares named parameters but its form {:?} takes an `=` value",
                tag, form
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPattern { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Why a tag occurrence was written out as literal text instead of markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fallback {
    /// Unterminated or unmatched brackets, or a close tag with nothing to close.
    MalformedTag,
    /// `require_parents`, `require_children` or `disallow_children` failed.
    ConstraintViolation,
    /// A parameter did not match its pattern, or a required one was missing.
    ParameterInvalid,
    /// The tag's validate hook refused the data or panicked.
    ValidatorFailure,
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Fallback::MalformedTag => "malformed tag",
            Fallback::ConstraintViolation => "nesting constraint violated",
            Fallback::ParameterInvalid => "invalid parameter",
            Fallback::ValidatorFailure => "rejected by validator",
        })
    }
}

impl std::error::Error for Fallback {}
