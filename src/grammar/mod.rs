//! The tag grammar: what a tag looks like, how it renders, and where it may appear.
//!
//! A [TagTable] is compiled once from a list of [TagDefinition]s and then shared
//! read-only between any number of parse calls.
use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use bitflags::bitflags;
use regex::{Regex, RegexBuilder};
use static_assertions::{assert_impl_all, assert_obj_safe};

use crate::{config::ParseConfig, error::ConfigError, Fallback};

/// The syntactic shape of a tag's parameter and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentForm {
    /// `[tag]parsed body[/tag]`, rendered as `before` body `after`.
    Simple,
    /// `[tag=value]parsed body[/tag]`, the value is `$1`.
    UnparsedEquals,
    /// `[tag=parsed value]parsed body[/tag]`, the value is itself BBCode.
    ParsedEquals,
    /// `[tag]verbatim body[/tag]`, the body is `$1` of `content`.
    UnparsedContent,
    /// `[tag]` on its own, rendered as `content`.
    Closed,
    /// `[tag=a,b,c]parsed body[/tag]`, the values are `$1`..`$n`.
    UnparsedCommas,
    /// `[tag=a,b]verbatim body[/tag]`, the body is `$1`, the values `$2`..
    UnparsedCommasContent,
    /// `[tag=value]verbatim body[/tag]`, the body is `$1`, the value `$2`.
    UnparsedEqualsContent,
}

impl ContentForm {
    /// Forms written as `[tag=...]`.
    pub fn takes_value(self) -> bool {
        !matches!(
            self,
            ContentForm::Simple | ContentForm::UnparsedContent | ContentForm::Closed
        )
    }

    /// Forms whose body is captured verbatim up to the matching close tag.
    pub fn has_unparsed_body(self) -> bool {
        matches!(
            self,
            ContentForm::UnparsedContent
                | ContentForm::UnparsedCommasContent
                | ContentForm::UnparsedEqualsContent
        )
    }

    /// Forms rendered from a single `content` template.
    pub fn uses_content_template(self) -> bool {
        self.has_unparsed_body() || self == ContentForm::Closed
    }

    /// Forms that stay open on the tag stack while their body is parsed.
    pub fn has_parsed_body(self) -> bool {
        !self.uses_content_template()
    }

    fn splits_commas(self) -> bool {
        matches!(
            self,
            ContentForm::UnparsedCommas | ContentForm::UnparsedCommasContent
        )
    }
}

/// Whitespace removal around a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Trim {
    #[default]
    None,
    /// Strip whitespace just inside the open and close tags.
    Inside,
    /// Strip whitespace just outside the rendered tag.
    Outside,
    Both,
}

impl Trim {
    pub fn inside(self) -> bool {
        matches!(self, Trim::Inside | Trim::Both)
    }

    pub fn outside(self) -> bool {
        matches!(self, Trim::Outside | Trim::Both)
    }
}

bitflags! {
    /// Boolean properties of a tag definition.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct TagFlags: u32 {
        /// Renders as a block; never force-closed by an inline close tag.
        const BLOCK_LEVEL = 1 << 0;
        /// No autolinking inside the body.
        const AUTOLINK_EXEMPT = 1 << 1;
        /// No smileys inside the body.
        const NO_SMILEYS = 1 << 2;
        /// The `=` value may be wrapped in double quotes.
        const QUOTED_VALUE = 1 << 3;
    }
}

/// A named parameter, written ` name=value` inside the open tag.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Cow<'static, str>,
    /// The whole value must match this pattern. Defaults to anything.
    pub match_pattern: Option<Cow<'static, str>>,
    /// The value must be written in double quotes.
    pub quoted: bool,
    /// A missing or mismatching value is dropped instead of failing the tag.
    pub optional: bool,
    /// What `{name}` expands to, with `$1` standing for the escaped value.
    /// Defaults to the escaped value itself.
    pub value: Option<Cow<'static, str>>,
}

impl Param {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            match_pattern: None,
            quoted: false,
            optional: false,
            value: None,
        }
    }

    pub fn matching(mut self, pattern: impl Into<Cow<'static, str>>) -> Self {
        self.match_pattern = Some(pattern.into());
        self
    }

    pub fn quoted(mut self) -> Self {
        self.quoted = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn value(mut self, template: impl Into<Cow<'static, str>>) -> Self {
        self.value = Some(template.into());
        self
    }
}

/// The data captured from one tag occurrence, handed to [Validate] hooks and then
/// substituted into the templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagData {
    /// The verbatim body of unparsed-body forms. Empty otherwise.
    pub content: String,
    /// `content` is already HTML and must not be escaped.
    pub content_is_html: bool,
    /// The `=` value, or each comma-separated value.
    pub values: Vec<String>,
    /// `values` are already HTML (the parsed value of [ContentForm::ParsedEquals]).
    pub values_are_html: bool,
    /// Named parameters that were present, in declaration order.
    pub params: Vec<(String, String)>,
}

impl TagData {
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_param(&mut self, name: &str, value: String) {
        match self.params.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name.to_owned(), value)),
        }
    }
}

/// What a [Validate] hook may look at besides the tag's own data.
pub struct ValidateContext<'c> {
    pub(crate) tag: &'c str,
    pub(crate) disabled: bool,
    pub(crate) config: &'c ParseConfig,
}

impl<'c> ValidateContext<'c> {
    /// Name of the tag being validated.
    pub fn tag(&self) -> &str {
        self.tag
    }

    /// Whether this occurrence renders with its disabled templates.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// The whole administratively disabled set.
    pub fn disabled_tags(&self) -> &HashSet<String> {
        self.config.disabled_tags()
    }

    pub fn config(&self) -> &'c ParseConfig {
        self.config
    }
}

/// Per-definition data transformation, run after extraction and before templating.
///
/// Returning `Err` renders the occurrence as literal text. A hook must depend on
/// nothing but its arguments; anything external belongs in [ParseConfig].
pub trait Validate: Send + Sync {
    fn validate(&self, data: &mut TagData, cx: &ValidateContext<'_>) -> Result<(), Fallback>;
}

impl<F> Validate for F
where
    F: Fn(&mut TagData, &ValidateContext<'_>) -> Result<(), Fallback> + Send + Sync,
{
    fn validate(&self, data: &mut TagData, cx: &ValidateContext<'_>) -> Result<(), Fallback> {
        self(data, cx)
    }
}

assert_obj_safe!(Validate);

/// One way of writing one tag. Several definitions may share a name; the first that
/// fits an occurrence wins.
#[derive(Clone)]
pub struct TagDefinition {
    pub name: Cow<'static, str>,
    pub form: ContentForm,
    /// Checked against the text right after the `=` or space (or at the `]`).
    pub test: Option<Cow<'static, str>>,
    pub parameters: Vec<Param>,
    pub before: Option<Cow<'static, str>>,
    pub after: Option<Cow<'static, str>>,
    pub content: Option<Cow<'static, str>>,
    pub disabled_before: Option<Cow<'static, str>>,
    pub disabled_after: Option<Cow<'static, str>>,
    pub disabled_content: Option<Cow<'static, str>>,
    pub flags: TagFlags,
    pub trim: Trim,
    pub require_parents: Vec<Cow<'static, str>>,
    pub require_children: Vec<Cow<'static, str>>,
    pub disallow_children: Vec<Cow<'static, str>>,
    /// When set, only these tags are recognised inside the value and the body.
    pub parsed_tags_allowed: Option<Vec<Cow<'static, str>>>,
    pub validate: Option<Arc<dyn Validate>>,
}

impl fmt::Debug for TagDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagDefinition")
            .field("name", &self.name)
            .field("form", &self.form)
            .field("test", &self.test)
            .field("flags", &self.flags)
            .field("trim", &self.trim)
            .field("validate", &self.validate.is_some())
            .finish_non_exhaustive()
    }
}

impl TagDefinition {
    pub fn new(name: impl Into<Cow<'static, str>>, form: ContentForm) -> Self {
        Self {
            name: name.into(),
            form,
            test: None,
            parameters: vec![],
            before: None,
            after: None,
            content: None,
            disabled_before: None,
            disabled_after: None,
            disabled_content: None,
            flags: TagFlags::empty(),
            trim: Trim::None,
            require_parents: vec![],
            require_children: vec![],
            disallow_children: vec![],
            parsed_tags_allowed: None,
            validate: None,
        }
    }

    pub fn test(mut self, pattern: impl Into<Cow<'static, str>>) -> Self {
        self.test = Some(pattern.into());
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn before(mut self, template: impl Into<Cow<'static, str>>) -> Self {
        self.before = Some(template.into());
        self
    }

    pub fn after(mut self, template: impl Into<Cow<'static, str>>) -> Self {
        self.after = Some(template.into());
        self
    }

    pub fn content(mut self, template: impl Into<Cow<'static, str>>) -> Self {
        self.content = Some(template.into());
        self
    }

    pub fn disabled_before(mut self, template: impl Into<Cow<'static, str>>) -> Self {
        self.disabled_before = Some(template.into());
        self
    }

    pub fn disabled_after(mut self, template: impl Into<Cow<'static, str>>) -> Self {
        self.disabled_after = Some(template.into());
        self
    }

    pub fn disabled_content(mut self, template: impl Into<Cow<'static, str>>) -> Self {
        self.disabled_content = Some(template.into());
        self
    }

    pub fn flags(mut self, flags: TagFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn block_level(self) -> Self {
        self.flags(TagFlags::BLOCK_LEVEL)
    }

    pub fn trim(mut self, trim: Trim) -> Self {
        self.trim = trim;
        self
    }

    pub fn require_parents(mut self, names: &[&'static str]) -> Self {
        self.require_parents = names.iter().map(|&n| Cow::Borrowed(n)).collect();
        self
    }

    pub fn require_children(mut self, names: &[&'static str]) -> Self {
        self.require_children = names.iter().map(|&n| Cow::Borrowed(n)).collect();
        self
    }

    pub fn disallow_children(mut self, names: &[&'static str]) -> Self {
        self.disallow_children = names.iter().map(|&n| Cow::Borrowed(n)).collect();
        self
    }

    pub fn parsed_tags_allowed(mut self, names: &[&'static str]) -> Self {
        self.parsed_tags_allowed = Some(names.iter().map(|&n| Cow::Borrowed(n)).collect());
        self
    }

    pub fn validate<V: Validate + 'static>(mut self, hook: V) -> Self {
        self.validate = Some(Arc::new(hook));
        self
    }

    pub fn is_block_level(&self) -> bool {
        self.flags.contains(TagFlags::BLOCK_LEVEL)
    }

    pub fn is_autolink_exempt(&self) -> bool {
        self.flags.contains(TagFlags::AUTOLINK_EXEMPT)
    }

    pub fn is_smiley_exempt(&self) -> bool {
        self.flags
            .intersects(TagFlags::NO_SMILEYS | TagFlags::AUTOLINK_EXEMPT)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let valid_name = !self.name.is_empty() && self.name.chars().all(is_tag_name_char);
        if !valid_name || self.name.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::InvalidName(self.name.to_string()));
        }

        let missing = |template: &'static str| ConfigError::MissingTemplate {
            tag: self.name.to_string(),
            form: self.form,
            template,
        };

        if self.form.uses_content_template() {
            if self.content.is_none() {
                return Err(missing("content"));
            }
        } else if self.before.is_none() {
            return Err(missing("before"));
        } else if self.after.is_none() {
            return Err(missing("after"));
        }

        if self.form.takes_value() && !self.parameters.is_empty() {
            return Err(ConfigError::ParametersOnEqualsForm {
                tag: self.name.to_string(),
                form: self.form,
            });
        }

        Ok(())
    }
}

/// Characters allowed in a tag name.
pub(crate) fn is_tag_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '*' | '@' | '_')
}

/// Index of a definition inside its [TagTable].
pub(crate) type TagId = usize;

pub(crate) struct CompiledTag {
    pub def: TagDefinition,
    pub test: Option<Regex>,
    pub params: Vec<Option<Regex>>,
}

impl CompiledTag {
    pub fn splits_commas(&self) -> bool {
        self.def.form.splits_commas()
    }
}

/// The compiled, immutable grammar.
pub struct TagTable {
    tags: Vec<CompiledTag>,
    by_name: HashMap<String, Vec<TagId>>,
    no_autolink: HashSet<String>,
}

assert_impl_all!(TagTable: Send, Sync);

impl TagTable {
    /// Compile a table. Definitions sharing a name are tried in the order given.
    pub fn new(defs: impl IntoIterator<Item = TagDefinition>) -> Result<Self, ConfigError> {
        let mut tags = vec![];
        let mut by_name: HashMap<String, Vec<TagId>> = HashMap::new();
        let mut no_autolink = HashSet::new();

        for def in defs {
            def.check()?;

            let test = def
                .test
                .as_deref()
                .map(|pattern| compile(&def.name, pattern, false))
                .transpose()?;
            let params = def
                .parameters
                .iter()
                .map(|p| {
                    p.match_pattern
                        .as_deref()
                        .map(|pattern| compile(&def.name, pattern, true))
                        .transpose()
                })
                .collect::<Result<Vec<_>, _>>()?;

            if def.is_autolink_exempt() {
                no_autolink.insert(def.name.to_string());
            }

            by_name
                .entry(def.name.to_string())
                .or_default()
                .push(tags.len());
            tags.push(CompiledTag { def, test, params });
        }

        Ok(Self {
            tags,
            by_name,
            no_autolink,
        })
    }

    /// The built-in forum tag set.
    #[cfg(feature = "builtin_tags")]
    pub fn builtin(opts: &crate::html::builtins::BuiltinOptions) -> Self {
        Self::new(crate::html::builtins::default_tags(opts))
            .expect("built-in tag definitions are valid")
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Whether any definition uses this (lowercase) name.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All definitions, in table order.
    pub fn definitions(&self) -> impl Iterator<Item = &TagDefinition> {
        self.tags.iter().map(|t| &t.def)
    }

    /// Names whose body is never autolinked.
    pub fn no_autolink(&self) -> &HashSet<String> {
        &self.no_autolink
    }

    pub(crate) fn ids_for(&self, name: &str) -> &[TagId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn get(&self, id: TagId) -> &CompiledTag {
        &self.tags[id]
    }
}

impl fmt::Debug for TagTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagTable")
            .field("tags", &self.tags.len())
            .field("names", &self.by_name.len())
            .finish()
    }
}

fn compile(tag: &str, pattern: &str, whole: bool) -> Result<Regex, ConfigError> {
    let anchored = if whole {
        format!("^(?:{})$", pattern)
    } else {
        format!("^(?:{})", pattern)
    };

    RegexBuilder::new(&anchored)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::InvalidPattern {
            tag: tag.to_owned(),
            pattern: pattern.to_owned(),
            source,
        })
}

#[cfg(test)]
mod tests;
