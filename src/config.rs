//! Per-site parse configuration.
use std::{collections::HashSet, fmt, sync::Arc};

use bitflags::bitflags;
use static_assertions::{assert_impl_all, assert_obj_safe};

use crate::grammar::TagTable;

bitflags! {
    /// Site-wide toggles for a parse.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ParseFeature: u32 {
        /// Replace smiley codes with images.
        const SMILEYS = 1 << 0;
        /// Turn bare URLs and e-mail addresses into links.
        const AUTOLINK = 1 << 1;
        /// Replace word-processor punctuation with plain ASCII before scanning.
        const CUT_PASTE_FIX = 1 << 2;
        /// Render newlines as `<br>`.
        const LINE_BREAKS = 1 << 3;
        /// Let the `html` tag pass its body through unescaped.
        const RAW_HTML = 1 << 4;

        /// All current and future feature flags.
        const ALL = u32::MAX;
    }
}

impl Default for ParseFeature {
    fn default() -> Self {
        ParseFeature::SMILEYS | ParseFeature::AUTOLINK | ParseFeature::CUT_PASTE_FIX
    }
}

/// One smiley: the code users type and the image that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smiley {
    pub code: String,
    pub filename: String,
    pub description: String,
}

impl Smiley {
    pub fn new(code: &str, filename: &str, description: &str) -> Self {
        Self {
            code: code.to_owned(),
            filename: filename.to_owned(),
            description: description.to_owned(),
        }
    }
}

/// Smiley lookup, longest code first so `::)` wins over `:)`.
#[derive(Debug, Clone, Default)]
pub struct SmileyTable {
    base_url: String,
    smileys: Vec<Smiley>,
}

impl SmileyTable {
    pub fn new(base_url: impl Into<String>, smileys: impl IntoIterator<Item = Smiley>) -> Self {
        let mut smileys: Vec<Smiley> = smileys
            .into_iter()
            .filter(|s| !s.code.is_empty())
            .collect();
        smileys.sort_by(|a, b| b.code.len().cmp(&a.code.len()));

        Self {
            base_url: base_url.into(),
            smileys,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_empty(&self) -> bool {
        self.smileys.is_empty()
    }

    /// The smiley whose code starts `text`, if any.
    pub fn match_at(&self, text: &str) -> Option<&Smiley> {
        self.smileys.iter().find(|s| text.starts_with(&s.code))
    }
}

/// What kind of external resource a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Link,
    Image,
    Video,
}

/// Injected URL policy, e.g. routing remote images through a proxy.
pub trait UrlRewrite: Send + Sync {
    /// Returns the URL to emit instead, or `None` to keep it.
    fn rewrite(&self, url: &str, kind: ResourceKind) -> Option<String>;
}

impl<F> UrlRewrite for F
where
    F: Fn(&str, ResourceKind) -> Option<String> + Send + Sync,
{
    fn rewrite(&self, url: &str, kind: ResourceKind) -> Option<String> {
        self(url, kind)
    }
}

assert_obj_safe!(UrlRewrite);

/// The member whose post is being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorContext {
    pub id: u64,
    pub name: String,
}

/// Everything one parse reads. Build once per site configuration and share.
#[derive(Clone)]
pub struct ParseConfig {
    tags: Arc<TagTable>,
    disabled: HashSet<String>,
    smileys: SmileyTable,
    features: ParseFeature,
    url_rewrite: Option<Arc<dyn UrlRewrite>>,
    author: Option<AuthorContext>,
    cache_key: Option<String>,
}

assert_impl_all!(ParseConfig: Send, Sync);

impl ParseConfig {
    pub fn new(tags: impl Into<Arc<TagTable>>) -> Self {
        Self {
            tags: tags.into(),
            disabled: HashSet::new(),
            smileys: SmileyTable::default(),
            features: ParseFeature::default(),
            url_rewrite: None,
            author: None,
            cache_key: None,
        }
    }

    /// A configuration over the built-in tag set with default options.
    #[cfg(feature = "builtin_tags")]
    pub fn builtin() -> Self {
        Self::new(TagTable::builtin(&Default::default()))
    }

    /// Tags rendered with their disabled templates. Names are matched case-insensitively.
    pub fn with_disabled<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.disabled = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_ascii_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        self
    }

    pub fn with_smileys(mut self, smileys: SmileyTable) -> Self {
        self.smileys = smileys;
        self
    }

    pub fn with_features(mut self, features: ParseFeature) -> Self {
        self.features = features;
        self
    }

    pub fn with_url_rewrite<R: UrlRewrite + 'static>(mut self, rewrite: R) -> Self {
        self.url_rewrite = Some(Arc::new(rewrite));
        self
    }

    pub fn with_author(mut self, author: AuthorContext) -> Self {
        self.author = Some(author);
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn tags(&self) -> &TagTable {
        &self.tags
    }

    pub fn disabled_tags(&self) -> &HashSet<String> {
        &self.disabled
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    pub fn smileys(&self) -> &SmileyTable {
        &self.smileys
    }

    pub fn features(&self) -> ParseFeature {
        self.features
    }

    pub fn smileys_enabled(&self) -> bool {
        self.features.contains(ParseFeature::SMILEYS) && !self.smileys.is_empty()
    }

    pub fn allow_raw_html(&self) -> bool {
        self.features.contains(ParseFeature::RAW_HTML)
    }

    pub fn author(&self) -> Option<&AuthorContext> {
        self.author.as_ref()
    }

    /// Opaque key callers use to cache rendered output; the engine only carries it.
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// Run the injected rewrite, falling back to the URL unchanged.
    pub fn rewrite_url(&self, url: String, kind: ResourceKind) -> String {
        match &self.url_rewrite {
            Some(rewrite) => rewrite.rewrite(&url, kind).unwrap_or(url),
            None => url,
        }
    }
}

impl fmt::Debug for ParseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseConfig")
            .field("tags", &self.tags)
            .field("disabled", &self.disabled)
            .field("smileys", &self.smileys)
            .field("features", &self.features)
            .field("url_rewrite", &self.url_rewrite.is_some())
            .field("author", &self.author)
            .field("cache_key", &self.cache_key)
            .finish()
    }
}
