//! Nesting rules: the stack of open tags and the constraints checked against it.
use std::{borrow::Cow, collections::HashMap, ops::Range};

use crate::{
    grammar::{TagDefinition, TagId, TagTable},
    Fallback,
};

/// A tag whose body is still being parsed.
#[derive(Debug)]
pub(crate) struct OpenFrame<'t> {
    pub def: &'t TagDefinition,
    /// The raw `=` value, if the tag had one.
    pub raw_param: Option<Range<usize>>,
    /// Where the open tag starts in the input.
    pub lexeme_start: usize,
    /// Output length before the open tag was rendered.
    pub out_start: usize,
    /// Output length after the open tag was rendered.
    pub content_start: usize,
    /// Rendered close template, written when the frame closes.
    pub after: String,
    /// Names of the tags opened directly inside this one.
    pub children: Vec<&'t str>,
    pub disabled: bool,
}

impl<'t> OpenFrame<'t> {
    pub fn name(&self) -> &'t str {
        &self.def.name
    }

    /// `require_children` holds if it is empty or any child is listed.
    pub fn children_satisfied(&self) -> bool {
        let required = &self.def.require_children;
        required.is_empty() || self.children.iter().any(|c| required.iter().any(|r| r == c))
    }
}

/// How a `[/name]` relates to the open tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseAction {
    /// Close every frame from the top down to and including this index.
    CloseTo(usize),
    /// Nothing to close, or a block-level frame stands in the way.
    Literal(Fallback),
}

/// The open-tag stack, with per-name bookkeeping so every check is O(1) in the
/// stack depth.
pub(crate) struct TagStack<'t> {
    tags: &'t TagTable,
    frames: Vec<OpenFrame<'t>>,
    /// Stack indices of open frames, by name.
    open_by_name: HashMap<&'t str, Vec<usize>>,
    /// How many open frames forbid each name.
    disallowed: HashMap<&'t str, usize>,
    /// Stack indices of block-level frames.
    blocks: Vec<usize>,
    /// Allow-list of a parsed `=` value being rendered on its own.
    base_allowed: Option<&'t [Cow<'static, str>]>,
    no_autolink: usize,
    no_smileys: usize,
}

impl<'t> TagStack<'t> {
    pub fn new(tags: &'t TagTable, base_allowed: Option<&'t [Cow<'static, str>]>) -> Self {
        Self {
            tags,
            frames: vec![],
            open_by_name: HashMap::new(),
            disallowed: HashMap::new(),
            blocks: vec![],
            base_allowed,
            no_autolink: 0,
            no_smileys: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn top(&self) -> Option<&OpenFrame<'t>> {
        self.frames.last()
    }

    pub fn frame(&self, idx: usize) -> &OpenFrame<'t> {
        &self.frames[idx]
    }

    pub fn autolink_allowed(&self) -> bool {
        self.no_autolink == 0
    }

    pub fn smileys_allowed(&self) -> bool {
        self.no_smileys == 0
    }

    /// Output offset below which trimming must not reach.
    pub fn content_floor(&self) -> usize {
        self.top().map_or(0, |f| f.content_start)
    }

    /// May `def` open here?
    pub fn check_open(&self, def: &TagDefinition) -> Result<(), Fallback> {
        let name: &str = &def.name;
        let listed = |list: &[Cow<'static, str>]| list.iter().any(|n| n == name);

        if let Some(allowed) = self.base_allowed {
            if !listed(allowed) {
                return Err(Fallback::ConstraintViolation);
            }
        }

        if !def.require_parents.is_empty() {
            let parent_ok = self
                .top()
                .map_or(false, |parent| def.require_parents.iter().any(|p| p == parent.name()));
            if !parent_ok {
                return Err(Fallback::ConstraintViolation);
            }
        }

        if self.disallowed.get(name).copied().unwrap_or(0) > 0 {
            return Err(Fallback::ConstraintViolation);
        }

        Ok(())
    }

    /// A tag that requires its parent renders disabled when that parent does.
    pub fn inherits_disabled(&self, def: &TagDefinition) -> bool {
        self.top().map_or(false, |parent| {
            parent.disabled && def.require_parents.iter().any(|p| p == parent.name())
        })
    }

    /// Record a tag that opened directly inside the current top frame.
    pub fn observe_child(&mut self, id: TagId) {
        let name: &'t str = &self.tags.get(id).def.name;
        if let Some(top) = self.frames.last_mut() {
            if !top.children.contains(&name) {
                top.children.push(name);
            }
        }
    }

    pub fn push(&mut self, frame: OpenFrame<'t>) {
        let idx = self.frames.len();
        let def = frame.def;

        self.open_by_name.entry(frame.name()).or_default().push(idx);
        for name in &def.disallow_children {
            *self.disallowed.entry(&**name).or_default() += 1;
        }
        if def.is_block_level() {
            self.blocks.push(idx);
        }
        if def.is_autolink_exempt() {
            self.no_autolink += 1;
        }
        if def.is_smiley_exempt() {
            self.no_smileys += 1;
        }

        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<OpenFrame<'t>> {
        let frame = self.frames.pop()?;
        let idx = self.frames.len();
        let def = frame.def;

        if let Some(open) = self.open_by_name.get_mut(frame.name()) {
            open.pop();
        }
        for name in &def.disallow_children {
            if let Some(count) = self.disallowed.get_mut(&**name) {
                *count -= 1;
            }
        }
        if self.blocks.last() == Some(&idx) {
            self.blocks.pop();
        }
        if def.is_autolink_exempt() {
            self.no_autolink -= 1;
        }
        if def.is_smiley_exempt() {
            self.no_smileys -= 1;
        }

        Some(frame)
    }

    /// Decide what `[/name]` closes. Inline frames opened after the target get
    /// force-closed; a block-level one in between makes the close tag literal.
    pub fn resolve_close(&self, name: &str) -> CloseAction {
        let Some(&target) = self.open_by_name.get(name).and_then(|v| v.last()) else {
            return CloseAction::Literal(Fallback::MalformedTag);
        };

        match self.blocks.last() {
            Some(&block) if block > target => CloseAction::Literal(Fallback::ConstraintViolation),
            _ => CloseAction::CloseTo(target),
        }
    }

    /// The lowest frame in `from..` whose `require_children` is unmet. Everything from
    /// there up turns into literal text, so frames above it need no check of their own.
    pub fn first_unsatisfied(&self, from: usize) -> Option<usize> {
        (from..self.frames.len()).find(|&idx| !self.frames[idx].children_satisfied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{ContentForm, TagDefinition, TagTable};

    fn table() -> TagTable {
        TagTable::new([
            TagDefinition::new("b", ContentForm::Simple)
                .before("<b>")
                .after("</b>"),
            TagDefinition::new("quote", ContentForm::Simple)
                .before("<blockquote>")
                .after("</blockquote>")
                .block_level(),
            TagDefinition::new("list", ContentForm::Simple)
                .before("<ul>")
                .after("</ul>")
                .require_children(&["li"])
                .block_level(),
            TagDefinition::new("li", ContentForm::Simple)
                .before("<li>")
                .after("</li>")
                .require_parents(&["list"]),
            TagDefinition::new("url", ContentForm::UnparsedEquals)
                .before("<a>")
                .after("</a>")
                .disallow_children(&["url"]),
        ])
        .unwrap()
    }

    fn frame<'t>(tags: &'t TagTable, name: &str) -> OpenFrame<'t> {
        OpenFrame {
            def: def(tags, name),
            raw_param: None,
            lexeme_start: 0,
            out_start: 0,
            content_start: 0,
            after: String::new(),
            children: vec![],
            disabled: false,
        }
    }

    fn def<'t>(tags: &'t TagTable, name: &str) -> &'t TagDefinition {
        &tags.get(tags.ids_for(name)[0]).def
    }

    #[test]
    fn require_parents_checks_the_direct_parent() {
        let tags = table();
        let mut stack = TagStack::new(&tags, None);
        assert_eq!(
            stack.check_open(def(&tags, "li")),
            Err(Fallback::ConstraintViolation)
        );

        stack.push(frame(&tags, "list"));
        assert_eq!(stack.check_open(def(&tags, "li")), Ok(()));

        stack.push(frame(&tags, "b"));
        assert!(stack.check_open(def(&tags, "li")).is_err());
    }

    #[test]
    fn disallow_children_holds_for_the_whole_body() {
        let tags = table();
        let mut stack = TagStack::new(&tags, None);
        stack.push(frame(&tags, "url"));
        stack.push(frame(&tags, "b"));
        assert!(stack.check_open(def(&tags, "url")).is_err());

        stack.pop();
        stack.pop();
        assert!(stack.check_open(def(&tags, "url")).is_ok());
    }

    #[test]
    fn allow_lists_bind_only_the_base_scope() {
        let tags = TagTable::new([
            TagDefinition::new("b", ContentForm::Simple)
                .before("<b>")
                .after("</b>"),
            TagDefinition::new("quote", ContentForm::ParsedEquals)
                .before("<blockquote>$1")
                .after("</blockquote>")
                .parsed_tags_allowed(&["url"]),
        ])
        .unwrap();
        let quote = def(&tags, "quote");

        let mut stack = TagStack::new(&tags, None);
        stack.push(frame(&tags, "quote"));
        assert_eq!(stack.check_open(def(&tags, "b")), Ok(()));

        let value = TagStack::new(&tags, quote.parsed_tags_allowed.as_deref());
        assert_eq!(
            value.check_open(def(&tags, "b")),
            Err(Fallback::ConstraintViolation)
        );
    }

    #[test]
    fn close_across_block_is_literal() {
        let tags = table();
        let mut stack = TagStack::new(&tags, None);
        stack.push(frame(&tags, "b"));
        stack.push(frame(&tags, "quote"));
        assert_eq!(
            stack.resolve_close("b"),
            CloseAction::Literal(Fallback::ConstraintViolation)
        );
        assert_eq!(stack.resolve_close("quote"), CloseAction::CloseTo(1));
        assert_eq!(
            stack.resolve_close("li"),
            CloseAction::Literal(Fallback::MalformedTag)
        );
    }

    #[test]
    fn inline_frames_close_out_of_order() {
        let tags = table();
        let mut stack = TagStack::new(&tags, None);
        stack.push(frame(&tags, "quote"));
        stack.push(frame(&tags, "b"));
        stack.push(frame(&tags, "url"));
        assert_eq!(stack.resolve_close("quote"), CloseAction::CloseTo(0));
        assert_eq!(stack.resolve_close("b"), CloseAction::CloseTo(1));
    }

    #[test]
    fn unmet_children_are_found_from_the_bottom() {
        let tags = table();
        let mut stack = TagStack::new(&tags, None);
        stack.push(frame(&tags, "list"));
        stack.push(frame(&tags, "list"));
        stack.observe_child(tags.ids_for("li")[0]);
        assert_eq!(stack.first_unsatisfied(0), Some(0));
        assert_eq!(stack.first_unsatisfied(1), None);
    }
}
