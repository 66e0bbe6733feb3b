//! HTML rendering of a BBCode document.
//!
//! [HtmlSerializer] drives a [BBParser] over the input and keeps the open-tag stack.
//! Text between tags goes through the text-run passes, recognised tags through their
//! definition's validate hook and templates. Anything that cannot be rendered as
//! markup is written out as escaped text, so serialization never fails.
use std::{
    borrow::Cow,
    ops::Range,
    panic::{self, AssertUnwindSafe},
};

use crate::{
    config::{ParseConfig, ParseFeature},
    grammar::{CompiledTag, ContentForm, TagData, TagDefinition, TagTable, ValidateContext},
    parser::{
        log_fallback,
        rules::{CloseAction, OpenFrame, TagStack},
        BBParser, OpenTag, TokenKind,
    },
    Fallback,
};

use self::text::TextPass;

#[cfg(feature = "builtin_tags")]
pub mod builtins;
mod template;
mod text;

/// Serializes BBCode to HTML under one [ParseConfig].
#[derive(Clone, Copy)]
pub struct HtmlSerializer<'c> {
    config: &'c ParseConfig,
}

impl<'c> HtmlSerializer<'c> {
    pub fn new(config: &'c ParseConfig) -> Self {
        Self { config }
    }

    /// Serialize the given BBCode 'document' out to HTML.
    pub fn serialize(&self, input: &str) -> String {
        let input = self.prepare(input);
        let root = Scope {
            range: 0..input.len(),
            allowed: None,
            smileys: true,
            autolink: true,
        };
        Session::new(&input, self.config, root).run()
    }

    /// Whole-document rewrites that happen before scanning.
    fn prepare<'i>(&self, input: &'i str) -> Cow<'i, str> {
        let mut text = Cow::Borrowed(input);

        if self.config.features().contains(ParseFeature::CUT_PASTE_FIX) {
            if let Cow::Owned(fixed) = text::fix_cut_paste(&text) {
                text = Cow::Owned(fixed);
            }
        }

        if let Some(author) = self.config.author() {
            if self.config.tags().contains("me") {
                if let Cow::Owned(expanded) = text::expand_me_lines(&text, &author.name) {
                    text = Cow::Owned(expanded);
                }
            }
        }

        text
    }
}

/// The stretch of input one [Session] renders, and what it inherits from outside.
struct Scope<'a> {
    range: Range<usize>,
    allowed: Option<&'a [Cow<'static, str>]>,
    smileys: bool,
    autolink: bool,
}

/// State of one serialization: the scanner, the open tags and the output so far.
struct Session<'a> {
    input: &'a str,
    config: &'a ParseConfig,
    tags: &'a TagTable,
    scanner: BBParser<'a>,
    stack: TagStack<'a>,
    out: String,
    /// Literal text not yet written, always one contiguous input range.
    pending: Option<Range<usize>>,
    smileys: bool,
    autolink: bool,
}

impl<'a> Session<'a> {
    fn new(input: &'a str, config: &'a ParseConfig, scope: Scope<'a>) -> Self {
        let tags = config.tags();
        Self {
            input,
            config,
            tags,
            out: String::with_capacity(scope.range.len()),
            scanner: BBParser::with_range(input, tags, scope.range),
            stack: TagStack::new(tags, scope.allowed),
            pending: None,
            smileys: scope.smileys,
            autolink: scope.autolink,
        }
    }

    fn run(mut self) -> String {
        while let Some(token) = self.scanner.next() {
            let span = token.start..token.end();
            match token.kind {
                TokenKind::Text => self.push_text(span),
                TokenKind::Open(open) => self.open_tag(span, open),
                TokenKind::Close(name) => self.close_tag(&name, span),
            }
        }

        self.flush_text();
        if !self.stack.is_empty() {
            // Handle any dangling tags.
            let end = self.scanner.end();
            self.close_frames(0, end, end);
        }

        self.out
    }

    fn line_breaks(&self) -> bool {
        self.config.features().contains(ParseFeature::LINE_BREAKS)
    }

    /// Text passes for the current position, narrowed by `def` when rendering its body.
    fn text_pass(&self, def: Option<&TagDefinition>) -> TextPass<'a> {
        let smileys = self.smileys
            && self.stack.smileys_allowed()
            && !def.map_or(false, |d| d.is_smiley_exempt());
        let autolink = self.autolink
            && self.stack.autolink_allowed()
            && !def.map_or(false, |d| self.tags.no_autolink().contains(&*d.name));
        TextPass::new(self.config, smileys, autolink)
    }

    fn push_text(&mut self, span: Range<usize>) {
        match &mut self.pending {
            Some(pending) if pending.end == span.start => pending.end = span.end,
            _ => {
                self.flush_text();
                self.pending = Some(span);
            }
        }
    }

    fn flush_text(&mut self) {
        if let Some(range) = self.pending.take() {
            let pass = self.text_pass(None);
            pass.render(&self.input[range], &mut self.out);
        }
    }

    /// Strip trailing whitespace and line breaks from the output, down to `floor`.
    fn trim_output(&mut self, floor: usize) {
        loop {
            let trimmed = self.out.trim_end().len().max(floor);
            self.out.truncate(trimmed);
            if self.out.len() >= floor + "<br>".len() && self.out.ends_with("<br>") {
                self.out.truncate(self.out.len() - "<br>".len());
            } else {
                break;
            }
        }
    }

    /// Whitespace handling after a tag that has just been fully written.
    fn after_tag(&mut self, def: &TagDefinition) {
        if def.trim.outside() {
            self.scanner.skip_whitespace();
        } else if def.is_block_level() && self.line_breaks() {
            self.scanner.skip_newline();
        }
    }

    /// The open tag becomes text and scanning resumes right after it.
    fn reject(&mut self, def: &TagDefinition, start: usize, head_end: usize, reason: Fallback) {
        log_fallback(&def.name, start, reason);
        self.scanner.seek(head_end);
        self.push_text(start..head_end);
    }

    fn open_tag(&mut self, span: Range<usize>, open: OpenTag) {
        let tags = self.tags;
        let tag = tags.get(open.id);
        let def = &tag.def;

        if let Err(reason) = self.stack.check_open(def) {
            return self.reject(def, span.start, open.head_end, reason);
        }
        self.flush_text();

        let disabled = self.config.is_disabled(&def.name) || self.stack.inherits_disabled(def);
        let mut data = self.extract(tag, &open);
        if let Err(reason) = self.validate(def, &mut data, disabled) {
            return self.reject(def, span.start, open.head_end, reason);
        }

        if def.trim.outside() {
            self.trim_output(self.stack.content_floor());
        }
        self.stack.observe_child(open.id);

        if def.form.uses_content_template() {
            let template = match (disabled, def.disabled_content.as_deref()) {
                (false, _) => def.content.as_deref().unwrap_or_default(),
                (true, Some(fallback)) => fallback,
                (true, None) if def.is_block_level() => "<div>$1</div>",
                (true, None) => "$1",
            };
            let pass = self.text_pass(Some(def));
            template::render(template, tag, &data, &pass, &mut self.out);
            self.after_tag(def);
            return;
        }

        let (before, after) = if disabled {
            let default = if def.is_block_level() {
                ("<div>", "</div>")
            } else {
                ("", "")
            };
            (
                def.disabled_before.as_deref().unwrap_or(default.0),
                def.disabled_after.as_deref().unwrap_or(default.1),
            )
        } else {
            (
                def.before.as_deref().unwrap_or_default(),
                def.after.as_deref().unwrap_or_default(),
            )
        };

        let pass = self.text_pass(Some(def)).plain();
        let out_start = self.out.len();
        template::render(before, tag, &data, &pass, &mut self.out);
        let content_start = self.out.len();
        let mut rendered_after = String::new();
        template::render(after, tag, &data, &pass, &mut rendered_after);

        self.stack.push(OpenFrame {
            def,
            raw_param: open.value.clone(),
            lexeme_start: span.start,
            out_start,
            content_start,
            after: rendered_after,
            children: vec![],
            disabled,
        });

        if def.trim.inside() {
            self.scanner.skip_whitespace();
        } else if def.is_block_level() && self.line_breaks() {
            self.scanner.skip_newline();
        }
    }

    /// Collect the data a validate hook and the templates see.
    fn extract(&self, tag: &'a CompiledTag, open: &OpenTag) -> TagData {
        let def = &tag.def;
        let mut data = TagData {
            params: open.params.clone(),
            ..Default::default()
        };

        if let Some(body) = &open.body {
            data.content = self.input[body.clone()].to_owned();
        }

        if let Some(range) = &open.value {
            let raw = &self.input[range.clone()];
            if def.form == ContentForm::ParsedEquals {
                data.values = vec![self.parse_value(def, range.clone())];
                data.values_are_html = true;
            } else if tag.splits_commas() {
                data.values = raw.split(',').map(|v| v.trim().to_owned()).collect();
            } else {
                data.values = vec![raw.trim().to_owned()];
            }
        }

        data
    }

    /// Render the value of a [ContentForm::ParsedEquals] tag as BBCode of its own.
    fn parse_value(&self, def: &'a TagDefinition, range: Range<usize>) -> String {
        let scope = Scope {
            range,
            allowed: def.parsed_tags_allowed.as_deref(),
            smileys: self.smileys && self.stack.smileys_allowed() && !def.is_smiley_exempt(),
            autolink: self.autolink
                && self.stack.autolink_allowed()
                && !self.tags.no_autolink().contains(&*def.name),
        };
        Session::new(self.input, self.config, scope).run()
    }

    fn validate(&self, def: &TagDefinition, data: &mut TagData, disabled: bool) -> Result<(), Fallback> {
        let Some(hook) = &def.validate else {
            return Ok(());
        };

        let cx = ValidateContext {
            tag: &def.name,
            disabled,
            config: self.config,
        };

        match panic::catch_unwind(AssertUnwindSafe(|| hook.validate(data, &cx))) {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    target: "bbc.parser",
                    "validate hook for [{}] panicked, rendering the tag as text",
                    def.name
                );
                Err(Fallback::ValidatorFailure)
            }
        }
    }

    fn close_tag(&mut self, name: &str, span: Range<usize>) {
        match self.stack.resolve_close(name) {
            CloseAction::Literal(reason) => {
                log_fallback(name, span.start, reason);
                self.push_text(span);
            }
            CloseAction::CloseTo(target) => {
                self.flush_text();
                let def = self.stack.frame(target).def;
                if self.close_frames(target, span.end, span.start) {
                    self.after_tag(def);
                }
            }
        }
    }

    /// Close every frame from the top down to `target`. `target_end` is where the
    /// target's own span ends (after its close tag, or the end of input); `boundary`
    /// is where the frames above it were cut off.
    ///
    /// A frame with unmet `require_children` is replaced, together with everything
    /// above it, by the literal text of its span. Returns whether the target itself
    /// was rendered as markup.
    fn close_frames(&mut self, target: usize, target_end: usize, boundary: usize) -> bool {
        let unsatisfied = self.stack.first_unsatisfied(target);

        if let Some(lowest) = unsatisfied {
            let mut rejected = None;
            while self.stack.len() > lowest {
                rejected = self.stack.pop();
            }

            if let Some(frame) = rejected {
                let end = if lowest == target { target_end } else { boundary };
                log_fallback(frame.name(), frame.lexeme_start, Fallback::ConstraintViolation);
                self.out.truncate(frame.out_start);
                self.push_text(frame.lexeme_start..end);
                self.flush_text();
            }
        }

        while self.stack.len() > target {
            if let Some(frame) = self.stack.pop() {
                self.finish_frame(frame);
            }
        }

        unsatisfied != Some(target)
    }

    fn finish_frame(&mut self, frame: OpenFrame<'a>) {
        if frame.def.trim.inside() {
            self.trim_output(frame.content_start);
        }
        log::trace!(
            target: "bbc.parser",
            "closing [{}] opened at byte {} (param {:?})",
            frame.name(),
            frame.lexeme_start,
            frame.raw_param.clone().map(|r| &self.input[r])
        );
        self.out.push_str(&frame.after);
    }
}
