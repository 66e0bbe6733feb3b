//! The scanner: splits input into text runs, recognised open tags and close tags.
//!
//! Recognition only answers "is this a tag of the grammar, and which definition".
//! Whether the tag may appear where it stands is the job of [rules].
use std::{collections::HashMap, ops::Range};

use crate::{
    grammar::{is_tag_name_char, TagFlags, TagId, TagTable},
    Fallback,
};

mod params;
pub(crate) mod rules;

/// A recognised open tag, with everything extraction needed to pick its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTag {
    pub(crate) id: TagId,
    /// End of the `[tag...]` lexeme.
    pub(crate) head_end: usize,
    /// The `=` value, without quotes.
    pub(crate) value: Option<Range<usize>>,
    /// Present named parameters in declaration order.
    pub(crate) params: Vec<(String, String)>,
    /// Verbatim body of unparsed-body forms.
    pub(crate) body: Option<Range<usize>>,
}

impl OpenTag {
    pub fn head_end(&self) -> usize {
        self.head_end
    }

    pub fn body(&self) -> Option<Range<usize>> {
        self.body.clone()
    }

    pub fn value(&self) -> Option<Range<usize>> {
        self.value.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    /// `[name...]`, plus the body and close tag for unparsed-body forms.
    Open(OpenTag),
    /// `[/name]`, with the lowercased name.
    Close(String),
}

#[derive(Debug, Clone)]
pub struct Token<'a> {
    pub span: &'a str,
    pub start: usize,
    pub kind: TokenKind,
}

impl<'a> Token<'a> {
    pub fn is_text(&self) -> bool {
        matches!(self.kind, TokenKind::Text)
    }

    pub fn is_open(&self, tags: &TagTable, name: &str) -> bool {
        match &self.kind {
            TokenKind::Open(open) => tags.get(open.id).def.name.eq_ignore_ascii_case(name),
            _ => false,
        }
    }

    pub fn is_close(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Close(n) if n.eq_ignore_ascii_case(name))
    }

    pub fn end(&self) -> usize {
        self.start + self.span.len()
    }
}

/// Cached result of a forward search. Valid for any later query starting between
/// `from` and the hit, since nothing matched in that stretch.
#[derive(Debug, Clone, Copy)]
struct SearchMemo {
    from: usize,
    found: Option<usize>,
}

/// Everything the scanner searches forward for.
const NEEDLES: [&str; 3] = ["]", "\"]", "["];

/// Grammar-aware BBCode tokenizer over `input[start..end]`.
///
/// Every search it does is memoised, so a scan over adversarial input stays linear:
/// no byte is searched twice for the same needle, and the nested same-name matching
/// for verbatim bodies pairs every open tag at most once.
#[doc(alias = "scanner")]
pub struct BBParser<'a> {
    input: &'a str,
    tags: &'a TagTable,
    loc: usize,
    end: usize,
    /// One memo per entry of [NEEDLES].
    searches: [Option<SearchMemo>; NEEDLES.len()],
    verbatim_close: HashMap<String, HashMap<usize, Option<usize>>>,
}

impl<'a> BBParser<'a> {
    pub fn new(input: &'a str, tags: &'a TagTable) -> BBParser<'a> {
        Self::with_range(input, tags, 0..input.len())
    }

    /// Scan only `range` of `input`. Offsets in tokens stay absolute.
    pub fn with_range(input: &'a str, tags: &'a TagTable, range: Range<usize>) -> BBParser<'a> {
        Self {
            input,
            tags,
            loc: range.start,
            end: range.end,
            searches: [None; NEEDLES.len()],
            verbatim_close: HashMap::new(),
        }
    }

    /// Returns all input text left to parse
    pub fn remaining(&self) -> &'a str {
        &self.input[self.loc..self.end]
    }

    pub fn position(&self) -> usize {
        self.loc
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Resume scanning at `loc`, e.g. right after an open tag that was rejected.
    pub(crate) fn seek(&mut self, loc: usize) {
        self.loc = loc.min(self.end);
    }

    /// Skip whitespace after a trimmed tag.
    pub(crate) fn skip_whitespace(&mut self) {
        let rest = self.remaining();
        self.loc += rest.len() - rest.trim_start().len();
    }

    /// Swallow one line break after a block-level tag.
    pub(crate) fn skip_newline(&mut self) {
        let rest = self.remaining();
        if rest.starts_with("\r\n") {
            self.loc += 2;
        } else if rest.starts_with('\n') {
            self.loc += 1;
        }
    }

    fn find(&mut self, from: usize, needle: &'static str) -> Option<usize> {
        let slot = NEEDLES.iter().position(|&n| n == needle).unwrap_or(0);
        let memo = &mut self.searches[slot];

        if let Some(m) = *memo {
            if from >= m.from && m.found.map_or(true, |hit| from <= hit) {
                return m.found;
            }
        }

        let found = self.input[from..self.end].find(needle).map(|i| i + from);
        *memo = Some(SearchMemo { from, found });
        found
    }

    /// Try to read a tag at `self.loc`, which holds a `[`.
    fn tag_at(&mut self) -> Option<(TokenKind, usize)> {
        let start = self.loc;
        let after_open = start + 1;
        let rest = &self.input[after_open..self.end];

        if let Some(closing) = rest.strip_prefix('/') {
            let len = closing
                .find(|c: char| !is_tag_name_char(c))
                .unwrap_or(closing.len());
            let name = closing[..len].to_ascii_lowercase();
            if len == 0 || !closing[len..].starts_with(']') || !self.tags.contains(&name) {
                return None;
            }
            return Some((TokenKind::Close(name), after_open + 1 + len + 1));
        }

        let len = rest
            .find(|c: char| !is_tag_name_char(c))
            .unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        let name = rest[..len].to_ascii_lowercase();
        let name_end = after_open + len;

        let tags = self.tags;
        for &id in tags.ids_for(&name) {
            if let Some(open) = self.match_definition(id, start, name_end) {
                let end = match &open.body {
                    Some(body) => body.end + "[/]".len() + len,
                    None => open.head_end,
                };
                return Some((TokenKind::Open(open), end));
            }
        }

        None
    }

    /// Check whether definition `id` fits the tag whose name ends at `name_end`.
    fn match_definition(&mut self, id: TagId, start: usize, name_end: usize) -> Option<OpenTag> {
        let tags = self.tags;
        let tag = tags.get(id);
        let def = &tag.def;
        let sep = self.input[name_end..self.end].chars().next()?;

        let mut value = None;
        let mut params = vec![];

        // Where the test pattern looks, and where the open tag ends.
        let (test_from, head_end) = if def.form.takes_value() {
            if sep != '=' {
                return None;
            }
            let value_start = name_end + 1;
            let quoted = def.flags.contains(TagFlags::QUOTED_VALUE)
                && self.input[value_start..self.end].starts_with('"');

            if quoted {
                let close = self.find(value_start + 1, "\"]")?;
                value = Some(value_start + 1..close);
                (value_start, close + 2)
            } else {
                let close = self.find(value_start, "]")?;
                value = Some(value_start..close);
                (value_start, close + 1)
            }
        } else if !def.parameters.is_empty() && sep != ']' {
            if !sep.is_whitespace() {
                return None;
            }
            let close = self.find(name_end, "]")?;
            // A parameter section never spans another tag.
            if self.find(name_end, "[").map_or(false, |bracket| bracket < close) {
                return None;
            }
            params = params::extract(&self.input[name_end..close], tag).ok()?;
            (name_end + sep.len_utf8(), close + 1)
        } else if sep == ']' {
            if def.parameters.iter().any(|p| !p.optional) {
                return None;
            }
            (name_end, name_end + 1)
        } else {
            return None;
        };

        if let Some(test) = &tag.test {
            if !test.is_match(&self.input[test_from..head_end]) {
                return None;
            }
        }

        let body = if def.form.has_unparsed_body() {
            let close = self.matching_close(&def.name, start, head_end)?;
            Some(head_end..close)
        } else {
            None
        };

        Some(OpenTag {
            id,
            head_end,
            value,
            params,
            body,
        })
    }

    /// Find the `[/name]` closing the verbatim body opened at `open`, skipping nested
    /// `[name]...[/name]` pairs. Every pairing discovered on the way is remembered.
    fn matching_close(&mut self, name: &str, open: usize, head_end: usize) -> Option<usize> {
        let memo = self.verbatim_close.entry(name.to_owned()).or_default();
        if let Some(found) = memo.get(&open) {
            return *found;
        }

        let input = self.input;
        let mut stack = vec![open];
        let mut pos = head_end;

        while let Some(idx) = input[pos..self.end].find('[').map(|i| i + pos) {
            let rest = &input[idx + 1..self.end];

            let closes = rest
                .strip_prefix('/')
                .and_then(|r| strip_name(r, name))
                .map_or(false, |r| r.starts_with(']'));

            if closes {
                let Some(opened) = stack.pop() else {
                    break;
                };
                memo.insert(opened, Some(idx));
                if stack.is_empty() {
                    return Some(idx);
                }
                pos = idx + "[/]".len() + name.len();
            } else if strip_name(rest, name)
                .and_then(|r| r.chars().next())
                .map_or(false, |c| c == ']' || c == '=' || c.is_whitespace())
            {
                stack.push(idx);
                pos = idx + 1 + name.len();
            } else {
                pos = idx + 1;
            }
        }

        for unmatched in stack {
            memo.insert(unmatched, None);
        }
        None
    }
}

/// `text` without a leading, case-insensitive `name`.
fn strip_name<'t>(text: &'t str, name: &str) -> Option<&'t str> {
    let head = text.get(..name.len())?;
    head.eq_ignore_ascii_case(name).then(|| &text[name.len()..])
}

impl<'a> Iterator for BBParser<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.loc >= self.end {
            return None;
        }

        let start = self.loc;
        let first = self.remaining().chars().next()?;
        if first == '[' {
            if let Some((kind, end)) = self.tag_at() {
                self.loc = end;
                return Some(Token {
                    span: &self.input[start..end],
                    start,
                    kind,
                });
            }
        }

        // A `[` that opens nothing stays in the text run.
        let from = start + first.len_utf8();
        let segment_end = self.input[from..self.end]
            .find('[')
            .map(|i| i + from)
            .unwrap_or(self.end);
        self.loc = segment_end;

        Some(Token {
            span: &self.input[start..segment_end],
            start,
            kind: TokenKind::Text,
        })
    }
}

/// Reason a recognised open tag still turned into text; logged by the renderer.
pub(crate) fn log_fallback(name: &str, at: usize, reason: Fallback) {
    log::debug!(target: "bbc.parser", "[{}] at byte {} rendered as text: {}", name, at, reason);
}

#[cfg(test)]
mod tests;
