//! Template substitution: `$1`..`$n` positional slots and `{param}` named slots.
use crate::grammar::{CompiledTag, ContentForm, TagData};

use super::text::{push_escaped, TextPass};

enum Slot {
    Content,
    Value(usize),
}

fn positional(form: ContentForm, n: usize) -> Option<Slot> {
    match (form, n) {
        (_, 0) => None,
        (ContentForm::Simple | ContentForm::Closed, _) => None,
        (ContentForm::UnparsedContent, 1) => Some(Slot::Content),
        (ContentForm::UnparsedContent, _) => None,
        (ContentForm::UnparsedCommasContent | ContentForm::UnparsedEqualsContent, 1) => {
            Some(Slot::Content)
        }
        (ContentForm::UnparsedCommasContent | ContentForm::UnparsedEqualsContent, n) => {
            Some(Slot::Value(n - 2))
        }
        (
            ContentForm::UnparsedEquals | ContentForm::ParsedEquals | ContentForm::UnparsedCommas,
            n,
        ) => Some(Slot::Value(n - 1)),
    }
}

/// Write `template` with the tag's data substituted. Templates are trusted markup;
/// everything substituted into them is escaped unless the data says it is HTML.
/// `content` renders the verbatim body through the text-run passes.
pub(crate) fn render(
    template: &str,
    tag: &CompiledTag,
    data: &TagData,
    content: &TextPass<'_>,
    out: &mut String,
) {
    let mut rest = template;

    while let Some(idx) = rest.find(['$', '{']) {
        out.push_str(&rest[..idx]);
        let marker = &rest[idx..];

        if let Some(digits) = marker.strip_prefix('$') {
            let len = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            if len > 0 {
                let n = digits[..len].parse().unwrap_or(0);
                slot(tag.def.form, n, data, content, out);
                rest = &digits[len..];
                continue;
            }
        } else if let Some(close) = marker.find('}') {
            let key = &marker[1..close];
            if let Some(param) = tag.def.parameters.iter().find(|p| p.name == key) {
                if let Some(value) = data.param(key) {
                    named(param.value.as_deref().unwrap_or("$1"), value, out);
                }
                rest = &marker[close + 1..];
                continue;
            }
        }

        // Not a placeholder; keep the character.
        out.push_str(&marker[..1]);
        rest = &marker[1..];
    }

    out.push_str(rest);
}

fn slot(form: ContentForm, n: usize, data: &TagData, content: &TextPass<'_>, out: &mut String) {
    match positional(form, n) {
        Some(Slot::Content) if data.content_is_html => out.push_str(&data.content),
        Some(Slot::Content) => content.render(&data.content, out),
        Some(Slot::Value(idx)) => {
            if let Some(value) = data.values.get(idx) {
                if data.values_are_html {
                    out.push_str(value);
                } else {
                    push_escaped(out, value, false);
                }
            }
        }
        None => {}
    }
}

/// A parameter's value template, where `$1` is the escaped value.
fn named(template: &str, value: &str, out: &mut String) {
    let mut parts = template.split("$1");
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        push_escaped(out, value, false);
        out.push_str(part);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ParseConfig,
        grammar::{Param, TagDefinition, TagTable},
    };

    fn render_with(def: TagDefinition, template: &str, data: &TagData) -> String {
        let tags = TagTable::new([def]).unwrap();
        let config = ParseConfig::new(TagTable::new([]).unwrap());
        let pass = TextPass::new(&config, false, false);
        let mut out = String::new();
        render(template, tags.get(0), data, &pass, &mut out);
        out
    }

    #[test]
    fn positional_values_are_escaped() {
        let def = TagDefinition::new("color", ContentForm::UnparsedEquals)
            .before("x")
            .after("y");
        let data = TagData {
            values: vec!["red\"><script>".into()],
            ..Default::default()
        };
        assert_eq!(
            render_with(def, "<span style=\"color: $1\">", &data),
            "<span style=\"color: red&quot;&gt;&lt;script&gt;\">"
        );
    }

    #[test]
    fn content_then_values() {
        let def = TagDefinition::new("video", ContentForm::UnparsedCommasContent).content("x");
        let data = TagData {
            content: "a.mp4".into(),
            values: vec!["640".into(), "360".into()],
            ..Default::default()
        };
        assert_eq!(
            render_with(def, "$1 $2x$3 $4.", &data),
            "a.mp4 640x360 ."
        );
    }

    #[test]
    fn named_params_and_stray_markers() {
        let def = TagDefinition::new("img", ContentForm::UnparsedContent)
            .content("x")
            .param(Param::new("width").optional().value(" width=\"$1\""))
            .param(Param::new("alt").optional());
        let data = TagData {
            content: "p.png".into(),
            params: vec![("width".into(), "10".into())],
            ..Default::default()
        };
        assert_eq!(
            render_with(def, "<img src=\"$1\"{width} alt=\"{alt}\"> {x} $ $x", &data),
            "<img src=\"p.png\" width=\"10\" alt=\"\"> {x} $ $x"
        );
    }
}
