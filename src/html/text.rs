//! Passes over literal text: cut-paste cleanup, smileys, autolinks, escaping.
//!
//! Every byte of user text reaches the output through [push_escaped], exactly once.
use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::{ParseConfig, ParseFeature, ResourceKind, Smiley};

static AUTOLINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?i)\b(?:"#,
        r#"(?P<url>(?:https?|ftps?)://[^\s<>"'\[\]]+)"#,
        r#"|(?P<www>www\.[a-z0-9-]+(?:\.[a-z0-9-]+)+(?:[/?#][^\s<>"'\[\]]*)?)"#,
        r#"|(?P<email>[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,})"#,
        r#")"#
    ))
    .unwrap()
});

static ME_ACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^/me (.*)$").unwrap());

/// ASCII stand-in for punctuation that word processors substitute.
fn cut_paste_replacement(c: char) -> Option<&'static str> {
    Some(match c {
        '\u{201A}' => ",",
        '\u{201E}' => ",,",
        '\u{2026}' => "...",
        '\u{02C6}' => "^",
        '\u{2018}' | '\u{2019}' | '\u{2032}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{2033}' => "\"",
        '\u{2013}' => "-",
        '\u{2014}' => "--",
        '\u{2039}' => "<",
        '\u{203A}' => ">",
        _ => return None,
    })
}

pub(crate) fn fix_cut_paste(text: &str) -> Cow<'_, str> {
    if !text.chars().any(|c| cut_paste_replacement(c).is_some()) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match cut_paste_replacement(c) {
            Some(ascii) => out.push_str(ascii),
            None => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Rewrite `/me does something` lines into `[me="Author"]does something[/me]`.
pub(crate) fn expand_me_lines<'t>(text: &'t str, author: &str) -> Cow<'t, str> {
    if !ME_ACTION.is_match(text) {
        return Cow::Borrowed(text);
    }

    let name: String = author
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '"') && !c.is_control())
        .collect();
    ME_ACTION.replace_all(text, |caps: &Captures<'_>| {
        format!("[me=\"{}\"]{}[/me]", name, &caps[1])
    })
}

pub(crate) fn push_escaped(out: &mut String, text: &str, line_breaks: bool) {
    if !line_breaks {
        out.push_str(&html_escape::encode_quoted_attribute(text));
        return;
    }

    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push_str("<br>");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        out.push_str(&html_escape::encode_quoted_attribute(line));
    }
}

/// Drop trailing punctuation that more likely ends the sentence than the URL. A `)`
/// goes only while the URL has more of them than `(`.
fn trim_url(url: &str) -> &str {
    let opens = url.matches('(').count();
    let mut closes = url.matches(')').count();
    let mut end = url.len();

    while let Some(c) = url[..end].chars().next_back() {
        match c {
            '.' | ',' | ';' | ':' | '!' | '?' | '\'' => {}
            ')' if opens < closes => closes -= 1,
            _ => break,
        }
        end -= c.len_utf8();
    }

    &url[..end]
}

/// The text-run passes for one span, configured for where the span sits.
#[derive(Clone, Copy)]
pub(crate) struct TextPass<'c> {
    config: &'c ParseConfig,
    smileys: bool,
    autolink: bool,
    line_breaks: bool,
}

impl<'c> TextPass<'c> {
    pub fn new(config: &'c ParseConfig, smileys_allowed: bool, autolink_allowed: bool) -> Self {
        let features = config.features();
        Self {
            config,
            smileys: smileys_allowed && config.smileys_enabled(),
            autolink: autolink_allowed && features.contains(ParseFeature::AUTOLINK),
            line_breaks: features.contains(ParseFeature::LINE_BREAKS),
        }
    }

    /// Same pass without smileys or autolinks.
    pub fn plain(self) -> Self {
        Self {
            smileys: false,
            autolink: false,
            ..self
        }
    }

    pub fn render(&self, text: &str, out: &mut String) {
        if !self.smileys {
            self.links(text, out);
            return;
        }

        let table = self.config.smileys();
        let mut last = 0;
        let mut pos = 0;
        let mut prev: Option<char> = None;

        while let Some(c) = text[pos..].chars().next() {
            if prev.map_or(true, char::is_whitespace) {
                if let Some(smiley) = table.match_at(&text[pos..]) {
                    let end = pos + smiley.code.len();
                    let bounded = text[end..]
                        .chars()
                        .next()
                        .map_or(true, |next| !next.is_alphanumeric());
                    if bounded {
                        self.links(&text[last..pos], out);
                        self.smiley(smiley, out);
                        last = end;
                        pos = end;
                        prev = smiley.code.chars().last();
                        continue;
                    }
                }
            }
            prev = Some(c);
            pos += c.len_utf8();
        }

        self.links(&text[last..], out);
    }

    fn smiley(&self, smiley: &Smiley, out: &mut String) {
        let base = self.config.smileys().base_url().trim_end_matches('/');
        out.push_str("<img src=\"");
        out.push_str(&html_escape::encode_quoted_attribute(&format!(
            "{}/{}",
            base, smiley.filename
        )));
        out.push_str("\" alt=\"");
        out.push_str(&html_escape::encode_quoted_attribute(&smiley.code));
        out.push_str("\" title=\"");
        out.push_str(&html_escape::encode_quoted_attribute(&smiley.description));
        out.push_str("\" class=\"smiley\">");
    }

    fn links(&self, text: &str, out: &mut String) {
        if !self.autolink {
            push_escaped(out, text, self.line_breaks);
            return;
        }

        let mut last = 0;
        for caps in AUTOLINK.captures_iter(text) {
            let Some(found) = caps.get(0) else {
                continue;
            };

            let shown = if caps.name("email").is_some() {
                found.as_str()
            } else {
                trim_url(found.as_str())
            };
            if shown.is_empty() {
                continue;
            }

            push_escaped(out, &text[last..found.start()], self.line_breaks);
            if caps.name("email").is_some() {
                self.email_link(shown, out);
            } else if caps.name("www").is_some() {
                self.web_link(&format!("http://{}", shown), shown, out);
            } else {
                self.web_link(shown, shown, out);
            }
            last = found.start() + shown.len();
        }

        push_escaped(out, &text[last..], self.line_breaks);
    }

    fn web_link(&self, href: &str, shown: &str, out: &mut String) {
        let href = self.config.rewrite_url(href.to_owned(), ResourceKind::Link);
        out.push_str("<a href=\"");
        out.push_str(&html_escape::encode_quoted_attribute(&href));
        out.push_str("\" class=\"bbc_link\" target=\"_blank\" rel=\"noopener noreferrer\">");
        out.push_str(&html_escape::encode_quoted_attribute(shown));
        out.push_str("</a>");
    }

    fn email_link(&self, address: &str, out: &mut String) {
        let address = html_escape::encode_quoted_attribute(address);
        out.push_str("<a href=\"mailto:");
        out.push_str(&address);
        out.push_str("\" class=\"bbc_email\">");
        out.push_str(&address);
        out.push_str("</a>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cut_paste_is_ascii() {
        assert_eq!(
            fix_cut_paste("\u{201C}Hi\u{201D} \u{2014} it\u{2019}s\u{2026}"),
            "\"Hi\" -- it's..."
        );
        assert!(matches!(fix_cut_paste("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn url_punctuation() {
        assert_eq!(trim_url("http://a.com/x."), "http://a.com/x");
        assert_eq!(trim_url("http://a.com/x)."), "http://a.com/x");
        assert_eq!(trim_url("http://a.com/(x)"), "http://a.com/(x)");
        assert_eq!(trim_url("http://a.com/(x))!)"), "http://a.com/(x)");
        assert_eq!(trim_url("http://a.com/,.;"), "http://a.com/");
    }

    #[test]
    fn long_parenthesis_runs_are_trimmed() {
        let url = format!("http://a.com/{}", ")".repeat(100_000));
        assert_eq!(trim_url(&url), "http://a.com/");

        let url = format!("http://a.com/{}", "(".repeat(50_000) + &")".repeat(50_000));
        assert_eq!(trim_url(&url), url);
    }

    #[test]
    fn me_lines() {
        assert_eq!(
            expand_me_lines("hi\n/me waves\nbye", "Ann [x]"),
            "hi\n[me=\"Ann x\"]waves[/me]\nbye"
        );
        assert_eq!(expand_me_lines("say /me here", "Ann"), "say /me here");
    }

    #[test]
    fn escapes_with_line_breaks() {
        let mut out = String::new();
        push_escaped(&mut out, "a<b\r\nc", true);
        assert_eq!(out, "a&lt;b<br>c");
    }
}
