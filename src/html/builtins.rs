//! The built-in forum tag set.
//!
//! Callers who want more tags extend the list from [default_tags] before compiling it
//! into a [crate::TagTable].
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::ResourceKind,
    grammar::{ContentForm, Param, TagData, TagDefinition, TagFlags, Trim, ValidateContext},
    Fallback,
};

/// Strings and URLs baked into the built-in templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinOptions {
    /// Base URL of the forum's entry script, used by `[member]` links.
    pub script_url: String,
    /// Header of a quote without an author.
    pub quote: String,
    /// Header of a quote with an author, followed by the author's name.
    pub quote_from: String,
    /// Header of a code block.
    pub code: String,
}

impl Default for BuiltinOptions {
    fn default() -> Self {
        Self {
            script_url: "index.php".to_owned(),
            quote: "Quote".to_owned(),
            quote_from: "Quote from".to_owned(),
            code: "Code".to_owned(),
        }
    }
}

/// Schemes a user-supplied link may use.
const WEB_SCHEMES: &[&str] = &["http", "https", "ftp", "ftps"];

/// CSS sizes for `[size=1]`..`[size=7]`.
const FONT_SIZES: [&str; 7] = ["0.7em", "1.0em", "1.35em", "1.45em", "2.0em", "2.65em", "3.95em"];

const LINK_ATTRS: &str = r#"class="bbc_link" target="_blank" rel="noopener noreferrer""#;

static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^([a-z][a-z0-9+.\-]*):").unwrap());

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z0-9._%+\-]+@[a-z0-9\-]+(?:\.[a-z0-9\-]+)+$").unwrap());

macro_rules! simple_tag {
    ($name:literal, $open:literal, $close:literal) => {
        TagDefinition::new($name, ContentForm::Simple)
            .before($open)
            .after($close)
    };
}

macro_rules! block_tag {
    ($name:literal, $open:literal, $close:literal) => {
        simple_tag!($name, $open, $close).block_level()
    };
}

/// Returns the built-in tag definitions, in the order they are tried.
///
/// # Included tags
/// `b i u s sub sup tt pre left center right hr br color size font list li quote code
/// url iurl email img video shadow glow abbr anchor me member nobbc html table tr td th`
pub fn default_tags(opts: &BuiltinOptions) -> Vec<TagDefinition> {
    let quote_header = |header: &str| {
        format!(
            "<blockquote class=\"bbc_standard_quote\"><cite>{}</cite>",
            html_escape::encode_text(header)
        )
    };
    let code_header = |suffix: &str| {
        format!(
            "<div class=\"codeheader\">{}{}</div><pre class=\"bbc_code\">$1</pre>",
            html_escape::encode_text(&opts.code),
            suffix
        )
    };
    let quote_from = format!("{}: ", opts.quote_from);

    vec![
        simple_tag!("b", "<strong>", "</strong>"),
        simple_tag!("i", "<em>", "</em>"),
        simple_tag!("u", "<span class=\"bbc_u\">", "</span>"),
        simple_tag!("s", "<del>", "</del>"),
        simple_tag!("sub", "<sub>", "</sub>"),
        simple_tag!("sup", "<sup>", "</sup>"),
        simple_tag!("tt", "<span class=\"monospace\">", "</span>"),
        block_tag!("pre", "<pre>", "</pre>"),
        block_tag!("left", "<div style=\"text-align: left;\">", "</div>"),
        block_tag!("center", "<div style=\"text-align: center;\">", "</div>"),
        block_tag!("right", "<div style=\"text-align: right;\">", "</div>"),
        TagDefinition::new("hr", ContentForm::Closed)
            .content("<hr>")
            .block_level(),
        TagDefinition::new("br", ContentForm::Closed).content("<br>"),
        TagDefinition::new("color", ContentForm::UnparsedEquals)
            .test(r"(?:#[\da-f]{3}|#[\da-f]{6}|[a-z]{1,20}|rgb\((?:\s*\d{1,3}\s*,){2}\s*\d{1,3}\s*\))\]")
            .before("<span style=\"color: $1;\" class=\"bbc_color\">")
            .after("</span>"),
        TagDefinition::new("size", ContentForm::UnparsedEquals)
            .test(r"[1-7]\]")
            .before("<span style=\"font-size: $1;\" class=\"bbc_size\">")
            .after("</span>")
            .validate(font_size),
        TagDefinition::new("size", ContentForm::UnparsedEquals)
            .test(r"(?:[1-9]\d?p[xt]|small(?:er)?|larger?|xx?-(?:small|large)|medium|(?:0\.[1-9]|[1-9](?:\.\d\d?)?)?em)\]")
            .before("<span style=\"font-size: $1;\" class=\"bbc_size\">")
            .after("</span>"),
        TagDefinition::new("font", ContentForm::UnparsedEquals)
            .test(r"[a-z0-9_,\- ]+?\]")
            .before("<span style=\"font-family: $1;\" class=\"bbc_font\">")
            .after("</span>"),
        block_tag!("list", "<ul class=\"bbc_list\">", "</ul>")
            .require_children(&["li"])
            .trim(Trim::Inside),
        block_tag!("list", "<ul class=\"bbc_list\"{type}>", "</ul>")
            .param(
                Param::new("type")
                    .matching("none|disc|circle|square|decimal|decimal-leading-zero|lower-roman|upper-roman|lower-alpha|upper-alpha|lower-greek|lower-latin|upper-latin")
                    .value(" style=\"list-style-type: $1;\""),
            )
            .require_children(&["li"])
            .trim(Trim::Inside),
        simple_tag!("li", "<li>", "</li>")
            .require_parents(&["list"])
            .trim(Trim::Outside)
            .disabled_after("<br>"),
        TagDefinition::new("quote", ContentForm::Simple)
            .before(quote_header(&opts.quote))
            .after("</blockquote>")
            .block_level(),
        TagDefinition::new("quote", ContentForm::ParsedEquals)
            .flags(TagFlags::QUOTED_VALUE)
            .before(quote_header(&format!("{}$1", quote_from)))
            .after("</blockquote>")
            .parsed_tags_allowed(&["url", "iurl"])
            .block_level(),
        TagDefinition::new("quote", ContentForm::Simple)
            .before(format!(
                "<blockquote class=\"bbc_standard_quote\"{{date}}><cite>{}{{author}}</cite>",
                html_escape::encode_text(&quote_from)
            ))
            .after("</blockquote>")
            .block_level()
            .param(Param::new("author").matching(r"[^\]]{1,100}?"))
            .param(
                Param::new("date")
                    .matching(r"\d+")
                    .optional()
                    .value(" data-date=\"$1\""),
            ),
        TagDefinition::new("code", ContentForm::UnparsedContent)
            .content(code_header(""))
            .flags(TagFlags::AUTOLINK_EXEMPT | TagFlags::NO_SMILEYS)
            .block_level()
            .validate(strip_leading_newline),
        TagDefinition::new("code", ContentForm::UnparsedEqualsContent)
            .test(r"[a-z0-9_+#.\- ]{1,30}\]")
            .content(code_header(" ($2)"))
            .flags(TagFlags::AUTOLINK_EXEMPT | TagFlags::NO_SMILEYS)
            .block_level()
            .validate(strip_leading_newline),
        TagDefinition::new("url", ContentForm::UnparsedContent)
            .content(format!("<a href=\"$1\" {}>$1</a>", LINK_ATTRS))
            .flags(TagFlags::AUTOLINK_EXEMPT)
            .validate(link_content),
        TagDefinition::new("url", ContentForm::UnparsedEquals)
            .flags(TagFlags::QUOTED_VALUE | TagFlags::AUTOLINK_EXEMPT)
            .before(format!("<a href=\"$1\" {}>", LINK_ATTRS))
            .after("</a>")
            .disabled_after(" ($1)")
            .disallow_children(&["email", "url", "iurl"])
            .validate(link_value),
        TagDefinition::new("iurl", ContentForm::UnparsedContent)
            .content("<a href=\"$1\" class=\"bbc_link\">$1</a>")
            .flags(TagFlags::AUTOLINK_EXEMPT)
            .validate(link_content),
        TagDefinition::new("iurl", ContentForm::UnparsedEquals)
            .flags(TagFlags::QUOTED_VALUE | TagFlags::AUTOLINK_EXEMPT)
            .before("<a href=\"$1\" class=\"bbc_link\">")
            .after("</a>")
            .disabled_after(" ($1)")
            .disallow_children(&["email", "url", "iurl"])
            .validate(link_value),
        TagDefinition::new("email", ContentForm::UnparsedContent)
            .content("<a href=\"mailto:$1\" class=\"bbc_email\">$1</a>")
            .flags(TagFlags::AUTOLINK_EXEMPT)
            .validate(email_content),
        TagDefinition::new("email", ContentForm::UnparsedEquals)
            .flags(TagFlags::AUTOLINK_EXEMPT)
            .before("<a href=\"mailto:$1\" class=\"bbc_email\">")
            .after("</a>")
            .disabled_after(" ($1)")
            .disallow_children(&["email", "url", "iurl"])
            .validate(email_value),
        TagDefinition::new("img", ContentForm::UnparsedContent)
            .content("<img src=\"$1\" alt=\"{alt}\" class=\"bbc_img\"{width}{height}>")
            .disabled_content("($1)")
            .param(Param::new("alt").optional())
            .param(Param::new("width").matching(r"\d+").optional().value(" width=\"$1\""))
            .param(Param::new("height").matching(r"\d+").optional().value(" height=\"$1\""))
            .flags(TagFlags::AUTOLINK_EXEMPT)
            .validate(image),
        TagDefinition::new("video", ContentForm::UnparsedContent)
            .content("<video src=\"$1\" controls class=\"bbc_video\"></video>")
            .disabled_content("($1)")
            .flags(TagFlags::AUTOLINK_EXEMPT)
            .block_level()
            .validate(video),
        TagDefinition::new("video", ContentForm::UnparsedCommasContent)
            .test(r"\d{1,4},\d{1,4}\]")
            .content("<video src=\"$1\" width=\"$2\" height=\"$3\" controls class=\"bbc_video\"></video>")
            .disabled_content("($1)")
            .flags(TagFlags::AUTOLINK_EXEMPT)
            .block_level()
            .validate(video),
        TagDefinition::new("shadow", ContentForm::UnparsedCommas)
            .test(r"[#0-9a-z\-]{3,12},(?:left|right|top|bottom|\d{1,3})\]")
            .before("<span style=\"text-shadow: $2 $1;\">")
            .after("</span>")
            .validate(shadow_direction),
        TagDefinition::new("glow", ContentForm::UnparsedCommas)
            .test(r"[#0-9a-z\-]{3,12},\d{1,2}(?:,[^\]]+)?\]")
            .before("<span style=\"text-shadow: 0 0 $2px $1;\">")
            .after("</span>"),
        TagDefinition::new("abbr", ContentForm::UnparsedEquals)
            .flags(TagFlags::QUOTED_VALUE)
            .before("<abbr title=\"$1\">")
            .after("</abbr>"),
        TagDefinition::new("anchor", ContentForm::UnparsedEquals)
            .test(r"#?[a-z][a-z0-9_\-]*\]")
            .before("<span id=\"post_$1\">")
            .after("</span>")
            .validate(anchor_name),
        TagDefinition::new("me", ContentForm::UnparsedEquals)
            .flags(TagFlags::QUOTED_VALUE)
            .before("<div class=\"meaction\">* $1 ")
            .after("</div>")
            .disabled_before("/me ")
            .disabled_after("<br>")
            .block_level(),
        TagDefinition::new("member", ContentForm::UnparsedEquals)
            .test(r"\d+\]")
            .before(format!(
                "<a href=\"{}?action=profile;u=$1\" class=\"mention\" data-mention=\"$1\">@",
                html_escape::encode_double_quoted_attribute(&opts.script_url)
            ))
            .after("</a>"),
        TagDefinition::new("nobbc", ContentForm::UnparsedContent)
            .content("$1")
            .flags(TagFlags::NO_SMILEYS),
        TagDefinition::new("html", ContentForm::UnparsedContent)
            .content("<div>$1</div>")
            .disabled_content("$1")
            .block_level()
            .validate(raw_html),
        block_tag!("table", "<table class=\"bbc_table\">", "</table>")
            .require_children(&["tr"])
            .trim(Trim::Inside),
        simple_tag!("tr", "<tr>", "</tr>")
            .require_parents(&["table"])
            .require_children(&["td", "th"])
            .trim(Trim::Both),
        simple_tag!("td", "<td>", "</td>")
            .require_parents(&["tr"])
            .trim(Trim::Outside),
        simple_tag!("th", "<th>", "</th>")
            .require_parents(&["tr"])
            .trim(Trim::Outside),
    ]
}

/// Make a user-supplied link absolute, or refuse it when it uses a scheme that is
/// not a web scheme (`javascript:`, `data:` and friends).
pub(crate) fn normalize_url(raw: &str) -> Option<String> {
    let url = raw.trim();
    if url.is_empty() || url.chars().any(char::is_control) {
        return None;
    }
    let url = url.replace(' ', "%20");

    if let Some(rest) = url.strip_prefix("//") {
        return Some(format!("http://{}", rest));
    }

    match SCHEME.captures(&url) {
        // `host:port/...` has no scheme.
        Some(caps) if !url[caps[0].len()..].starts_with(|c: char| c.is_ascii_digit()) => {
            let scheme = caps[1].to_ascii_lowercase();
            WEB_SCHEMES.contains(&scheme.as_str()).then_some(url)
        }
        _ => Some(format!("http://{}", url)),
    }
}

fn link_target(raw: &str, cx: &ValidateContext<'_>) -> Result<String, Fallback> {
    if cx.tag() == "iurl" && raw.trim_start().starts_with('#') {
        return Ok(raw.trim().to_owned());
    }

    let url = normalize_url(raw).ok_or(Fallback::ValidatorFailure)?;
    Ok(cx.config().rewrite_url(url, ResourceKind::Link))
}

fn link_content(data: &mut TagData, cx: &ValidateContext<'_>) -> Result<(), Fallback> {
    data.content = link_target(&data.content, cx)?;
    Ok(())
}

fn link_value(data: &mut TagData, cx: &ValidateContext<'_>) -> Result<(), Fallback> {
    let value = data.value().ok_or(Fallback::ValidatorFailure)?;
    data.values = vec![link_target(value, cx)?];
    Ok(())
}

fn check_email(raw: &str) -> Result<String, Fallback> {
    let address = raw.trim();
    if EMAIL.is_match(address) {
        Ok(address.to_owned())
    } else {
        Err(Fallback::ValidatorFailure)
    }
}

fn email_content(data: &mut TagData, _: &ValidateContext<'_>) -> Result<(), Fallback> {
    data.content = check_email(&data.content)?;
    Ok(())
}

fn email_value(data: &mut TagData, _: &ValidateContext<'_>) -> Result<(), Fallback> {
    let value = data.value().ok_or(Fallback::ValidatorFailure)?;
    data.values = vec![check_email(value)?];
    Ok(())
}

fn embed(data: &mut TagData, cx: &ValidateContext<'_>, kind: ResourceKind) -> Result<(), Fallback> {
    let url = normalize_url(&data.content).ok_or(Fallback::ValidatorFailure)?;
    data.content = cx.config().rewrite_url(url, kind);
    Ok(())
}

fn image(data: &mut TagData, cx: &ValidateContext<'_>) -> Result<(), Fallback> {
    embed(data, cx, ResourceKind::Image)
}

fn video(data: &mut TagData, cx: &ValidateContext<'_>) -> Result<(), Fallback> {
    embed(data, cx, ResourceKind::Video)
}

fn font_size(data: &mut TagData, _: &ValidateContext<'_>) -> Result<(), Fallback> {
    let size = data
        .value()
        .and_then(|v| v.parse::<usize>().ok())
        .and_then(|n| FONT_SIZES.get(n.checked_sub(1)?))
        .ok_or(Fallback::ValidatorFailure)?;
    data.values = vec![(*size).to_owned()];
    Ok(())
}

/// `[shadow=color,direction]` takes a side or an angle in degrees, clockwise from top.
fn shadow_direction(data: &mut TagData, _: &ValidateContext<'_>) -> Result<(), Fallback> {
    let direction = data.values.get(1).ok_or(Fallback::ValidatorFailure)?;
    let degrees = match direction.as_str() {
        "top" => 0.0,
        "right" => 90.0,
        "bottom" => 180.0,
        "left" => 270.0,
        angle => angle.parse::<f64>().map_err(|_| Fallback::ValidatorFailure)?,
    };

    let radians = degrees.to_radians();
    let x = (2.0 * radians.sin()).round() as i32;
    let y = (-2.0 * radians.cos()).round() as i32;
    data.values[1] = format!("{}px {}px 2px", x, y);
    Ok(())
}

fn strip_leading_newline(data: &mut TagData, _: &ValidateContext<'_>) -> Result<(), Fallback> {
    let body = &data.content;
    let stripped = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body);
    if stripped.len() != body.len() {
        data.content = stripped.to_owned();
    }
    Ok(())
}

fn anchor_name(data: &mut TagData, _: &ValidateContext<'_>) -> Result<(), Fallback> {
    if let Some(name) = data.value().and_then(|v| v.strip_prefix('#')) {
        data.values = vec![name.to_owned()];
    }
    Ok(())
}

fn raw_html(data: &mut TagData, cx: &ValidateContext<'_>) -> Result<(), Fallback> {
    data.content_is_html = cx.config().allow_raw_html() && !cx.is_disabled();
    Ok(())
}
