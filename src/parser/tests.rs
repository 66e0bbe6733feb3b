use crate::{
    grammar::{ContentForm, Param, TagDefinition, TagFlags, TagTable},
    BBParser, Token, TokenKind,
};

const LOREM_IPSUM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. In lorem quam, fermentum id porttitor ac, iaculis eu arcu. Aliquam vulputate tempus felis consequat elementum. Cras auctor nunc a cursus lobortis. Fusce venenatis quam nec eleifend porta.";

fn tags() -> TagTable {
    TagTable::new([
        TagDefinition::new("b", ContentForm::Simple)
            .before("<b>")
            .after("</b>"),
        TagDefinition::new("code", ContentForm::UnparsedContent).content("<pre>$1</pre>"),
        TagDefinition::new("quote", ContentForm::ParsedEquals)
            .flags(TagFlags::QUOTED_VALUE)
            .before("<blockquote>$1")
            .after("</blockquote>"),
        TagDefinition::new("img", ContentForm::UnparsedContent)
            .content("<img src=\"$1\">")
            .param(Param::new("alt").optional())
            .param(Param::new("width").matching(r"\d+").optional()),
        TagDefinition::new("color", ContentForm::UnparsedEquals)
            .test(r"[a-z]+\]")
            .before("<span>")
            .after("</span>"),
    ])
    .unwrap()
}

fn open(token: &Token<'_>) -> crate::OpenTag {
    match &token.kind {
        TokenKind::Open(open) => open.clone(),
        other => panic!("expected an open tag, got {:?}", other),
    }
}

/// Every byte of the input ends up in exactly one token.
fn assert_covers(input: &str, tags: &TagTable) {
    let joined: String = BBParser::new(input, tags).map(|t| t.span).collect();
    assert_eq!(joined, input);
}

#[test]
pub fn just_text() {
    let tags = tags();
    let mut parser = BBParser::new(LOREM_IPSUM, &tags);
    let tok = parser.next().unwrap();
    assert!(tok.is_text());
    assert_eq!(tok.span, LOREM_IPSUM);
    assert!(parser.next().is_none())
}

const SIMPLE: &str = "[B]This is a test![/b] and it's very cool.";

#[test]
pub fn simple_tags() {
    let tags = tags();
    let mut parser = BBParser::new(SIMPLE, &tags);
    let bold_tag = parser.next().unwrap();
    assert!(bold_tag.is_open(&tags, "b"));
    assert!(!bold_tag.is_close("b"));
    assert_eq!(bold_tag.span, "[B]");

    assert!(matches!(
        parser.next(),
        Some(Token {
            kind: TokenKind::Text,
            span: "This is a test!",
            ..
        })
    ));

    let close = parser.next().unwrap();
    assert!(close.is_close("b"));
    assert_eq!(close.kind, TokenKind::Close("b".to_owned()));

    assert!(matches!(
        parser.next(),
        Some(Token {
            kind: TokenKind::Text,
            ..
        })
    ));

    assert!(parser.next().is_none());
}

const UNKNOWN_TAG: &str = "[bar ]foo [/bar]";

#[test]
pub fn unknown_tags_are_text() {
    let tags = tags();
    let mut parser = BBParser::new(UNKNOWN_TAG, &tags);
    assert_eq!(parser.next().unwrap().span, "[bar ]foo ");
    assert_eq!(parser.next().unwrap().span, "[/bar]");
    assert!(parser.next().is_none());
}

const UNCLOSED_TAG: &str = "[b=real ";

#[test]
pub fn unclosed_tag() {
    let tags = tags();
    let mut parser = BBParser::new(UNCLOSED_TAG, &tags);

    assert!(parser.next().unwrap().is_text());
    assert!(parser.next().is_none());
}

const NESTED_CODE: &str = "[code]a[code]b[/code]c[/code]d";

#[test]
pub fn verbatim_body_skips_nested_pairs() {
    let tags = tags();
    let mut parser = BBParser::new(NESTED_CODE, &tags);

    let code = parser.next().unwrap();
    assert_eq!(code.span, "[code]a[code]b[/code]c[/code]");
    let body = open(&code).body().unwrap();
    assert_eq!(&NESTED_CODE[body], "a[code]b[/code]c");

    assert_eq!(parser.next().unwrap().span, "d");
    assert!(parser.next().is_none());
}

#[test]
pub fn unterminated_verbatim_body_is_text() {
    let tags = tags();
    let mut parser = BBParser::new("[code]never [b]closed", &tags);
    assert_eq!(parser.next().unwrap().span, "[code]never ");
    assert!(parser.next().unwrap().is_open(&tags, "b"));
}

const QUOTED: &str = "[quote=\"a ] b\"]x[/quote]";

#[test]
pub fn quoted_value_may_hold_brackets() {
    let tags = tags();
    let mut parser = BBParser::new(QUOTED, &tags);

    let quote = parser.next().unwrap();
    assert_eq!(quote.span, "[quote=\"a ] b\"]");
    assert_eq!(&QUOTED[open(&quote).value().unwrap()], "a ] b");
}

#[test]
pub fn test_pattern_selects_definitions() {
    let tags = tags();
    let mut parser = BBParser::new("[color=red]x", &tags);
    assert!(parser.next().unwrap().is_open(&tags, "color"));

    let mut parser = BBParser::new("[color=1]x", &tags);
    assert_eq!(parser.next().unwrap().span, "[color=1]x");
}

#[test]
pub fn named_params_in_any_order() {
    let tags = tags();
    let mut parser = BBParser::new("[img width=10 alt=two words]p.png[/img]", &tags);

    let img = open(&parser.next().unwrap());
    assert_eq!(
        img.params,
        vec![
            ("alt".to_owned(), "two words".to_owned()),
            ("width".to_owned(), "10".to_owned()),
        ]
    );
    assert!(parser.next().is_none());
}

#[test]
pub fn invalid_params() {
    let tags = tags();

    // An optional parameter that does not match is dropped.
    let mut parser = BBParser::new("[img width=wide]p.png[/img]", &tags);
    assert!(open(&parser.next().unwrap()).params.is_empty());

    // Unknown and repeated keys reject the tag.
    for input in ["[img foo=1]p.png[/img]", "[img alt=a alt=b]p.png[/img]"] {
        let mut parser = BBParser::new(input, &tags);
        assert!(parser.next().unwrap().is_text());
        assert!(parser.next().unwrap().is_close("img"));
    }
}

#[test]
pub fn scans_a_sub_range() {
    let tags = tags();
    let input = "ab[b]cd[/b]ef";
    let spans: Vec<_> = BBParser::with_range(input, &tags, 2..11)
        .map(|t| (t.start, t.span))
        .collect();
    assert_eq!(spans, vec![(2, "[b]"), (5, "cd"), (7, "[/b]")]);
}

#[test]
pub fn seek_and_skip() {
    let tags = tags();
    let mut parser = BBParser::new("[b]  \n\nx", &tags);
    parser.next();
    parser.skip_newline();
    assert_eq!(parser.remaining(), "  \n\nx");
    parser.skip_whitespace();
    assert_eq!(parser.remaining(), "x");

    let mut parser = BBParser::new("[b]\r\nx", &tags);
    parser.next();
    parser.skip_newline();
    assert_eq!(parser.remaining(), "x");
    parser.seek(0);
    assert_eq!(parser.position(), 0);
}

#[test]
pub fn multibyte_text() {
    let tags = tags();
    assert_covers("[é[b]ü[/b]日本[", &tags);
}

#[test]
pub fn pathological_input_terminates() {
    let tags = tags();
    assert_covers(&"[".repeat(100_000), &tags);
    assert_covers(&"[code]".repeat(20_000), &tags);
    assert_covers(&"[quote=\"".repeat(20_000), &tags);
    assert_covers(&format!("{}]", "[img alt=x ".repeat(20_000)), &tags);
    assert_covers(&"[b][/".repeat(20_000), &tags);
}
