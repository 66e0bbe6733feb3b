use std::error::Error;

use super::*;

fn bold() -> TagDefinition {
    TagDefinition::new("b", ContentForm::Simple)
        .before("<b>")
        .after("</b>")
}

#[test]
pub fn content_forms() {
    assert!(!ContentForm::Simple.takes_value());
    assert!(ContentForm::ParsedEquals.takes_value());
    assert!(ContentForm::UnparsedEqualsContent.takes_value());

    assert!(ContentForm::UnparsedCommasContent.has_unparsed_body());
    assert!(!ContentForm::Closed.has_unparsed_body());
    assert!(ContentForm::Closed.uses_content_template());
    assert!(ContentForm::UnparsedCommas.has_parsed_body());
}

#[test]
pub fn definitions_keep_declaration_order() {
    let table = TagTable::new([
        bold(),
        TagDefinition::new("size", ContentForm::UnparsedEquals)
            .test(r"\d\]")
            .before("<small>")
            .after("</small>"),
        TagDefinition::new("size", ContentForm::UnparsedEquals)
            .before("<span>")
            .after("</span>"),
    ])
    .unwrap();

    assert_eq!(table.len(), 3);
    assert!(table.contains("size"));
    assert!(!table.contains("i"));
    assert_eq!(table.ids_for("size"), &[1, 2]);
    assert!(table.ids_for("i").is_empty());
    assert!(table.get(1).test.is_some());
    assert!(table.get(2).test.is_none());
}

#[test]
pub fn patterns_are_anchored_and_case_insensitive() {
    let table = TagTable::new([TagDefinition::new("img", ContentForm::UnparsedContent)
        .content("<img>")
        .test(r"[a-z]+\]")
        .param(Param::new("width").matching(r"\d+").optional())])
    .unwrap();
    let tag = table.get(0);

    let test = tag.test.as_ref().unwrap();
    assert!(test.is_match("ABC] trailing"));
    assert!(!test.is_match(" abc]"));

    let width = tag.params[0].as_ref().unwrap();
    assert!(width.is_match("120"));
    assert!(!width.is_match("120px"));
}

#[test]
pub fn exempt_names_are_collected() {
    let table = TagTable::new([
        bold(),
        TagDefinition::new("code", ContentForm::UnparsedContent)
            .content("<pre>$1</pre>")
            .flags(TagFlags::AUTOLINK_EXEMPT),
    ])
    .unwrap();

    assert!(table.no_autolink().contains("code"));
    assert!(!table.no_autolink().contains("b"));
    assert!(table.get(1).def.is_smiley_exempt());
}

#[test]
pub fn invalid_definitions() {
    let err = TagTable::new([TagDefinition::new("Bold", ContentForm::Simple)
        .before("<b>")
        .after("</b>")])
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidName(name) if name == "Bold"));

    let err = TagTable::new([TagDefinition::new("x y", ContentForm::Closed).content("")]).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidName(_)));

    let err = TagTable::new([TagDefinition::new("b", ContentForm::Simple).before("<b>")]).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingTemplate {
            template: "after",
            ..
        }
    ));

    let err = TagTable::new([TagDefinition::new("code", ContentForm::UnparsedContent)]).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingTemplate {
            template: "content",
            ..
        }
    ));

    let err = TagTable::new([TagDefinition::new("color", ContentForm::UnparsedEquals)
        .before("<span>")
        .after("</span>")
        .param(Param::new("x"))])
    .unwrap_err();
    assert!(matches!(err, ConfigError::ParametersOnEqualsForm { .. }));
}

#[test]
pub fn invalid_pattern_keeps_its_source() {
    let err = TagTable::new([bold().test("(unclosed")]).unwrap_err();
    assert!(matches!(&err, ConfigError::InvalidPattern { tag, .. } if tag == "b"));
    assert!(err.source().is_some());
    assert!(err.to_string().contains("(unclosed"));
}

#[test]
pub fn tag_data_params() {
    let mut data = TagData {
        values: vec!["red".to_owned()],
        ..Default::default()
    };
    assert_eq!(data.value(), Some("red"));
    assert_eq!(data.param("width"), None);

    data.set_param("width", "10".to_owned());
    data.set_param("width", "20".to_owned());
    assert_eq!(data.param("width"), Some("20"));
    assert_eq!(data.params.len(), 1);
}

#[test]
pub fn hooks_can_be_closures() {
    let def = bold().validate(|data: &mut TagData, _: &ValidateContext<'_>| {
        data.values.clear();
        Ok::<(), Fallback>(())
    });
    assert!(def.validate.is_some());
    assert!(format!("{:?}", def).contains("validate: true"));
}

#[cfg(feature = "builtin_tags")]
#[test]
pub fn builtin_table_compiles() {
    let table = TagTable::builtin(&Default::default());
    for name in [
        "b", "i", "u", "s", "sub", "sup", "tt", "pre", "left", "center", "right", "hr", "br",
        "color", "size", "font", "list", "li", "quote", "code", "url", "iurl", "email", "img",
        "video", "shadow", "glow", "abbr", "anchor", "me", "member", "nobbc", "html", "table",
        "tr", "td", "th",
    ] {
        assert!(table.contains(name), "missing [{}]", name);
    }
    assert!(table.no_autolink().contains("url"));
    assert!(table.no_autolink().contains("code"));
}
