//! Named parameters: ` width=100 height="50"` inside an open tag.
use crate::{grammar::CompiledTag, Fallback};

struct RawParam<'s> {
    key: &'s str,
    value: &'s str,
    quoted: bool,
}

/// Split the parameter section (everything between the tag name and `]`) and check
/// it against the definition. Keys may come in any order; the result follows the
/// declaration order and leaves out optional parameters that are absent or invalid.
pub(super) fn extract(section: &str, tag: &CompiledTag) -> Result<Vec<(String, String)>, Fallback> {
    let declared = &tag.def.parameters;
    let raw = split(section, |key| {
        declared.iter().any(|p| p.name.eq_ignore_ascii_case(key))
    })?;

    let mut seen = vec![false; declared.len()];
    let mut found: Vec<Option<&RawParam<'_>>> = vec![None; declared.len()];
    for param in &raw {
        let idx = declared
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(param.key))
            .ok_or(Fallback::ParameterInvalid)?;
        if std::mem::replace(&mut seen[idx], true) {
            return Err(Fallback::ParameterInvalid);
        }
        found[idx] = Some(param);
    }

    let mut out = vec![];
    for ((decl, pattern), given) in declared.iter().zip(&tag.params).zip(found) {
        let valid = given.filter(|given| {
            (given.quoted || !decl.quoted)
                && pattern.as_ref().map_or(true, |re| re.is_match(given.value))
        });

        match (valid, decl.optional) {
            (Some(given), _) => out.push((decl.name.to_string(), given.value.to_owned())),
            (None, true) => {}
            (None, false) => return Err(Fallback::ParameterInvalid),
        }
    }

    Ok(out)
}

/// Tokenize `key=value` pairs. An unquoted value runs until the next whitespace that
/// is followed by a known `key=`, so values may contain spaces.
fn split<'s>(section: &'s str, is_key: impl Fn(&str) -> bool) -> Result<Vec<RawParam<'s>>, Fallback> {
    let mut out = vec![];
    let mut rest = section.trim_start();

    while !rest.is_empty() {
        let eq = rest.find('=').ok_or(Fallback::ParameterInvalid)?;
        let key = &rest[..eq];
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(Fallback::ParameterInvalid);
        }
        let after = &rest[eq + 1..];

        if let Some(quoted) = after.strip_prefix('"') {
            let close = quoted.find('"').ok_or(Fallback::ParameterInvalid)?;
            out.push(RawParam {
                key,
                value: &quoted[..close],
                quoted: true,
            });
            let tail = &quoted[close + 1..];
            if !tail.is_empty() && !tail.starts_with(char::is_whitespace) {
                return Err(Fallback::ParameterInvalid);
            }
            rest = tail.trim_start();
            continue;
        }

        let end = next_key(after, &is_key).unwrap_or(after.len());
        out.push(RawParam {
            key,
            value: after[..end].trim_end(),
            quoted: false,
        });
        rest = after[end..].trim_start();
    }

    Ok(out)
}

/// Offset of the whitespace that precedes the next known `key=` in `text`.
fn next_key(text: &str, is_key: impl Fn(&str) -> bool) -> Option<usize> {
    text.char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .find(|&(i, c)| {
            let candidate = &text[i + c.len_utf8()..];
            let len = candidate
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
                .unwrap_or(candidate.len());
            len > 0 && candidate[len..].starts_with('=') && is_key(&candidate[..len])
        })
        .map(|(i, _)| i)
}
