//! File extension allow-lists as regex constraints
//!
//! Allow-lists are folded into a `Regex` constraint of the form
//! `^.+\.([pP][nN][gG]|[jJ][pP][gG])$` so they compare like any other
//! pattern. Extensions are lowercased, de-duplicated and sorted first, which
//! makes the pattern canonical for a given set.

const PATTERN_HEAD: &str = r"^.+\.(";
const PATTERN_TAIL: &str = ")$";

/// Build the canonical case-insensitive pattern for a set of extensions
pub fn extension_pattern<S: AsRef<str>>(extensions: &[S]) -> String {
    let normalized = normalize(extensions.iter().map(|e| e.as_ref()));
    let alternatives: Vec<String> = normalized.iter().map(|ext| case_classes(ext)).collect();
    format!("{}{}{}", PATTERN_HEAD, alternatives.join("|"), PATTERN_TAIL)
}

/// Recover the extension set from a pattern built by [`extension_pattern`]
pub fn extensions_from_pattern(pattern: &str) -> Option<Vec<String>> {
    let body = pattern.strip_prefix(PATTERN_HEAD)?.strip_suffix(PATTERN_TAIL)?;
    body.split('|').map(parse_case_classes).collect()
}

/// Split a space/comma separated allow-list (`"png gif jpg"`)
pub fn split_allow_list(raw: &str) -> Vec<String> {
    normalize(raw.split(|c: char| c.is_whitespace() || c == ','))
}

fn normalize<'a>(extensions: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = extensions
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn case_classes(ext: &str) -> String {
    ext.chars()
        .map(|c| {
            if c.is_ascii_alphabetic() {
                format!("[{}{}]", c.to_ascii_lowercase(), c.to_ascii_uppercase())
            } else {
                regex::escape(&c.to_string())
            }
        })
        .collect()
}

fn parse_case_classes(alternative: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = alternative.chars();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                let lower = chars.next()?;
                let upper = chars.next()?;
                if chars.next()? != ']' || lower.to_ascii_uppercase() != upper {
                    return None;
                }
                out.push(lower);
            }
            '\\' => out.push(chars.next()?),
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c),
            _ => return None,
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}
