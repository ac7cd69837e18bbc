//! Component-local stylesheet scoping.
//!
//! Every selector gets an attribute selector (`[data-p-<identity>]`) attached
//! to its last compound selector, so rules only match elements rendered by
//! the owning component. Supported escapes:
//!
//! * `:deep(.x)` / `::v-deep(.x)` and the `>>>` / `/deep/` combinators scope
//!   the part before them and leave the inner selector unscoped;
//! * `:slotted(.x)` / `::v-slotted(.x)` scope the inner selector with the
//!   `-s` suffixed attribute instead;
//! * `:global(.x)` / `::v-global(.x)` replace the whole selector, unscoped.
//!
//! `@keyframes` names are suffixed with the identity and `animation` /
//! `animation-name` declarations in the same stylesheet are rewritten to
//! match. Conditional group rules are scoped recursively; other at-rules are
//! copied through.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;

/// At-rules whose block contains ordinary style rules.
const GROUP_AT_RULES: &[&str] = &["media", "supports", "document", "container", "layer", "scope"];

static ANIMATION_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[{;\s])((?:-\w+-)?animation(-name)?)(\s*:\s*)([^;}]+)")
        .expect("animation declaration pattern is valid")
});

/// Attribute name used to scope the styles of the asset with `identity`.
pub fn scope_attribute(identity: &str) -> String {
    format!("data-p-{identity}")
}

/// Scope a whole stylesheet to the asset with `identity`.
pub fn scope_stylesheet(source: &str, identity: &str) -> String {
    let mut scope = StyleScope {
        attribute: scope_attribute(identity),
        suffix: identity.to_owned(),
        keyframes: FxHashMap::default(),
    };
    let scoped = scope.scope_block(source);
    if scope.keyframes.is_empty() {
        scoped
    } else {
        scope.rename_animations(&scoped)
    }
}

struct StyleScope {
    attribute: String,
    suffix: String,
    /// Original keyframes name -> scoped name.
    keyframes: FxHashMap<String, String>,
}

impl StyleScope {
    fn scope_block(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + text.len() / 4);
        let mut pos = 0;
        while let Some((at, delimiter)) = next_delimiter(text, pos) {
            if delimiter == b';' {
                out.push_str(&text[pos..=at]);
                pos = at + 1;
                continue;
            }
            let Some(close) = matching_brace(text, at) else {
                break;
            };
            self.scope_rule(&text[pos..at], &text[at + 1..close], &mut out);
            pos = close + 1;
        }
        out.push_str(&text[pos..]);
        out
    }

    fn scope_rule(&mut self, prelude: &str, body: &str, out: &mut String) {
        let (leading, rest) = split_leading_trivia(prelude);
        let head = rest.trim_end();
        let trailing = &rest[head.len()..];
        out.push_str(leading);

        if let Some(at_rule) = head.strip_prefix('@') {
            let name_len = at_rule
                .find(|c: char| c.is_whitespace() || c == '(')
                .unwrap_or(at_rule.len());
            let (name, params) = at_rule.split_at(name_len);

            if name.ends_with("keyframes") {
                let params = params.trim();
                let scoped_suffix = format!("-{}", self.suffix);
                let renamed = if params.ends_with(&scoped_suffix) {
                    params.to_owned()
                } else {
                    let renamed = format!("{params}{scoped_suffix}");
                    self.keyframes.insert(params.to_owned(), renamed.clone());
                    renamed
                };
                out.push('@');
                out.push_str(name);
                out.push(' ');
                out.push_str(&renamed);
                out.push_str(trailing);
                out.push('{');
                out.push_str(body);
                out.push('}');
            } else if GROUP_AT_RULES.contains(&name) {
                out.push_str(rest);
                out.push('{');
                let inner = self.scope_block(body);
                out.push_str(&inner);
                out.push('}');
            } else {
                out.push_str(rest);
                out.push('{');
                out.push_str(body);
                out.push('}');
            }
            return;
        }

        out.push_str(&scope_selector_list(head, &self.attribute));
        out.push_str(trailing);
        out.push('{');
        out.push_str(body);
        out.push('}');
    }

    fn rename_animations(&self, css: &str) -> String {
        ANIMATION_DECLARATION
            .replace_all(css, |caps: &Captures<'_>| {
                let value = &caps[5];
                let is_name_only = caps.get(3).is_some();
                let renamed = value
                    .split(',')
                    .map(|part| {
                        if is_name_only {
                            let name = part.trim();
                            self.keyframes
                                .get(name)
                                .map_or_else(|| name.to_owned(), Clone::clone)
                        } else {
                            self.rename_in_shorthand(part)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}{}{}{}", &caps[1], &caps[2], &caps[4], renamed)
            })
            .into_owned()
    }

    fn rename_in_shorthand(&self, part: &str) -> String {
        let mut values: Vec<&str> = part.split_whitespace().collect();
        match values.iter().position(|value| self.keyframes.contains_key(*value)) {
            Some(index) => {
                let renamed = &self.keyframes[values[index]];
                values[index] = renamed;
                values.join(" ")
            }
            None => part.trim().to_owned(),
        }
    }
}

/// Scope every selector of a comma separated list.
pub fn scope_selector_list(selectors: &str, attribute: &str) -> String {
    split_top_level(selectors, b',')
        .into_iter()
        .map(|selector| {
            let trimmed = selector.trim_start();
            let leading = &selector[..selector.len() - trimmed.len()];
            format!("{leading}{}", scope_selector(trimmed.trim_end(), attribute))
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Scope a single complex selector.
pub fn scope_selector(selector: &str, attribute: &str) -> String {
    if let Some(found) = find_pseudo(selector, &["::v-global", ":global"]) {
        if let Some(argument) = found.argument {
            return argument.trim().to_owned();
        }
    }

    for combinator in [">>>", "/deep/"] {
        if let Some(at) = selector.find(combinator) {
            let right = selector[at + combinator.len()..].trim_start();
            return join_deep(&selector[..at], right, attribute);
        }
    }

    if let Some(found) = find_pseudo(selector, &["::v-deep", ":deep"]) {
        let left = &selector[..found.start];
        let right = match found.argument {
            Some(argument) => format!("{}{}", argument.trim(), &selector[found.end..]),
            None => selector[found.end..].trim_start().to_owned(),
        };
        return join_deep(left, &right, attribute);
    }

    if let Some(found) = find_pseudo(selector, &["::v-slotted", ":slotted"]) {
        if let Some(argument) = found.argument {
            let slotted = format!("{attribute}-s");
            return format!(
                "{}{}{}",
                &selector[..found.start],
                inject_attribute(argument.trim(), &slotted),
                &selector[found.end..]
            );
        }
    }

    inject_attribute(selector, attribute)
}

fn join_deep(left: &str, right: &str, attribute: &str) -> String {
    let left = left.trim_end();
    if left.is_empty() {
        format!("[{attribute}] {right}")
    } else {
        format!("{} {right}", inject_attribute(left, attribute))
    }
}

/// Insert `[attribute]` after the last simple selector that is not a pseudo
/// class or element, or at the start when there is none.
fn inject_attribute(selector: &str, attribute: &str) -> String {
    let selector = selector.trim();
    match insertion_point(selector) {
        Some(at) => format!("{}[{attribute}]{}", &selector[..at], &selector[at..]),
        None => format!("[{attribute}]{selector}"),
    }
}

fn insertion_point(selector: &str) -> Option<usize> {
    let bytes = selector.as_bytes();
    let mut last_end = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'+' | b'~' => i += 1,
            b':' => {
                i += 1;
                if bytes.get(i) == Some(&b':') {
                    i += 1;
                }
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                if bytes.get(i) == Some(&b'(') {
                    i = skip_group(bytes, i, b'(', b')');
                }
            }
            b'[' => {
                i = skip_group(bytes, i, b'[', b']');
                last_end = Some(i);
            }
            _ => {
                while i < bytes.len() && !is_compound_break(bytes[i]) {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = i.min(bytes.len());
                last_end = Some(i);
            }
        }
    }
    last_end
}

const fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' || byte >= 0x80
}

const fn is_compound_break(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'+' | b'~' | b':' | b'[')
}

/// Index just past the group opened at `open`.
fn skip_group(bytes: &[u8], open: usize, opener: u8, closer: u8) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b if b == opener => depth += 1,
            b if b == closer => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            b'"' | b'\'' => i = skip_string(bytes, i) - 1,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

struct PseudoMatch<'s> {
    start: usize,
    end: usize,
    argument: Option<&'s str>,
}

fn find_pseudo<'s>(selector: &'s str, names: &[&str]) -> Option<PseudoMatch<'s>> {
    let bytes = selector.as_bytes();
    for name in names {
        let mut from = 0;
        while let Some(offset) = selector[from..].find(name) {
            let start = from + offset;
            let after = start + name.len();
            from = after;
            // `:deep` must not match `:deeper`
            if bytes.get(after).is_some_and(|&b| is_ident_byte(b)) {
                continue;
            }
            // `:global` inside `::v-global` is matched by the longer name
            if start > 0 && bytes[start - 1] == b':' && !name.starts_with("::") {
                continue;
            }
            if bytes.get(after) == Some(&b'(') {
                let end = skip_group(bytes, after, b'(', b')');
                let inner_end = end.saturating_sub(1).max(after + 1);
                return Some(PseudoMatch {
                    start,
                    end,
                    argument: Some(&selector[after + 1..inner_end]),
                });
            }
            return Some(PseudoMatch {
                start,
                end: after,
                argument: None,
            });
        }
    }
    None
}

/// Split on `separator` outside parentheses, brackets and strings.
fn split_top_level(text: &str, separator: u8) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b if b == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

/// Index just past the string literal starting at `open`.
fn skip_string(bytes: &[u8], open: usize) -> usize {
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b if b == quote => return i + 1,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Index just past the comment starting at `open` (which is `/*`).
fn skip_comment(text: &str, open: usize) -> usize {
    text[open + 2..]
        .find("*/")
        .map_or(text.len(), |offset| open + 2 + offset + 2)
}

/// Next `{` or `;` at nesting depth zero, skipping strings and comments.
fn next_delimiter(text: &str, from: usize) -> Option<(usize, u8)> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_comment(text, i);
                continue;
            }
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b @ (b'{' | b';') if depth == 0 => return Some((i, b)),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the `}` closing the `{` at `open`.
fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_comment(text, i);
                continue;
            }
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split whitespace and comments off the front of a rule prelude.
fn split_leading_trivia(prelude: &str) -> (&str, &str) {
    let mut i = 0;
    loop {
        let rest = &prelude[i..];
        let trimmed = rest.trim_start();
        i += rest.len() - trimmed.len();
        if trimmed.starts_with("/*") {
            i = skip_comment(prelude, i);
        } else {
            break;
        }
    }
    prelude.split_at(i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ATTR: &str = "data-p-abc";

    #[test]
    fn test_simple_selectors() {
        assert_eq!(scope_selector(".a", ATTR), ".a[data-p-abc]");
        assert_eq!(scope_selector(".a .b", ATTR), ".a .b[data-p-abc]");
        assert_eq!(scope_selector("a > b.c", ATTR), "a > b.c[data-p-abc]");
        assert_eq!(scope_selector(".a:hover", ATTR), ".a[data-p-abc]:hover");
        assert_eq!(scope_selector(".a::before", ATTR), ".a[data-p-abc]::before");
        assert_eq!(scope_selector("input[type=text]", ATTR), "input[type=text][data-p-abc]");
        assert_eq!(scope_selector(":hover", ATTR), "[data-p-abc]:hover");
        assert_eq!(scope_selector(".a:not(.b)", ATTR), ".a[data-p-abc]:not(.b)");
    }

    #[test]
    fn test_deep_selectors() {
        assert_eq!(scope_selector(".foo ::v-deep(.bar)", ATTR), ".foo[data-p-abc] .bar");
        assert_eq!(scope_selector(".foo :deep(.bar)", ATTR), ".foo[data-p-abc] .bar");
        assert_eq!(scope_selector(".foo ::v-deep .bar", ATTR), ".foo[data-p-abc] .bar");
        assert_eq!(scope_selector(".foo >>> .bar", ATTR), ".foo[data-p-abc] .bar");
        assert_eq!(scope_selector(".foo /deep/ .bar", ATTR), ".foo[data-p-abc] .bar");
        assert_eq!(scope_selector(":deep(.bar)", ATTR), "[data-p-abc] .bar");
    }

    #[test]
    fn test_slotted_and_global() {
        assert_eq!(scope_selector("::v-slotted(.foo)", ATTR), ".foo[data-p-abc-s]");
        assert_eq!(scope_selector(":slotted(.foo)", ATTR), ".foo[data-p-abc-s]");
        assert_eq!(scope_selector(":global(.foo)", ATTR), ".foo");
        assert_eq!(scope_selector("::v-global(.foo .bar)", ATTR), ".foo .bar");
    }

    #[test]
    fn test_selector_list() {
        assert_eq!(
            scope_selector_list(".a, .b:hover,\n.c", ATTR),
            ".a[data-p-abc], .b[data-p-abc]:hover,\n.c[data-p-abc]"
        );
        assert_eq!(
            scope_selector_list(".a:is(.b, .c)", ATTR),
            ".a[data-p-abc]:is(.b, .c)"
        );
    }

    #[test]
    fn test_stylesheet_rules_and_media() {
        let css = "/* head */\n.a { color: red; }\n@media (min-width: 10px) {\n  .b { color: blue; }\n}\n@font-face { font-family: x; }\n@import url(\"x.css\");\n";
        let expected = "/* head */\n.a[data-p-abc] { color: red; }\n@media (min-width: 10px) {\n  .b[data-p-abc] { color: blue; }\n}\n@font-face { font-family: x; }\n@import url(\"x.css\");\n";
        assert_eq!(scope_stylesheet(css, "abc"), expected);
    }

    #[test]
    fn test_keyframes_are_renamed() {
        let css = "@keyframes spin { from { opacity: 0 } to { opacity: 1 } }\n.a { animation: spin 1s linear; }\n.b { animation-name: spin, other; }\n";
        let expected = "@keyframes spin-abc { from { opacity: 0 } to { opacity: 1 } }\n.a[data-p-abc] { animation: spin-abc 1s linear; }\n.b[data-p-abc] { animation-name: spin-abc,other; }\n";
        assert_eq!(scope_stylesheet(css, "abc"), expected);
    }

    #[test]
    fn test_unterminated_block_is_copied() {
        assert_eq!(scope_stylesheet(".a { color: red", "abc"), ".a { color: red");
    }
}
