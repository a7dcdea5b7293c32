//! Best-effort annotation parsing.
//!
//! ButterKnife annotations only ever carry `R.id.*` references, either as a
//! single positional argument or as a brace-enclosed array, but the parser
//! here accepts general named/positional arguments so it does not trip over
//! unrelated annotations sharing the modifier list.

use std::collections::HashMap;

use tree_sitter::Node;
use unbind_core::Span;

use crate::node_text;

/// A parsed Java annotation.
///
/// String and char literals have their surrounding quotes stripped; every
/// other argument value is kept as raw source text (so an array argument
/// arrives as `{R.id.a, R.id.b}` for the caller to split).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedAnnotation {
    pub simple_name: String,
    pub args: HashMap<String, String>,
    pub span: Span,
}

impl ParsedAnnotation {
    /// The single positional argument, if any.
    pub fn value(&self) -> Option<&str> {
        self.args.get("value").map(String::as_str)
    }
}

/// Collect all annotation nodes under a modifiers node.
pub fn collect_annotations(modifiers: Node<'_>, source: &str) -> Vec<ParsedAnnotation> {
    let mut anns = Vec::new();
    let mut cursor = modifiers.walk();
    for child in modifiers.named_children(&mut cursor) {
        if child.kind().ends_with("annotation") {
            let span = Span::new(child.start_byte(), child.end_byte());
            if let Some(ann) = parse_annotation_text(node_text(source, child), span) {
                anns.push(ann);
            }
        }
    }
    anns
}

/// Parse an annotation from raw source text and its span.
pub fn parse_annotation_text(text: &str, span: Span) -> Option<ParsedAnnotation> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('@')?;

    let (name_part, args_part) = match rest.find('(') {
        Some(idx) => (&rest[..idx], Some(paren_contents(&rest[idx..])?)),
        None => (rest, None),
    };

    let simple_name = name_part
        .trim()
        .rsplit('.')
        .next()
        .unwrap_or(name_part)
        .trim()
        .to_string();
    if simple_name.is_empty() {
        return None;
    }

    let mut args = HashMap::new();
    if let Some(args_part) = args_part {
        for seg in split_top_level_commas(args_part) {
            if seg.is_empty() {
                continue;
            }
            match split_named_arg(seg) {
                Some((key, value)) => {
                    args.insert(key.to_string(), unquote(value));
                }
                // Single positional argument => `value`.
                None => {
                    args.insert("value".to_string(), unquote(seg));
                }
            }
        }
    }

    Some(ParsedAnnotation {
        simple_name,
        args,
        span,
    })
}

/// Contents of the balanced paren group starting at `input[0] == '('`.
fn paren_contents(input: &str) -> Option<&str> {
    let mut depth = 0u32;
    let mut scanner = QuoteScanner::default();

    for (idx, ch) in input.char_indices() {
        if scanner.consume(ch) {
            continue;
        }
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(input[1..idx].trim());
                }
            }
            _ => {}
        }
    }

    // Unbalanced parens; best-effort: take the rest.
    Some(input[1..].trim())
}

fn split_top_level_commas(input: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = Depth::default();
    let mut scanner = QuoteScanner::default();
    let mut last = 0usize;

    for (idx, ch) in input.char_indices() {
        if scanner.consume(ch) {
            continue;
        }
        depth.consume(ch);
        if ch == ',' && depth.is_zero() {
            out.push(input[last..idx].trim());
            last = idx + 1;
        }
    }

    out.push(input[last..].trim());
    out
}

fn split_named_arg(segment: &str) -> Option<(&str, &str)> {
    let mut depth = Depth::default();
    let mut scanner = QuoteScanner::default();
    let bytes = segment.as_bytes();

    for (idx, ch) in segment.char_indices() {
        if scanner.consume(ch) {
            continue;
        }
        depth.consume(ch);
        if ch == '=' && depth.is_zero() {
            // Avoid treating equality/comparison operators as named arguments.
            let prev = idx.checked_sub(1).and_then(|p| bytes.get(p)).copied();
            let next = bytes.get(idx + 1).copied();
            if matches!(prev, Some(b'=') | Some(b'!') | Some(b'<') | Some(b'>'))
                || next == Some(b'=')
            {
                continue;
            }

            let key = segment[..idx].trim();
            if !is_ident(key) {
                continue;
            }
            return Some((key, segment[idx + 1..].trim()));
        }
    }

    None
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        return value[1..value.len() - 1].to_string();
    }
    value.to_string()
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Tracks string/char literal state so structural characters inside
/// literals are ignored. `consume` returns true while inside a literal.
#[derive(Default)]
struct QuoteScanner {
    in_string: bool,
    in_char: bool,
    escape: bool,
}

impl QuoteScanner {
    fn consume(&mut self, ch: char) -> bool {
        if self.in_string || self.in_char {
            if self.escape {
                self.escape = false;
            } else if ch == '\\' {
                self.escape = true;
            } else if self.in_string && ch == '"' {
                self.in_string = false;
            } else if self.in_char && ch == '\'' {
                self.in_char = false;
            }
            return true;
        }
        match ch {
            '"' => self.in_string = true,
            '\'' => self.in_char = true,
            _ => return false,
        }
        true
    }
}

#[derive(Default)]
struct Depth {
    paren: u32,
    brace: u32,
    bracket: u32,
}

impl Depth {
    fn consume(&mut self, ch: char) {
        match ch {
            '(' => self.paren += 1,
            ')' => self.paren = self.paren.saturating_sub(1),
            '{' => self.brace += 1,
            '}' => self.brace = self.brace.saturating_sub(1),
            '[' => self.bracket += 1,
            ']' => self.bracket = self.bracket.saturating_sub(1),
            _ => {}
        }
    }

    fn is_zero(&self) -> bool {
        self.paren == 0 && self.brace == 0 && self.bracket == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedAnnotation {
        parse_annotation_text(text, Span::new(0, text.len())).expect("annotation")
    }

    #[test]
    fn parses_bare_annotation() {
        let ann = parse("@Override");
        assert_eq!(ann.simple_name, "Override");
        assert!(ann.args.is_empty());
    }

    #[test]
    fn parses_positional_and_named_args() {
        let ann = parse("@X(\"foo\", name = \"bar\")");
        assert_eq!(ann.simple_name, "X");
        assert_eq!(ann.value(), Some("foo"));
        assert_eq!(ann.args.get("name").map(String::as_str), Some("bar"));
    }

    #[test]
    fn strips_qualified_names() {
        let ann = parse("@butterknife.BindView(R.id.login_button)");
        assert_eq!(ann.simple_name, "BindView");
        assert_eq!(ann.value(), Some("R.id.login_button"));
    }

    #[test]
    fn keeps_array_arguments_whole() {
        let ann = parse("@OnClick({R.id.a, R.id.b})");
        assert_eq!(ann.value(), Some("{R.id.a, R.id.b}"));
    }

    #[test]
    fn does_not_split_commas_inside_strings() {
        let ann = parse("@X(value = \"a,b\", name=\"c\")");
        assert_eq!(ann.value(), Some("a,b"));
        assert_eq!(ann.args.get("name").map(String::as_str), Some("c"));
    }

    #[test]
    fn handles_nested_parens_in_values() {
        let ann = parse("@X(value = foo(\"a,b\", bar(1,2)), name = \"x\")");
        assert_eq!(ann.value(), Some("foo(\"a,b\", bar(1,2))"));
        assert_eq!(ann.args.get("name").map(String::as_str), Some("x"));
    }

    #[test]
    fn does_not_mistake_comparisons_for_named_args() {
        let ann = parse("@X(a == b)");
        assert_eq!(ann.value(), Some("a == b"));
    }
}
