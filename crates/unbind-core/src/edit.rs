//! Text edit primitives and utilities.

use crate::Span;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TextEdit {
    pub span: Span,
    pub replacement: String,
}

impl TextEdit {
    pub fn new(span: Span, replacement: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
        }
    }

    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(Span::empty(offset), text)
    }

    pub fn delete(span: Span) -> Self {
        Self::new(span, "")
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum EditError {
    SpanOutOfBounds { span: Span, text_len: usize },
    InvalidUtf8Boundary { offset: usize },
    OverlappingEdits { first: Span, second: Span },
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::SpanOutOfBounds { span, text_len } => write!(
                f,
                "edit span {span:?} is out of bounds for text length {text_len}"
            ),
            EditError::InvalidUtf8Boundary { offset } => {
                write!(f, "offset {offset} is not a UTF-8 character boundary")
            }
            EditError::OverlappingEdits { first, second } => {
                write!(f, "overlapping edits: {first:?} overlaps {second:?}")
            }
        }
    }
}

impl std::error::Error for EditError {}

/// Apply a list of edits to a text snapshot.
///
/// The function is deterministic: edits are first sorted by `(start, end)`
/// and applied from the end of the text backwards, so either every edit in
/// the set applies or none does.
pub fn apply_text_edits(text: &str, edits: &[TextEdit]) -> Result<String, EditError> {
    let mut edits = edits.to_vec();
    normalize_text_edits(text, &mut edits)?;

    let mut out = text.to_string();
    for edit in edits.into_iter().rev() {
        debug_assert!(out.is_char_boundary(edit.span.start) && out.is_char_boundary(edit.span.end));
        out.replace_range(edit.span.start..edit.span.end, &edit.replacement);
    }
    Ok(out)
}

/// Sort edits and check for overlaps / out-of-bounds.
pub fn normalize_text_edits(text: &str, edits: &mut Vec<TextEdit>) -> Result<(), EditError> {
    edits.sort_by_key(|e| (e.span.start, e.span.end));

    let text_len = text.len();

    for edit in edits.iter() {
        if edit.span.start > edit.span.end || edit.span.end > text_len {
            return Err(EditError::SpanOutOfBounds {
                span: edit.span,
                text_len,
            });
        }
        if !text.is_char_boundary(edit.span.start) {
            return Err(EditError::InvalidUtf8Boundary {
                offset: edit.span.start,
            });
        }
        if !text.is_char_boundary(edit.span.end) {
            return Err(EditError::InvalidUtf8Boundary {
                offset: edit.span.end,
            });
        }
    }

    for pair in edits.windows(2) {
        let first = &pair[0];
        let second = &pair[1];
        if first.span.end > second.span.start
            || (first.span.is_empty()
                && second.span.is_empty()
                && first.span.start == second.span.start)
        {
            return Err(EditError::OverlappingEdits {
                first: first.span,
                second: second.span,
            });
        }
    }

    // Coalesce adjacent edits (e.g. two back-to-back inserts/replacements).
    let mut merged: Vec<TextEdit> = Vec::with_capacity(edits.len());
    for edit in edits.drain(..) {
        if let Some(last) = merged.last_mut() {
            if last.span.end == edit.span.start {
                last.span = Span::new(last.span.start, edit.span.end);
                last.replacement.push_str(&edit.replacement);
                continue;
            }
        }
        merged.push(edit);
    }
    *edits = merged;

    Ok(())
}
