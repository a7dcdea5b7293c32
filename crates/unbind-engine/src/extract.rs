//! Recognizes ButterKnife annotations on a class snapshot and turns them
//! into field and handler bindings.

use std::collections::HashMap;

use unbind_core::Diagnostic;
use unbind_java::ClassShape;

/// The listener family a handler annotation maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Click,
    LongClick,
    CheckedChanged,
    TextChanged,
    EditorAction,
    FocusChange,
    ItemClick,
    ItemSelected,
    Touch,
}

impl ListenerKind {
    pub fn from_annotation(simple_name: &str) -> Option<Self> {
        Some(match simple_name {
            "OnClick" => Self::Click,
            "OnLongClick" => Self::LongClick,
            "OnCheckedChanged" => Self::CheckedChanged,
            "OnTextChanged" => Self::TextChanged,
            "OnEditorAction" => Self::EditorAction,
            "OnFocusChange" => Self::FocusChange,
            "OnItemClick" => Self::ItemClick,
            "OnItemSelected" => Self::ItemSelected,
            "OnTouch" => Self::Touch,
            _ => return None,
        })
    }
}

/// Handler annotations that are stripped but produce no listener code.
pub const REMOVAL_ONLY_ANNOTATIONS: &[&str] = &["OnItemLongClick"];

pub fn is_recognized_field_annotation(simple_name: &str) -> bool {
    simple_name == "BindView"
}

pub fn is_recognized_method_annotation(simple_name: &str) -> bool {
    ListenerKind::from_annotation(simple_name).is_some()
        || REMOVAL_ONLY_ANNOTATIONS.contains(&simple_name)
}

/// One `@BindView` field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldBinding {
    pub field_name: String,
    pub type_name: String,
    pub resource_id: String,
}

/// One handler method with the ids it listens on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerBinding {
    pub method_name: String,
    pub has_params: bool,
    pub first_param_type: Option<String>,
    pub resource_ids: Vec<String>,
    pub kind: ListenerKind,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub fields: Vec<FieldBinding>,
    pub handlers: Vec<HandlerBinding>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.handlers.is_empty()
    }

    /// The field bound to `resource_id`. When several fields claim the same
    /// id, the later declaration wins.
    pub fn field_for_id(&self, resource_id: &str) -> Option<&FieldBinding> {
        self.fields
            .iter()
            .rev()
            .find(|f| f.resource_id == resource_id)
    }
}

/// Scan a class snapshot for ButterKnife bindings.
pub fn extract(class: &ClassShape) -> Extraction {
    let mut out = Extraction::default();
    let mut seen_ids: HashMap<String, String> = HashMap::new();

    for field in &class.fields {
        for ann in &field.annotations {
            if !is_recognized_field_annotation(&ann.simple_name) {
                continue;
            }
            let ids = ann.value().map(resource_ids_from_value).unwrap_or_default();
            let Some(resource_id) = ids.into_iter().next() else {
                out.diagnostics.push(Diagnostic::warning(
                    "bind-view-unparsed",
                    format!(
                        "@BindView on field '{}' carries no parsable R.id reference",
                        field.name()
                    ),
                    Some(ann.span),
                ));
                continue;
            };

            if let Some(earlier) = seen_ids.insert(resource_id.clone(), field.name().to_string())
            {
                out.diagnostics.push(Diagnostic::warning(
                    "duplicate-id",
                    format!(
                        "resource id '{resource_id}' is bound by both '{earlier}' and '{}'; \
                         the later binding wins",
                        field.name()
                    ),
                    Some(ann.span),
                ));
            }

            out.fields.push(FieldBinding {
                field_name: field.name().to_string(),
                type_name: field.type_name.clone(),
                resource_id,
            });
        }
    }

    for method in &class.methods {
        for ann in &method.annotations {
            let Some(kind) = ListenerKind::from_annotation(&ann.simple_name) else {
                continue;
            };
            let resource_ids = ann.value().map(resource_ids_from_value).unwrap_or_default();
            if resource_ids.is_empty() {
                out.diagnostics.push(Diagnostic::warning(
                    "handler-unparsed",
                    format!(
                        "@{} on method '{}' carries no parsable R.id references",
                        ann.simple_name, method.name
                    ),
                    Some(ann.span),
                ));
                continue;
            }
            out.handlers.push(HandlerBinding {
                method_name: method.name.clone(),
                has_params: method.has_params(),
                first_param_type: method.first_param_type().map(str::to_string),
                resource_ids,
                kind,
            });
        }
    }

    out
}

/// Pull resource id names out of an annotation argument: either a single
/// `R.id.x` reference or a brace-enclosed array `{R.id.a, R.id.b}`.
pub fn resource_ids_from_value(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed);

    inner
        .split(',')
        .filter_map(|token| {
            let token = token.trim();
            let idx = token.find(".id.")?;
            let name = &token[idx + ".id.".len()..];
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            valid.then(|| name.to_string())
        })
        .collect()
}
