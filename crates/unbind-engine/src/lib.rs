//! The ButterKnife rewrite engine.
//!
//! One pass over one Java source file: recognize ButterKnife bindings,
//! derive the backing layout, optionally validate/repair that layout, then
//! rewrite the class to plain `findViewById` calls or generated View
//! Binding accessors. The engine only ever edits in-memory text; callers
//! own all file IO.

mod extract;
mod listener;

pub use extract::{
    extract, is_recognized_field_annotation, is_recognized_method_annotation,
    resource_ids_from_value, Extraction, FieldBinding, HandlerBinding, ListenerKind,
    REMOVAL_ONLY_ANNOTATIONS,
};
pub use listener::listener_statement;

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use unbind_core::{apply_text_edits, Diagnostic, EditError, Span, TextEdit};
use unbind_java::{parse_java, primary_class, ClassShape, FieldShape, IdentContext};
use unbind_layout::{BindingRequirement, IdOrigin, LayoutIndex, LayoutSession};
use unbind_names::{binding_class_name, binding_field_name, layout_name_for_class};

/// Rewrite strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    FindViewById,
    #[default]
    ViewBinding,
}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("Java parse failed: {0}")]
    Parse(String),
    #[error(transparent)]
    Edit(#[from] EditError),
}

#[derive(Debug)]
pub struct RewriteOutcome {
    pub source: String,
    pub changed: bool,
    /// Layout name the rewrite was based on, when one could be derived.
    pub layout: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RewriteOutcome {
    fn unchanged(source: &str) -> Self {
        Self {
            source: source.to_string(),
            changed: false,
            layout: None,
            diagnostics: Vec::new(),
        }
    }
}

/// Rewrite one Java source file. A file without recognized annotations
/// comes back byte-for-byte unchanged.
pub fn rewrite_source(
    source: &str,
    mode: Mode,
    mut layouts: Option<&mut LayoutSession>,
) -> Result<RewriteOutcome, RewriteError> {
    let tree = parse_java(source).map_err(RewriteError::Parse)?;
    let Some(class) = primary_class(tree.root_node(), source) else {
        return Ok(RewriteOutcome::unchanged(source));
    };

    let extraction = extract(&class);
    if extraction.is_empty() && !has_removal_only_annotations(&class) {
        return Ok(RewriteOutcome::unchanged(source));
    }

    let mut diagnostics = extraction.diagnostics.clone();

    let layout_name = derive_layout_name(&class, source, layouts.as_deref().map(|s| s.index()));
    debug!(class = %class.name, layout = ?layout_name, ?mode, "rewriting");

    // Layout validation/repair only runs when a session was injected.
    let mut resolutions: HashMap<String, IdOrigin> = HashMap::new();
    if let (Some(session), Some(layout)) = (layouts.as_deref_mut(), layout_name.as_deref()) {
        let requirements = binding_requirements(&extraction);
        let report = session.validate_and_repair(layout, &requirements);
        diagnostics.extend(report.diagnostics);
        resolutions = report.resolutions;
    }

    let binding_class = binding_class_name(layout_name.as_deref().unwrap_or(""));
    let mut edits: Vec<TextEdit> = Vec::new();
    // Spans being deleted or replaced wholesale; identifier references
    // inside them must not be rewritten a second time.
    let mut consumed: Vec<Span> = Vec::new();

    let bound_fields = bound_field_shapes(&class, &extraction);
    let anchor = find_anchor(&class, source);

    remove_or_replace_fields(
        source,
        &class,
        &extraction,
        &bound_fields,
        mode,
        &binding_class,
        &mut edits,
        &mut consumed,
        &mut diagnostics,
    );
    remove_handler_annotations(source, &class, &mut edits);
    remove_butterknife_residue(source, &class, &mut edits, &mut consumed);

    let accessor = |id: &str| -> String {
        match resolutions.get(id) {
            Some(IdOrigin {
                include_id: Some(include_id),
                ..
            }) => format!(
                "binding.{}.{}",
                binding_field_name(include_id),
                binding_field_name(id)
            ),
            _ => format!("binding.{}", binding_field_name(id)),
        }
    };

    match &anchor {
        Some(anchor) if !extraction.is_empty() => {
            rewrite_anchor(
                source,
                anchor,
                mode,
                &binding_class,
                &extraction,
                &accessor,
                &mut edits,
                &mut consumed,
                &mut diagnostics,
            );
        }
        // Removal-only pass: annotations and residue go, the
        // initialization statement stays as written.
        Some(_) => {}
        None => {
            if !extraction.is_empty() {
                diagnostics.push(Diagnostic::warning(
                    "no-anchor",
                    format!(
                        "class '{}' has no setContentView/inflate statement; \
                         bindings were removed but no initialization was generated",
                        class.name
                    ),
                    None,
                ));
            }
        }
    }

    if mode == Mode::ViewBinding && !bound_fields.is_empty() {
        rewrite_field_references(&class, &extraction, &bound_fields, &accessor, &consumed, &mut edits);
        add_binding_teardown(source, &class, &mut edits);
    }

    let new_source = apply_text_edits(source, &edits)?;
    let changed = new_source != source;
    Ok(RewriteOutcome {
        source: new_source,
        changed,
        layout: layout_name,
        diagnostics,
    })
}

fn has_removal_only_annotations(class: &ClassShape) -> bool {
    class.methods.iter().any(|m| {
        m.annotations
            .iter()
            .any(|a| REMOVAL_ONLY_ANNOTATIONS.contains(&a.simple_name.as_str()))
    })
}

fn binding_requirements(extraction: &Extraction) -> Vec<BindingRequirement> {
    let mut requirements: Vec<BindingRequirement> = extraction
        .fields
        .iter()
        .map(|f| BindingRequirement {
            resource_id: f.resource_id.clone(),
            type_name: f.type_name.clone(),
            field_name: f.field_name.clone(),
        })
        .collect();

    // Handler-only ids still have to exist in the layout.
    let covered: HashSet<&str> = requirements
        .iter()
        .map(|r| r.resource_id.as_str())
        .collect();
    let mut extra = Vec::new();
    for handler in &extraction.handlers {
        for id in &handler.resource_ids {
            if !covered.contains(id.as_str()) && !extra.iter().any(|r: &BindingRequirement| &r.resource_id == id) {
                extra.push(BindingRequirement {
                    resource_id: id.clone(),
                    type_name: "View".to_string(),
                    field_name: handler.method_name.clone(),
                });
            }
        }
    }
    requirements.extend(extra);
    requirements
}

// ---------------------------------------------------------------------------
// Layout derivation

fn content_view_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"setContentView\s*\(\s*R\s*\.\s*layout\s*\.\s*([A-Za-z0-9_]+)")
            .expect("static regex")
    })
}

fn inflate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\.\s*inflate\s*\(\s*R\s*\.\s*layout\s*\.\s*([A-Za-z0-9_]+)")
            .expect("static regex")
    })
}

/// Layout name for a class: `setContentView(R.layout.x)` in a one-argument
/// `onCreate`, else `inflate(R.layout.x, ...)` in a three-argument
/// `onCreateView`, else derivation from the class name, else a loose match
/// against the layout index.
pub fn derive_layout_name(
    class: &ClassShape,
    source: &str,
    index: Option<&LayoutIndex>,
) -> Option<String> {
    for method in &class.methods {
        if method.name == "onCreate" && method.params.len() == 1 {
            if let Some(body) = &method.body {
                let text = &source[body.span.start..body.span.end];
                if let Some(caps) = content_view_re().captures(text) {
                    return Some(caps[1].to_string());
                }
            }
        }
    }
    for method in &class.methods {
        if method.name == "onCreateView" && method.params.len() == 3 {
            if let Some(body) = &method.body {
                let text = &source[body.span.start..body.span.end];
                if let Some(caps) = inflate_re().captures(text) {
                    return Some(caps[1].to_string());
                }
            }
        }
    }

    let derived = layout_name_for_class(&class.name);
    if let Some(index) = index {
        if let Some(derived) = &derived {
            if index.get(derived).is_some() {
                return Some(derived.clone());
            }
            if let Some(matched) = index.best_match(derived) {
                return Some(matched.to_string());
            }
        }
    }
    derived
}

// ---------------------------------------------------------------------------
// Anchors

enum Anchor {
    /// `setContentView(R.layout.x);` inside `onCreate`.
    ContentView { stmt: Span, indent: String },
    /// The `inflate(R.layout.x, ...)` statement inside `onCreateView`.
    Inflate {
        stmt: Span,
        indent: String,
        inflater: String,
        container: String,
    },
}

impl Anchor {
    fn stmt(&self) -> Span {
        match self {
            Anchor::ContentView { stmt, .. } | Anchor::Inflate { stmt, .. } => *stmt,
        }
    }

    fn indent(&self) -> &str {
        match self {
            Anchor::ContentView { indent, .. } | Anchor::Inflate { indent, .. } => indent,
        }
    }
}

fn find_anchor(class: &ClassShape, source: &str) -> Option<Anchor> {
    for method in &class.methods {
        if method.name == "onCreate" && method.params.len() == 1 {
            if let Some(body) = &method.body {
                for stmt in &body.statements {
                    let text = &source[stmt.span.start..stmt.span.end];
                    if text.contains("setContentView") {
                        return Some(Anchor::ContentView {
                            stmt: stmt.span,
                            indent: indent_of(source, stmt.span.start),
                        });
                    }
                }
            }
        }
    }
    for method in &class.methods {
        if method.name == "onCreateView" && method.params.len() == 3 {
            if let Some(body) = &method.body {
                for stmt in &body.statements {
                    let text = &source[stmt.span.start..stmt.span.end];
                    if inflate_re().is_match(text) {
                        let inflater = param_name(&method.params, 0, "inflater");
                        let container = param_name(&method.params, 1, "container");
                        return Some(Anchor::Inflate {
                            stmt: stmt.span,
                            indent: indent_of(source, stmt.span.start),
                            inflater,
                            container,
                        });
                    }
                }
            }
        }
    }
    None
}

fn param_name(params: &[unbind_java::ParamShape], idx: usize, fallback: &str) -> String {
    params
        .get(idx)
        .map(|p| p.name.as_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

// ---------------------------------------------------------------------------
// Removal steps

#[allow(clippy::too_many_arguments)]
fn remove_or_replace_fields(
    source: &str,
    class: &ClassShape,
    extraction: &Extraction,
    bound_fields: &[&FieldShape],
    mode: Mode,
    binding_class: &str,
    edits: &mut Vec<TextEdit>,
    consumed: &mut Vec<Span>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match mode {
        Mode::FindViewById => {
            // Fields stay; only their @BindView annotations go.
            for field in bound_fields {
                for ann in &field.annotations {
                    if is_recognized_field_annotation(&ann.simple_name) {
                        edits.push(annotation_removal_edit(source, ann.span));
                    }
                }
            }
        }
        Mode::ViewBinding => {
            let mut declared_binding = false;
            for field in bound_fields {
                if field.names.len() > 1 {
                    diagnostics.push(Diagnostic::warning(
                        "multi-declarator-field",
                        format!(
                            "field declaration for '{}' declares several variables \
                             and was left in place",
                            field.name()
                        ),
                        Some(field.span),
                    ));
                    for ann in &field.annotations {
                        if is_recognized_field_annotation(&ann.simple_name) {
                            edits.push(annotation_removal_edit(source, ann.span));
                        }
                    }
                    continue;
                }

                let span = line_span(source, field.span);
                let replacement = if !declared_binding {
                    declared_binding = true;
                    format!(
                        "{}private {} binding;\n",
                        indent_of(source, field.span.start),
                        binding_class
                    )
                } else {
                    String::new()
                };
                edits.push(TextEdit::new(span, replacement));
                consumed.push(span);
            }

            // Handler-only classes still need the binding holder.
            if !declared_binding && !extraction.handlers.is_empty() {
                edits.push(TextEdit::insert(
                    class.body_span.start + 1,
                    format!("\n    private {binding_class} binding;\n"),
                ));
            }
        }
    }
}

fn remove_handler_annotations(source: &str, class: &ClassShape, edits: &mut Vec<TextEdit>) {
    for method in &class.methods {
        for ann in &method.annotations {
            if is_recognized_method_annotation(&ann.simple_name) {
                edits.push(annotation_removal_edit(source, ann.span));
            }
        }
    }
}

/// Strip `butterknife.*` imports, `ButterKnife.bind(...)`-style statements,
/// `Unbinder` fields and their `unbind()` calls.
fn remove_butterknife_residue(
    source: &str,
    class: &ClassShape,
    edits: &mut Vec<TextEdit>,
    consumed: &mut Vec<Span>,
) {
    for import in &class.imports {
        let path = import.path.trim_start_matches("static ").trim();
        if path.starts_with("butterknife.") || path == "butterknife" {
            edits.push(TextEdit::delete(line_span(source, import.span)));
        }
    }

    let mut unbinder_names: Vec<&str> = Vec::new();
    for field in &class.fields {
        if unbind_names::simple_type_name(&field.type_name) == "Unbinder" {
            unbinder_names.extend(field.names.iter().map(String::as_str));
            let span = line_span(source, field.span);
            edits.push(TextEdit::delete(span));
            consumed.push(span);
        }
    }

    let mut removed: HashSet<(usize, usize)> = HashSet::new();
    for method in &class.methods {
        let Some(body) = &method.body else { continue };
        for stmt in &body.statements {
            let text = source[stmt.span.start..stmt.span.end].trim();
            let is_bind_call = text.contains("ButterKnife.");
            let is_unbind_call = unbinder_names
                .iter()
                .any(|name| text.starts_with(&format!("{name}.unbind(")));
            if (is_bind_call || is_unbind_call)
                && removed.insert((stmt.span.start, stmt.span.end))
            {
                let span = line_span(source, stmt.span);
                edits.push(TextEdit::delete(span));
                consumed.push(span);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Initialization and listeners

#[allow(clippy::too_many_arguments)]
fn rewrite_anchor(
    source: &str,
    anchor: &Anchor,
    mode: Mode,
    binding_class: &str,
    extraction: &Extraction,
    accessor: &dyn Fn(&str) -> String,
    edits: &mut Vec<TextEdit>,
    consumed: &mut Vec<Span>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let indent = anchor.indent();
    let listeners = listener_block(extraction, mode, accessor, indent);

    match mode {
        Mode::FindViewById => {
            let mut block = String::new();
            for field in &extraction.fields {
                block.push_str(&format!(
                    "\n{indent}{} = findViewById(R.id.{});",
                    field.field_name, field.resource_id
                ));
            }
            block.push_str(&listeners);
            if !block.is_empty() {
                edits.push(TextEdit::insert(anchor.stmt().end, block));
            }
        }
        Mode::ViewBinding => match anchor {
            Anchor::ContentView { stmt, .. } => {
                let replacement = format!(
                    "binding = {binding_class}.inflate(getLayoutInflater());\n\
                     {indent}setContentView(binding.getRoot());{listeners}"
                );
                edits.push(TextEdit::new(*stmt, replacement));
                consumed.push(*stmt);
            }
            Anchor::Inflate {
                stmt,
                inflater,
                container,
                ..
            } => {
                let text = source[stmt.start..stmt.end].trim();
                let init =
                    format!("binding = {binding_class}.inflate({inflater}, {container}, false);");
                if text.starts_with("return") {
                    let replacement =
                        format!("{init}{listeners}\n{indent}return binding.getRoot();");
                    edits.push(TextEdit::new(*stmt, replacement));
                    consumed.push(*stmt);
                } else if let Some(var) = assigned_view_var(text) {
                    let replacement = format!("{init}{listeners}\n{indent}View {var} = binding.getRoot();");
                    edits.push(TextEdit::new(*stmt, replacement));
                    consumed.push(*stmt);
                } else {
                    diagnostics.push(Diagnostic::warning(
                        "inflate-unrewritten",
                        "inflate statement shape not recognized; binding \
                         initialization was inserted before it",
                        Some(*stmt),
                    ));
                    edits.push(TextEdit::insert(
                        stmt.start,
                        format!("{init}{listeners}\n{indent}"),
                    ));
                }
            }
        },
    }
}

fn assigned_view_var(stmt_text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(?:final\s+)?View\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=").expect("static regex")
    });
    re.captures(stmt_text).map(|caps| caps[1].to_string())
}

fn listener_block(
    extraction: &Extraction,
    mode: Mode,
    accessor: &dyn Fn(&str) -> String,
    indent: &str,
) -> String {
    let mut block = String::new();
    for handler in &extraction.handlers {
        for id in &handler.resource_ids {
            let target = match mode {
                Mode::ViewBinding => accessor(id),
                Mode::FindViewById => match extraction.field_for_id(id) {
                    Some(field) => field.field_name.clone(),
                    None => fallback_target(handler.kind, id),
                },
            };
            block.push_str(&format!(
                "\n{indent}{}",
                listener_statement(handler, &target, indent)
            ));
        }
    }
    block
}

// Raw findViewById returns View; listener families living on subclasses
// need a cast.
fn fallback_target(kind: ListenerKind, id: &str) -> String {
    let cast = match kind {
        ListenerKind::CheckedChanged => Some("CompoundButton"),
        ListenerKind::TextChanged => Some("TextView"),
        ListenerKind::EditorAction => Some("TextView"),
        ListenerKind::ItemClick | ListenerKind::ItemSelected => Some("AdapterView<?>"),
        _ => None,
    };
    match cast {
        Some(cast) => format!("(({cast}) findViewById(R.id.{id}))"),
        None => format!("findViewById(R.id.{id})"),
    }
}

// ---------------------------------------------------------------------------
// Reference rewriting and teardown (ViewBinding only)

fn rewrite_field_references(
    class: &ClassShape,
    extraction: &Extraction,
    bound_fields: &[&FieldShape],
    accessor: &dyn Fn(&str) -> String,
    consumed: &[Span],
    edits: &mut Vec<TextEdit>,
) {
    // Later bindings shadow earlier ones for the same field name.
    let mut id_by_field: HashMap<&str, &str> = HashMap::new();
    for binding in &extraction.fields {
        id_by_field.insert(&binding.field_name, &binding.resource_id);
    }
    let deleted_names: HashSet<&str> = bound_fields
        .iter()
        .filter(|f| f.names.len() == 1)
        .map(|f| f.name())
        .collect();

    for ident in &class.ident_refs {
        if !deleted_names.contains(ident.name.as_str()) {
            continue;
        }
        let Some(resource_id) = id_by_field.get(ident.name.as_str()) else {
            continue;
        };
        let target_span = match &ident.context {
            IdentContext::Plain => ident.span,
            IdentContext::ThisMember { access_span } => *access_span,
            _ => continue,
        };
        if consumed.iter().any(|span| overlaps(*span, target_span)) {
            continue;
        }
        edits.push(TextEdit::new(target_span, accessor(resource_id)));
    }
}

fn add_binding_teardown(source: &str, class: &ClassShape, edits: &mut Vec<TextEdit>) {
    for method in &class.methods {
        if method.name == "onDestroy" {
            if let Some(body) = &method.body {
                let close_indent = indent_of(source, method.span.start);
                edits.push(TextEdit::insert(
                    body.span.end - 1,
                    format!("    binding = null;\n{close_indent}"),
                ));
                return;
            }
        }
    }

    edits.push(TextEdit::insert(
        class.body_span.end - 1,
        "\n    @Override\n    protected void onDestroy() {\n        super.onDestroy();\n        binding = null;\n    }\n".to_string(),
    ));
}

// ---------------------------------------------------------------------------
// Span helpers

fn bound_field_shapes<'a>(class: &'a ClassShape, extraction: &Extraction) -> Vec<&'a FieldShape> {
    let bound: HashSet<&str> = extraction
        .fields
        .iter()
        .map(|f| f.field_name.as_str())
        .collect();
    class
        .fields
        .iter()
        .filter(|f| bound.contains(f.name()))
        .collect()
}

fn overlaps(a: Span, b: Span) -> bool {
    a.start < b.end && b.start < a.end
}

/// Leading whitespace of the line containing `offset`.
fn indent_of(source: &str, offset: usize) -> String {
    let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    source[line_start..offset]
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect()
}

/// Expand a span to cover its whole line(s) when only whitespace surrounds
/// it there; the trailing newline is included.
fn line_span(source: &str, span: Span) -> Span {
    let line_start = source[..span.start].rfind('\n').map_or(0, |i| i + 1);
    let start = if source[line_start..span.start].trim().is_empty() {
        line_start
    } else {
        span.start
    };

    let line_end = source[span.end..]
        .find('\n')
        .map_or(source.len(), |i| span.end + i + 1);
    let end = if source[span.end..line_end].trim().is_empty() {
        line_end
    } else {
        span.end
    };

    Span::new(start, end)
}

/// Remove an annotation: its whole line when it stands alone, otherwise
/// just the annotation text plus trailing spaces.
fn annotation_removal_edit(source: &str, span: Span) -> TextEdit {
    let expanded = line_span(source, span);
    let alone_on_line = expanded.start < span.start && expanded.end > span.end;
    if alone_on_line {
        return TextEdit::delete(expanded);
    }

    let mut end = span.end;
    let bytes = source.as_bytes();
    while end < bytes.len() && matches!(bytes[end], b' ' | b'\t') {
        end += 1;
    }
    TextEdit::delete(Span::new(span.start, end))
}
