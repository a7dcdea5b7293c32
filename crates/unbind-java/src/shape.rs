//! Data-only snapshots of the pieces the rewrite engine cares about.
//!
//! Shapes carry names and byte spans instead of borrowing syntax nodes, so
//! the engine can drop the tree and work purely against the source text.

use tree_sitter::Node;
use unbind_core::Span;

use crate::annotation::{collect_annotations, ParsedAnnotation};
use crate::{find_named_child, modifier_node, node_text};

#[derive(Clone, Debug)]
pub struct ClassShape {
    pub name: String,
    /// Whole `class_declaration`.
    pub span: Span,
    /// The class body including both braces.
    pub body_span: Span,
    pub fields: Vec<FieldShape>,
    pub methods: Vec<MethodShape>,
    pub imports: Vec<ImportShape>,
    /// Every identifier occurrence inside the class body, classified.
    pub ident_refs: Vec<IdentRef>,
}

#[derive(Clone, Debug)]
pub struct FieldShape {
    /// Declared variable names; ButterKnife fields declare exactly one, but
    /// Java allows `EditText a, b;`.
    pub names: Vec<String>,
    pub type_name: String,
    /// Whole `field_declaration` including modifiers and annotations.
    pub span: Span,
    pub annotations: Vec<ParsedAnnotation>,
}

impl FieldShape {
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("")
    }
}

#[derive(Clone, Debug)]
pub struct MethodShape {
    pub name: String,
    /// Whole `method_declaration` including modifiers and annotations.
    pub span: Span,
    pub annotations: Vec<ParsedAnnotation>,
    pub params: Vec<ParamShape>,
    pub body: Option<BlockShape>,
}

impl MethodShape {
    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }

    pub fn first_param_type(&self) -> Option<&str> {
        self.params.first().map(|p| p.type_name.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct ParamShape {
    pub type_name: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct BlockShape {
    /// The block including both braces.
    pub span: Span,
    pub statements: Vec<StatementShape>,
}

#[derive(Clone, Copy, Debug)]
pub struct StatementShape {
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ImportShape {
    /// The imported path, e.g. `butterknife.BindView`.
    pub path: String,
    /// Whole `import_declaration` including the trailing semicolon.
    pub span: Span,
}

/// How an identifier occurrence is used, as far as reference rewriting is
/// concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentContext {
    /// Free-standing reference (`usernameInput.getText()`'s receiver, an
    /// argument, an assignment target, ...).
    Plain,
    /// The defining occurrence of a name (field/param/local/method name).
    Declaration,
    /// Member position of a non-`this` access (`other.name`).
    MemberAccess,
    /// Member position of a `this.name` access; `access_span` covers the
    /// whole access so it can be replaced as a unit.
    ThisMember { access_span: Span },
    /// The invoked name of a method call.
    MethodName,
    /// Inside an annotation; annotations are deleted wholesale, so these
    /// must never be rewritten independently.
    Annotation,
}

#[derive(Clone, Debug)]
pub struct IdentRef {
    pub name: String,
    pub span: Span,
    pub context: IdentContext,
}

/// Snapshot the first top-level class of a parsed file.
pub fn primary_class(root: Node<'_>, source: &str) -> Option<ClassShape> {
    let mut imports = Vec::new();
    let mut class_node = None;

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        match child.kind() {
            "import_declaration" => {
                let raw = node_text(source, child);
                let path = raw
                    .trim_start_matches("import")
                    .trim()
                    .trim_end_matches(';')
                    .trim()
                    .to_string();
                imports.push(ImportShape {
                    path,
                    span: span_of(child),
                });
            }
            "class_declaration" if class_node.is_none() => class_node = Some(child),
            _ => {}
        }
    }

    let class_node = class_node?;
    let name_node = class_node
        .child_by_field_name("name")
        .or_else(|| find_named_child(class_node, "identifier"))?;
    let body = class_node
        .child_by_field_name("body")
        .or_else(|| find_named_child(class_node, "class_body"))?;

    let mut fields = Vec::new();
    let mut methods = Vec::new();
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        match member.kind() {
            "field_declaration" => {
                if let Some(field) = field_shape(member, source) {
                    fields.push(field);
                }
            }
            "method_declaration" => {
                if let Some(method) = method_shape(member, source) {
                    methods.push(method);
                }
            }
            _ => {}
        }
    }

    let mut ident_refs = Vec::new();
    collect_ident_refs(body, source, false, &mut ident_refs);

    Some(ClassShape {
        name: node_text(source, name_node).to_string(),
        span: span_of(class_node),
        body_span: span_of(body),
        fields,
        methods,
        imports,
        ident_refs,
    })
}

fn field_shape(node: Node<'_>, source: &str) -> Option<FieldShape> {
    let type_node = node.child_by_field_name("type")?;
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "variable_declarator" {
            if let Some(name) = child.child_by_field_name("name") {
                names.push(node_text(source, name).to_string());
            }
        }
    }
    if names.is_empty() {
        return None;
    }

    let annotations = modifier_node(node)
        .map(|m| collect_annotations(m, source))
        .unwrap_or_default();

    Some(FieldShape {
        names,
        type_name: node_text(source, type_node).to_string(),
        span: span_of(node),
        annotations,
    })
}

fn method_shape(node: Node<'_>, source: &str) -> Option<MethodShape> {
    let name_node = node.child_by_field_name("name")?;

    let mut params = Vec::new();
    if let Some(param_list) = node.child_by_field_name("parameters") {
        let mut cursor = param_list.walk();
        for param in param_list.named_children(&mut cursor) {
            if param.kind() != "formal_parameter" && param.kind() != "spread_parameter" {
                continue;
            }
            let type_name = param
                .child_by_field_name("type")
                .map(|t| node_text(source, t).to_string())
                .unwrap_or_default();
            let name = param
                .child_by_field_name("name")
                .map(|n| node_text(source, n).to_string())
                .unwrap_or_default();
            params.push(ParamShape { type_name, name });
        }
    }

    let body = node.child_by_field_name("body").map(|block| {
        let mut statements = Vec::new();
        let mut cursor = block.walk();
        for stmt in block.named_children(&mut cursor) {
            statements.push(StatementShape {
                span: span_of(stmt),
            });
        }
        BlockShape {
            span: span_of(block),
            statements,
        }
    });

    let annotations = modifier_node(node)
        .map(|m| collect_annotations(m, source))
        .unwrap_or_default();

    Some(MethodShape {
        name: node_text(source, name_node).to_string(),
        span: span_of(node),
        annotations,
        params,
        body,
    })
}

fn collect_ident_refs(node: Node<'_>, source: &str, in_annotation: bool, out: &mut Vec<IdentRef>) {
    let in_annotation = in_annotation || node.kind().ends_with("annotation");

    if node.kind() == "identifier" {
        let context = if in_annotation {
            IdentContext::Annotation
        } else {
            classify_ident(node)
        };
        out.push(IdentRef {
            name: node_text(source, node).to_string(),
            span: span_of(node),
            context,
        });
        return;
    }

    if node.child_count() == 0 {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_ident_refs(child, source, in_annotation, out);
    }
}

fn classify_ident(node: Node<'_>) -> IdentContext {
    let Some(parent) = node.parent() else {
        return IdentContext::Plain;
    };

    let is_field = |field: &str| parent.child_by_field_name(field) == Some(node);

    match parent.kind() {
        "variable_declarator" | "formal_parameter" | "method_declaration"
        | "class_declaration" | "catch_formal_parameter" | "enhanced_for_statement"
            if is_field("name") =>
        {
            IdentContext::Declaration
        }
        "field_access" if is_field("field") => {
            match parent.child_by_field_name("object") {
                Some(object) if object.kind() == "this" => IdentContext::ThisMember {
                    access_span: span_of(parent),
                },
                _ => IdentContext::MemberAccess,
            }
        }
        "method_invocation" if is_field("name") => IdentContext::MethodName,
        _ => IdentContext::Plain,
    }
}

fn span_of(node: Node<'_>) -> Span {
    Span::new(node.start_byte(), node.end_byte())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_java;

    const SRC: &str = r#"
import butterknife.BindView;
import android.widget.EditText;

public class CheckoutActivity extends AppCompatActivity {
    @BindView(R.id.username_input)
    EditText usernameInput;

    void onCheckoutClick() {
        String username = usernameInput.getText().toString();
        this.usernameInput.clearFocus();
    }

    @Override
    protected void onCreate(Bundle savedInstanceState) {
        super.onCreate(savedInstanceState);
        setContentView(R.layout.activity_checkout_new);
        ButterKnife.bind(this);
    }
}
"#;

    #[test]
    fn snapshots_fields_methods_and_imports() {
        let tree = parse_java(SRC).expect("parse");
        let class = primary_class(tree.root_node(), SRC).expect("class");

        assert_eq!(class.name, "CheckoutActivity");
        assert_eq!(class.imports.len(), 2);
        assert_eq!(class.imports[0].path, "butterknife.BindView");

        assert_eq!(class.fields.len(), 1);
        let field = &class.fields[0];
        assert_eq!(field.name(), "usernameInput");
        assert_eq!(field.type_name, "EditText");
        assert_eq!(field.annotations.len(), 1);
        assert_eq!(field.annotations[0].simple_name, "BindView");
        assert_eq!(field.annotations[0].value(), Some("R.id.username_input"));

        let on_create = class
            .methods
            .iter()
            .find(|m| m.name == "onCreate")
            .expect("onCreate");
        assert_eq!(on_create.params.len(), 1);
        let body = on_create.body.as_ref().expect("body");
        assert_eq!(body.statements.len(), 3);
        assert!(SRC[body.statements[1].span.start..body.statements[1].span.end]
            .contains("setContentView"));
    }

    #[test]
    fn classifies_identifier_references() {
        let tree = parse_java(SRC).expect("parse");
        let class = primary_class(tree.root_node(), SRC).expect("class");

        let refs: Vec<_> = class
            .ident_refs
            .iter()
            .filter(|r| r.name == "usernameInput")
            .collect();

        // Declaration, annotation-free plain use, and a this-access.
        assert!(refs.iter().any(|r| r.context == IdentContext::Declaration));
        assert!(refs.iter().any(|r| r.context == IdentContext::Plain));
        assert!(refs
            .iter()
            .any(|r| matches!(r.context, IdentContext::ThisMember { .. })));
    }

    #[test]
    fn annotation_identifiers_are_flagged() {
        let tree = parse_java(SRC).expect("parse");
        let class = primary_class(tree.root_node(), SRC).expect("class");

        let ann_ref = class
            .ident_refs
            .iter()
            .find(|r| r.name == "username_input")
            .expect("annotation arg identifier");
        assert_eq!(ann_ref.context, IdentContext::Annotation);
    }

    #[test]
    fn no_class_yields_none() {
        let tree = parse_java("import a.b.C;").expect("parse");
        assert!(primary_class(tree.root_node(), "import a.b.C;").is_none());
    }
}
