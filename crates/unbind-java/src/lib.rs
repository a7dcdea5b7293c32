//! Structural view of one Java source file, built on `tree-sitter-java`.
//!
//! The rewrite engine never mutates a syntax tree; it reads shapes from
//! here (classes, fields, methods, annotations, statements, identifier
//! references) and expresses its changes as text edits over the original
//! source snapshot.

mod annotation;
mod shape;

pub use annotation::{collect_annotations, parse_annotation_text, ParsedAnnotation};
pub use shape::{
    primary_class, BlockShape, ClassShape, FieldShape, IdentContext, IdentRef, ImportShape,
    MethodShape, ParamShape, StatementShape,
};

use std::cell::RefCell;

use tree_sitter::{Node, Parser, Tree};

thread_local! {
    static JAVA_PARSER: RefCell<Result<Parser, String>> = RefCell::new({
        let mut parser = Parser::new();
        match parser.set_language(tree_sitter_java::language()) {
            Ok(()) => Ok(parser),
            Err(_) => Err("tree-sitter-java language load failed".to_string()),
        }
    });
}

/// Parse Java source text with `tree-sitter-java`.
pub fn parse_java(source: &str) -> Result<Tree, String> {
    JAVA_PARSER.with(|parser_cell| {
        let mut parser = parser_cell
            .try_borrow_mut()
            .map_err(|_| "tree-sitter parser is already in use".to_string())?;
        let parser = match parser.as_mut() {
            Ok(parser) => parser,
            Err(err) => return Err(err.clone()),
        };

        parser
            .parse(source, None)
            .ok_or_else(|| "tree-sitter failed to produce a syntax tree".to_string())
    })
}

/// Visit a node and all its descendants in pre-order.
pub fn visit_nodes<'a, F: FnMut(Node<'a>)>(node: Node<'a>, f: &mut F) {
    f(node);
    if node.child_count() == 0 {
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit_nodes(child, f);
    }
}

/// Find the first named child with the given kind.
pub fn find_named_child<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    let result = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == kind);
    result
}

/// Best-effort helper to fetch a node's `modifiers` field, falling back to a
/// named child.
pub fn modifier_node(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("modifiers")
        .or_else(|| find_named_child(node, "modifiers"))
}

/// Return the byte slice for `node` within `source`.
pub fn node_text<'a>(source: &'a str, node: Node<'_>) -> &'a str {
    &source[node.byte_range()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_java_sources() {
        let tree1 = parse_java("class A {}").expect("parse src1");
        let tree2 = parse_java("class A {} class B {}").expect("parse src2");

        assert!(!tree1.root_node().has_error());
        assert!(!tree2.root_node().has_error());
        assert_ne!(
            tree1.root_node().named_child_count(),
            tree2.root_node().named_child_count()
        );
    }

    #[test]
    fn find_named_child_outlives_its_cursor() {
        let tree = parse_java("class A { int x; }").expect("parse");
        let class = find_named_child(tree.root_node(), "class_declaration").expect("class node");
        let body = find_named_child(class, "class_body").expect("class body");

        assert_eq!(body.kind(), "class_body");
        assert!(find_named_child(class, "interface_body").is_none());
    }

    #[test]
    fn parse_java_is_safe_across_threads() {
        let t1 = std::thread::spawn(|| parse_java("class A {}").expect("parse").root_node().has_error());
        let t2 = std::thread::spawn(|| parse_java("class B {}").expect("parse").root_node().has_error());
        assert!(!t1.join().expect("thread 1 join"));
        assert!(!t2.join().expect("thread 2 join"));
    }

    #[test]
    fn parse_java_does_not_carry_error_state_between_parses() {
        let bad = parse_java("class A {").expect("parse bad source");
        assert!(bad.root_node().has_error());

        let good = parse_java("class B {}").expect("parse good source");
        assert!(!good.root_node().has_error());
    }
}
