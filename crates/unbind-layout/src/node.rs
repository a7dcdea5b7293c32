//! Owned snapshot of one layout XML tree.
//!
//! `roxmltree` documents borrow their input, so the tree is copied into an
//! owned structure at load time. Each node remembers two byte offsets into
//! the original source: where a new attribute can be inserted (right after
//! the tag name) and where the open tag ends (for comment insertion).

use roxmltree::Document;
use unbind_core::Span;

pub type NodePath = Vec<usize>;

#[derive(Clone, Debug)]
pub struct LayoutNode {
    /// Tag name as written, minus any namespace prefix (dots included, so
    /// fully-qualified widget tags keep their package).
    pub tag_name: String,
    /// Attribute local names and values in document order.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<LayoutNode>,
    pub span: Span,
    /// Byte offset right after the tag name inside the open tag.
    pub(crate) attr_insert_offset: usize,
    /// Byte offset right after the open tag's closing `>`.
    pub(crate) open_tag_end: usize,
}

impl LayoutNode {
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name == local_name)
            .map(|(_, value)| value.as_str())
    }

    /// The node's resource id with any `@+id/` / `@id/` reference prefix
    /// stripped.
    pub fn android_id(&self) -> Option<&str> {
        self.attr("id").map(strip_id_ref)
    }

    pub fn has_id(&self) -> bool {
        self.attr("id").is_some()
    }

    pub fn is_include(&self) -> bool {
        self.tag_name == "include"
    }

    /// For an `<include layout="@layout/x">` tag, the included layout name.
    pub fn include_layout_name(&self) -> Option<&str> {
        if !self.is_include() {
            return None;
        }
        self.attr("layout")
            .map(|value| value.strip_prefix("@layout/").unwrap_or(value))
    }

    /// Last dot-separated segment of the tag name.
    pub fn simple_tag_name(&self) -> &str {
        self.tag_name.rsplit('.').next().unwrap_or(&self.tag_name)
    }

    pub fn get(&self, path: &[usize]) -> Option<&LayoutNode> {
        let mut node = self;
        for &idx in path {
            node = node.children.get(idx)?;
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut LayoutNode> {
        let mut node = self;
        for &idx in path {
            node = node.children.get_mut(idx)?;
        }
        Some(node)
    }

    /// Pre-order visit of this node and its descendants with their paths.
    pub fn visit<F: FnMut(&LayoutNode, &NodePath)>(&self, f: &mut F) {
        let mut path = NodePath::new();
        visit_inner(self, &mut path, f);
    }
}

fn visit_inner<F: FnMut(&LayoutNode, &NodePath)>(
    node: &LayoutNode,
    path: &mut NodePath,
    f: &mut F,
) {
    f(node, path);
    for (idx, child) in node.children.iter().enumerate() {
        path.push(idx);
        visit_inner(child, path, f);
        path.pop();
    }
}

pub fn strip_id_ref(value: &str) -> &str {
    value
        .strip_prefix("@+id/")
        .or_else(|| value.strip_prefix("@id/"))
        .unwrap_or(value)
}

/// Parse layout XML into an owned element tree.
pub fn parse_tree(source: &str) -> Result<LayoutNode, roxmltree::Error> {
    let doc = Document::parse(source)?;
    Ok(convert(doc.root_element(), source))
}

fn convert(node: roxmltree::Node<'_, '_>, source: &str) -> LayoutNode {
    let range = node.range();
    let span = Span::new(range.start, range.end);

    let attrs = node
        .attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect();

    let children = node
        .children()
        .filter(|c| c.is_element())
        .map(|c| convert(c, source))
        .collect();

    LayoutNode {
        tag_name: node.tag_name().name().to_string(),
        attrs,
        children,
        span,
        attr_insert_offset: tag_name_end(source, range.start),
        open_tag_end: open_tag_end(source, range.start),
    }
}

// `start` points at `<`; the tag name runs until whitespace, `/` or `>`.
fn tag_name_end(source: &str, start: usize) -> usize {
    let bytes = source.as_bytes();
    let mut idx = start + 1;
    while idx < bytes.len() && !matches!(bytes[idx], b' ' | b'\t' | b'\r' | b'\n' | b'/' | b'>') {
        idx += 1;
    }
    idx
}

// Offset just past the open tag's `>`, skipping quoted attribute values.
fn open_tag_end(source: &str, start: usize) -> usize {
    let bytes = source.as_bytes();
    let mut idx = start;
    let mut quote: Option<u8> = None;
    while idx < bytes.len() {
        let b = bytes[idx];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return idx + 1,
                _ => {}
            },
        }
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android"
    android:orientation="vertical">

    <EditText
        android:id="@+id/username_input"
        android:layout_width="match_parent" />

    <include layout="@layout/status_bar" />

    <androidx.appcompat.widget.AppCompatButton />
</LinearLayout>
"#;

    #[test]
    fn builds_the_element_tree() {
        let root = parse_tree(XML).expect("parse");
        assert_eq!(root.tag_name, "LinearLayout");
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.children[0].android_id(), Some("username_input"));
        assert!(root.children[1].is_include());
        assert_eq!(root.children[1].include_layout_name(), Some("status_bar"));
        assert_eq!(root.children[2].simple_tag_name(), "AppCompatButton");
        assert!(!root.children[2].has_id());
    }

    #[test]
    fn attr_insert_offset_lands_after_the_tag_name() {
        let root = parse_tree(XML).expect("parse");
        let button = &root.children[2];
        assert_eq!(
            &XML[button.span.start..button.attr_insert_offset],
            "<androidx.appcompat.widget.AppCompatButton"
        );
    }

    #[test]
    fn open_tag_end_skips_quoted_angle_brackets() {
        let xml = "<a label=\"x > y\"><b/></a>";
        let root = parse_tree(xml).expect("parse");
        assert_eq!(&xml[..root.open_tag_end], "<a label=\"x > y\">");
    }

    #[test]
    fn paths_address_nested_nodes() {
        let root = parse_tree(XML).expect("parse");
        let mut include_path = None;
        root.visit(&mut |node, path| {
            if node.is_include() {
                include_path = Some(path.clone());
            }
        });
        let path = include_path.expect("include found");
        assert!(root.get(&path).expect("node").is_include());
    }
}
