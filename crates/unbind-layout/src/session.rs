//! Lazy, mutable view over the layout files touched by one rewrite.
//!
//! Files load on first use and accumulate pending attribute insertions;
//! nothing touches disk until [`LayoutSession::commit_all`], which applies
//! each file's edit set as a whole and swaps the file in atomically.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use unbind_core::{apply_text_edits, Diagnostic, EditError, TextEdit};
use unbind_names::{element_role, root_id_for_layout, simple_type_name};

use crate::node::{parse_tree, LayoutNode, NodePath};
use crate::{LayoutError, LayoutIndex};

/// Marker inserted when a missing id has no view to land on.
pub const MARKER_COMMENT_PREFIX: &str = "<!-- TODO: Add android:id=";

/// One resource id a rewritten class expects the layout to provide.
#[derive(Clone, Debug)]
pub struct BindingRequirement {
    pub resource_id: String,
    pub type_name: String,
    pub field_name: String,
}

/// Where a resource id lives relative to the layout under repair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdOrigin {
    /// Layout file the id was found (or placed) in.
    pub layout: String,
    /// Set when the id was reached through an identified `<include>` tag;
    /// holds that include's own resource id.
    pub include_id: Option<String>,
}

impl IdOrigin {
    fn direct(layout: &str) -> Self {
        Self {
            layout: layout.to_string(),
            include_id: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RepairReport {
    /// Resolution per requested resource id.
    pub resolutions: HashMap<String, IdOrigin>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A loaded layout file plus its pending, not-yet-committed insertions.
pub struct LayoutFile {
    pub name: String,
    pub path: PathBuf,
    pub source: String,
    pub root: LayoutNode,
    /// Insertion offset -> text. One entry per offset keeps multiple
    /// attribute insertions on the same tag from colliding.
    pending: BTreeMap<usize, String>,
}

impl LayoutFile {
    fn load(name: &str, path: &Path) -> Option<Self> {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                warn!(layout = name, path = %path.display(), %err, "layout unreadable");
                return None;
            }
        };
        let root = match parse_tree(&source) {
            Ok(root) => root,
            Err(err) => {
                warn!(layout = name, path = %path.display(), %err, "layout XML malformed");
                return None;
            }
        };
        Some(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            source,
            root,
            pending: BTreeMap::new(),
        })
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// The file contents with all pending insertions applied.
    pub fn preview(&self) -> Result<String, EditError> {
        let edits: Vec<TextEdit> = self
            .pending
            .iter()
            .map(|(&offset, text)| TextEdit::insert(offset, text.clone()))
            .collect();
        apply_text_edits(&self.source, &edits)
    }

    /// Queue an attribute insertion on the node at `path`. Existing
    /// attributes are never overwritten.
    fn queue_attr(&mut self, path: &NodePath, local_name: &str, attr_text: &str) {
        let Some(node) = self.root.get_mut(path) else {
            return;
        };
        if node.attr(local_name).is_some() {
            return;
        }
        let offset = node.attr_insert_offset;
        let value = attr_value(attr_text);
        node.attrs.push((local_name.to_string(), value.to_string()));
        debug!(layout = %self.name, tag = %node.tag_name, attr = attr_text, "queueing attribute");
        self.pending
            .entry(offset)
            .or_default()
            .push_str(&format!("\n        {attr_text}"));
    }

    fn queue_comment_after_root_open_tag(&mut self, comment: &str) {
        self.pending
            .entry(self.root.open_tag_end)
            .or_default()
            .push_str(&format!("\n    {comment}"));
    }
}

// `android:id="@+id/x"` -> `@+id/x`; used to mirror the insertion into
// the in-memory attribute list.
fn attr_value(attr_text: &str) -> &str {
    match attr_text.split_once('=') {
        Some((_, value)) => value.trim_matches('"'),
        None => "",
    }
}

/// Load-on-demand collection of [`LayoutFile`]s for one rewrite batch.
pub struct LayoutSession {
    index: LayoutIndex,
    files: HashMap<String, Option<LayoutFile>>,
}

impl LayoutSession {
    pub fn new(index: LayoutIndex) -> Self {
        Self {
            index,
            files: HashMap::new(),
        }
    }

    pub fn index(&self) -> &LayoutIndex {
        &self.index
    }

    /// Load (or fetch the cached) layout by name. Missing, unreadable and
    /// malformed layouts all come back as `None`.
    pub fn load(&mut self, name: &str) -> Option<&LayoutFile> {
        self.ensure_loaded(name);
        self.files.get(name).and_then(Option::as_ref)
    }

    fn ensure_loaded(&mut self, name: &str) {
        if self.files.contains_key(name) {
            return;
        }
        let loaded = self
            .index
            .get(name)
            .and_then(|path| LayoutFile::load(name, path));
        if loaded.is_none() {
            debug!(layout = name, "layout unresolvable");
        }
        self.files.insert(name.to_string(), loaded);
    }

    fn file_mut(&mut self, name: &str) -> Option<&mut LayoutFile> {
        self.ensure_loaded(name);
        self.files.get_mut(name).and_then(Option::as_mut)
    }

    // Cloned so traversal does not hold a borrow on `self.files`.
    fn cloned_root(&mut self, name: &str) -> Option<LayoutNode> {
        self.load(name).map(|file| file.root.clone())
    }

    /// Collect every id reachable from `name`, descending through includes
    /// with a cycle guard. Each id remembers whether it was reached through
    /// an identified include (needed for two-level binding accessors).
    pub fn collect_existing_ids(
        &mut self,
        name: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> HashMap<String, IdOrigin> {
        let mut ids = HashMap::new();
        let mut visited = HashSet::new();
        let mut worklist: Vec<(String, Option<String>)> = vec![(name.to_string(), None)];

        while let Some((layout, include_id)) = worklist.pop() {
            if !visited.insert(layout.clone()) {
                continue;
            }
            let Some(root) = self.cloned_root(&layout) else {
                if layout != name {
                    diagnostics.push(Diagnostic::warning(
                        "include-unresolved",
                        format!("included layout '{layout}' could not be resolved"),
                        None,
                    ));
                }
                continue;
            };

            root.visit(&mut |node, _| {
                if let Some(id) = node.android_id() {
                    ids.entry(id.to_string()).or_insert_with(|| IdOrigin {
                        layout: layout.clone(),
                        include_id: include_id.clone(),
                    });
                }
                if let Some(included) = node.include_layout_name() {
                    // Includes nested below the first level keep the outer
                    // include id; generated accessors only go two deep.
                    let next_include_id = if layout == name {
                        node.android_id().map(str::to_string)
                    } else {
                        include_id.clone()
                    };
                    worklist.push((included.to_string(), next_include_id));
                }
            });
        }

        ids
    }

    /// First view matching `java_type` (simple name, case-insensitive) that
    /// has no id yet: main tree first, then each directly-included layout.
    pub fn find_first_untagged_of_type(
        &mut self,
        layout: &str,
        java_type: &str,
    ) -> Option<(String, NodePath)> {
        let want = simple_type_name(java_type).to_lowercase();

        if let Some(path) = self.find_untagged_local(layout, &want) {
            return Some((layout.to_string(), path));
        }
        for included in self.included_layouts(layout) {
            if included == layout {
                continue;
            }
            if let Some(path) = self.find_untagged_local(&included, &want) {
                return Some((included, path));
            }
        }
        None
    }

    fn find_untagged_local(&mut self, layout: &str, want_lower: &str) -> Option<NodePath> {
        let root = self.cloned_root(layout)?;
        let mut found = None;
        root.visit(&mut |node, path| {
            if found.is_none()
                && !node.is_include()
                && !node.has_id()
                && node.simple_tag_name().eq_ignore_ascii_case(want_lower)
            {
                found = Some(path.clone());
            }
        });
        found
    }

    fn included_layouts(&mut self, layout: &str) -> Vec<String> {
        let Some(root) = self.cloned_root(layout) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        root.visit(&mut |node, _| {
            if let Some(name) = node.include_layout_name() {
                out.push(name.to_string());
            }
        });
        out
    }

    /// Path of the include tag referencing `included` within `layout`.
    pub fn find_include_by_layout(&mut self, layout: &str, included: &str) -> Option<NodePath> {
        let root = self.cloned_root(layout)?;
        let mut found = None;
        root.visit(&mut |node, path| {
            if found.is_none() && node.include_layout_name() == Some(included) {
                found = Some(path.clone());
            }
        });
        found
    }

    /// Path of the include tag carrying the given id within `layout`.
    pub fn find_include_by_id(&mut self, layout: &str, id: &str) -> Option<NodePath> {
        let root = self.cloned_root(layout)?;
        let mut found = None;
        root.visit(&mut |node, path| {
            if found.is_none() && node.is_include() && node.android_id() == Some(id) {
                found = Some(path.clone());
            }
        });
        found
    }

    /// Queue an `android:id="@+id/{id}"` insertion on the node at `path`.
    pub fn assign_id(&mut self, layout: &str, path: &NodePath, id: &str) {
        if let Some(file) = self.file_mut(layout) {
            file.queue_attr(path, "id", &format!("android:id=\"@+id/{id}\""));
        }
    }

    /// The root element's id, synthesizing one when absent. A synthesized
    /// root also becomes clickable and focusable so it can host listeners.
    pub fn find_or_assign_root_id(&mut self, layout: &str) -> Option<String> {
        let root = self.cloned_root(layout)?;
        if let Some(existing) = root.android_id() {
            return Some(existing.to_string());
        }

        let id = root_id_for_layout(layout);
        let root_path = NodePath::new();
        self.assign_id(layout, &root_path, &id);
        if let Some(file) = self.file_mut(layout) {
            file.queue_attr(&root_path, "clickable", "android:clickable=\"true\"");
            file.queue_attr(&root_path, "focusable", "android:focusable=\"true\"");
        }
        Some(id)
    }

    /// Give every non-include descendant an id, synthesized from the layout
    /// name and the element's role, with numeric de-dup suffixes.
    pub fn ensure_children_have_ids(
        &mut self,
        layout: &str,
        used: &mut HashSet<String>,
    ) -> Vec<String> {
        let Some(root) = self.cloned_root(layout) else {
            return Vec::new();
        };

        let base_prefix = layout.replace('_', "");
        let mut targets = Vec::new();
        root.visit(&mut |node, path| {
            if !path.is_empty() && !node.is_include() && !node.has_id() {
                targets.push((path.clone(), element_role(node.simple_tag_name())));
            }
        });

        let mut assigned = Vec::new();
        for (path, role) in targets {
            let base = format!("{base_prefix}{role}");
            let mut candidate = base.clone();
            let mut counter = 2;
            while used.contains(&candidate) {
                candidate = format!("{base}{counter}");
                counter += 1;
            }
            used.insert(candidate.clone());
            self.assign_id(layout, &path, &candidate);
            assigned.push(candidate);
        }
        assigned
    }

    /// Check the requirements against the ids reachable from `layout` and
    /// repair additively: place missing ids on matching untagged views
    /// (main tree first, then includes), or fall back to a marker comment.
    pub fn validate_and_repair(
        &mut self,
        layout: &str,
        requirements: &[BindingRequirement],
    ) -> RepairReport {
        let mut report = RepairReport::default();

        if self.load(layout).is_none() {
            report.diagnostics.push(Diagnostic::warning(
                "layout-unresolved",
                format!("layout '{layout}' not found; ids presumed valid"),
                None,
            ));
            for req in requirements {
                report
                    .resolutions
                    .insert(req.resource_id.clone(), IdOrigin::direct(layout));
            }
            return report;
        }

        let mut ids = self.collect_existing_ids(layout, &mut report.diagnostics);
        let mut used: HashSet<String> = ids.keys().cloned().collect();

        for req in requirements {
            if let Some(origin) = ids.get(&req.resource_id) {
                report
                    .resolutions
                    .insert(req.resource_id.clone(), origin.clone());
                continue;
            }

            match self.find_first_untagged_of_type(layout, &req.type_name) {
                Some((target_layout, path)) if target_layout == layout => {
                    self.assign_id(layout, &path, &req.resource_id);
                    report.diagnostics.push(Diagnostic::info(
                        "id-inserted",
                        format!(
                            "inserted android:id=\"@+id/{}\" into {layout}.xml",
                            req.resource_id
                        ),
                        None,
                    ));
                    let origin = IdOrigin::direct(layout);
                    ids.insert(req.resource_id.clone(), origin.clone());
                    used.insert(req.resource_id.clone());
                    report.resolutions.insert(req.resource_id.clone(), origin);
                }
                Some((included, path)) => {
                    self.assign_id(&included, &path, &req.resource_id);
                    let include_id = self.identify_include(layout, &included);
                    report.diagnostics.push(Diagnostic::info(
                        "id-inserted",
                        format!(
                            "inserted android:id=\"@+id/{}\" into included {included}.xml",
                            req.resource_id
                        ),
                        None,
                    ));
                    let origin = IdOrigin {
                        layout: included,
                        include_id,
                    };
                    ids.insert(req.resource_id.clone(), origin.clone());
                    used.insert(req.resource_id.clone());
                    report.resolutions.insert(req.resource_id.clone(), origin);
                }
                None => {
                    self.insert_marker(layout, req);
                    report.diagnostics.push(Diagnostic::warning(
                        "id-unplaced",
                        format!(
                            "no {} view without an id in {layout}.xml for field '{}'; \
                             left a marker comment",
                            simple_type_name(&req.type_name),
                            req.field_name
                        ),
                        None,
                    ));
                    report
                        .resolutions
                        .insert(req.resource_id.clone(), IdOrigin::direct(layout));
                }
            }
        }

        report
    }

    // An id placed inside an included layout is only reachable through the
    // include tag, which therefore needs an id of its own.
    fn identify_include(&mut self, layout: &str, included: &str) -> Option<String> {
        let include_path = self.find_include_by_layout(layout, included)?;
        let existing = self
            .load(layout)
            .and_then(|file| file.root.get(&include_path))
            .and_then(|node| node.android_id().map(str::to_string));
        if let Some(id) = existing {
            return Some(id);
        }

        let id = root_id_for_layout(included);
        self.assign_id(layout, &include_path, &id);
        self.find_or_assign_root_id(included);
        Some(id)
    }

    fn insert_marker(&mut self, layout: &str, req: &BindingRequirement) {
        let comment = format!(
            "{MARKER_COMMENT_PREFIX}\"@+id/{}\" to a {} view for field '{}' -->",
            req.resource_id,
            simple_type_name(&req.type_name),
            req.field_name
        );
        if let Some(file) = self.file_mut(layout) {
            file.queue_comment_after_root_open_tag(&comment);
        }
    }

    pub fn dirty_paths(&self) -> Vec<&Path> {
        self.files
            .values()
            .filter_map(Option::as_ref)
            .filter(|f| f.is_dirty())
            .map(|f| f.path.as_path())
            .collect()
    }

    /// Write every dirty file back to disk. Each file's edit set applies as
    /// a whole or not at all, and the write goes through a temp file in the
    /// same directory followed by a rename.
    pub fn commit_all(&mut self) -> Result<Vec<PathBuf>, LayoutError> {
        let mut written = Vec::new();
        for file in self.files.values_mut().filter_map(Option::as_mut) {
            if !file.is_dirty() {
                continue;
            }
            let new_source = file.preview()?;
            write_atomic(&file.path, &new_source).map_err(|source| LayoutError::Io {
                path: file.path.clone(),
                source,
            })?;
            file.source = new_source;
            file.pending.clear();
            written.push(file.path.clone());
        }
        Ok(written)
    }
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MAIN: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android"
    android:orientation="vertical">

    <EditText
        android:id="@+id/username_input"
        android:layout_width="match_parent" />

    <EditText
        android:layout_width="match_parent" />

    <include layout="@layout/status_bar" />
</LinearLayout>
"#;

    const STATUS_BAR: &str = r#"<FrameLayout xmlns:android="http://schemas.android.com/apk/res/android">
    <TextView android:id="@+id/status_text" />
</FrameLayout>
"#;

    fn session_with(layouts: &[(&str, &str)]) -> (tempfile::TempDir, LayoutSession) {
        let dir = tempfile::tempdir().unwrap();
        let layout_dir = dir.path().join("res/layout");
        fs::create_dir_all(&layout_dir).unwrap();
        for (name, contents) in layouts {
            fs::write(layout_dir.join(format!("{name}.xml")), contents).unwrap();
        }
        let index = LayoutIndex::scan(dir.path());
        (dir, LayoutSession::new(index))
    }

    fn req(id: &str, ty: &str, field: &str) -> BindingRequirement {
        BindingRequirement {
            resource_id: id.to_string(),
            type_name: ty.to_string(),
            field_name: field.to_string(),
        }
    }

    #[test]
    fn collects_ids_through_includes() {
        let (_dir, mut session) =
            session_with(&[("activity_main", MAIN), ("status_bar", STATUS_BAR)]);
        let mut diags = Vec::new();
        let ids = session.collect_existing_ids("activity_main", &mut diags);

        assert!(ids.contains_key("username_input"));
        assert!(ids.contains_key("status_text"));
        assert_eq!(ids["status_text"].layout, "status_bar");
        assert!(diags.is_empty());
    }

    #[test]
    fn unresolvable_include_is_reported() {
        let (_dir, mut session) = session_with(&[("activity_main", MAIN)]);
        let mut diags = Vec::new();
        let ids = session.collect_existing_ids("activity_main", &mut diags);

        assert!(ids.contains_key("username_input"));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "include-unresolved");
    }

    #[test]
    fn existing_id_is_a_plain_resolution() {
        let (_dir, mut session) =
            session_with(&[("activity_main", MAIN), ("status_bar", STATUS_BAR)]);
        let report = session.validate_and_repair(
            "activity_main",
            &[req("username_input", "EditText", "usernameInput")],
        );

        assert_eq!(
            report.resolutions["username_input"],
            IdOrigin::direct("activity_main")
        );
        assert!(session.dirty_paths().is_empty());
    }

    #[test]
    fn missing_id_lands_on_the_first_untagged_matching_view() {
        let (_dir, mut session) =
            session_with(&[("activity_main", MAIN), ("status_bar", STATUS_BAR)]);
        let report = session.validate_and_repair(
            "activity_main",
            &[req("password_input", "android.widget.EditText", "passwordInput")],
        );

        assert_eq!(
            report.resolutions["password_input"],
            IdOrigin::direct("activity_main")
        );
        let file = session.load("activity_main").unwrap();
        let preview = file.preview().unwrap();
        assert!(preview.contains("android:id=\"@+id/password_input\""));
        // The already-identified EditText keeps its id.
        assert_eq!(preview.matches("@+id/username_input").count(), 1);
    }

    #[test]
    fn repair_never_touches_existing_ids() {
        let (_dir, mut session) =
            session_with(&[("activity_main", MAIN), ("status_bar", STATUS_BAR)]);
        session.validate_and_repair(
            "activity_main",
            &[
                req("username_input", "EditText", "usernameInput"),
                req("password_input", "EditText", "passwordInput"),
            ],
        );
        let preview = session.load("activity_main").unwrap().preview().unwrap();

        assert!(preview.contains("@+id/username_input"));
        assert!(preview.contains("@+id/password_input"));
        // All pre-existing text is still present (insert-only repair).
        assert!(preview.len() > MAIN.len());
    }

    #[test]
    fn unplaceable_id_leaves_a_marker_comment() {
        let (_dir, mut session) =
            session_with(&[("activity_main", MAIN), ("status_bar", STATUS_BAR)]);
        let report = session.validate_and_repair(
            "activity_main",
            &[req("checkout_button", "Button", "checkoutButton")],
        );

        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.code == "id-unplaced"));
        let preview = session.load("activity_main").unwrap().preview().unwrap();
        assert!(preview.contains(MARKER_COMMENT_PREFIX));
        assert!(preview.contains("@+id/checkout_button"));
        assert!(preview.contains("field 'checkoutButton'"));
    }

    #[test]
    fn placement_falls_through_to_included_layouts() {
        let included = r#"<FrameLayout xmlns:android="http://schemas.android.com/apk/res/android">
    <Button android:layout_width="wrap_content" />
</FrameLayout>
"#;
        let (_dir, mut session) =
            session_with(&[("activity_main", MAIN), ("status_bar", included)]);
        let report = session.validate_and_repair(
            "activity_main",
            &[req("retry_button", "Button", "retryButton")],
        );

        let origin = &report.resolutions["retry_button"];
        assert_eq!(origin.layout, "status_bar");
        assert_eq!(origin.include_id.as_deref(), Some("statusBarRoot"));

        // The include tag was identified and the included root hardened.
        let main = session.load("activity_main").unwrap().preview().unwrap();
        assert!(main.contains("android:id=\"@+id/statusBarRoot\""));
        let inc = session.load("status_bar").unwrap().preview().unwrap();
        assert!(inc.contains("android:id=\"@+id/retry_button\""));
        assert!(inc.contains("android:clickable=\"true\""));
        assert!(inc.contains("android:focusable=\"true\""));
    }

    #[test]
    fn unresolvable_layout_presumes_ids_valid() {
        let (_dir, mut session) = session_with(&[]);
        let report = session.validate_and_repair(
            "activity_gone",
            &[req("some_id", "Button", "someButton")],
        );

        assert!(report.resolutions.contains_key("some_id"));
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.code == "layout-unresolved"));
    }

    #[test]
    fn commit_writes_atomically_and_clears_pending() {
        let (dir, mut session) =
            session_with(&[("activity_main", MAIN), ("status_bar", STATUS_BAR)]);
        session.validate_and_repair(
            "activity_main",
            &[req("password_input", "EditText", "passwordInput")],
        );

        let written = session.commit_all().unwrap();
        assert_eq!(written.len(), 1);
        let on_disk =
            fs::read_to_string(dir.path().join("res/layout/activity_main.xml")).unwrap();
        assert!(on_disk.contains("android:id=\"@+id/password_input\""));
        assert!(session.dirty_paths().is_empty());
        // Second commit is a no-op.
        assert!(session.commit_all().unwrap().is_empty());
    }

    #[test]
    fn ensure_children_have_ids_synthesizes_unique_names() {
        let xml = r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android">
    <Button />
    <Button />
    <TextView />
</LinearLayout>
"#;
        let (_dir, mut session) = session_with(&[("item_row", xml)]);
        let mut used = HashSet::new();
        let assigned = session.ensure_children_have_ids("item_row", &mut used);

        assert_eq!(
            assigned,
            vec!["itemrowButton", "itemrowButton2", "itemrowText"]
        );
        let preview = session.load("item_row").unwrap().preview().unwrap();
        assert!(preview.contains("@+id/itemrowButton\""));
        assert!(preview.contains("@+id/itemrowButton2\""));
        assert!(preview.contains("@+id/itemrowText\""));
    }
}
