//! Layout XML discovery, validation and repair.
//!
//! XML is parsed read-only; every repair is expressed as a text edit
//! against the original file contents and committed atomically per file.
//! Repair is additive-only: existing ids are never renamed, removed or
//! overwritten.

mod node;
mod session;

pub use node::{parse_tree, strip_id_ref, LayoutNode, NodePath};
pub use session::{
    BindingRequirement, IdOrigin, LayoutFile, LayoutSession, RepairReport, MARKER_COMMENT_PREFIX,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },
    #[error(transparent)]
    Edit(#[from] unbind_core::EditError),
}

/// Map of layout name (file stem) to file path, built by walking a project
/// root. Rebuilt per invocation; never cached across batches.
#[derive(Debug, Default)]
pub struct LayoutIndex {
    layouts: BTreeMap<String, PathBuf>,
}

impl LayoutIndex {
    pub fn scan(root: &Path) -> Self {
        let mut layouts = BTreeMap::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("xml")
            {
                continue;
            }
            if !is_layout_candidate(path) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match layouts.entry(stem.to_string()) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(path.to_path_buf());
                }
                std::collections::btree_map::Entry::Occupied(existing) => {
                    debug!(
                        layout = stem,
                        kept = %existing.get().display(),
                        ignored = %path.display(),
                        "duplicate layout stem; keeping first"
                    );
                }
            }
        }

        debug!(count = layouts.len(), root = %root.display(), "layout index built");
        Self { layouts }
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.layouts.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    pub fn stems(&self) -> impl Iterator<Item = &str> {
        self.layouts.keys().map(String::as_str)
    }

    /// Loose lookup used as a last resort when no layout name could be
    /// derived from the code: exact stem, else the first stem containing
    /// the needle, else the first stem the needle contains.
    pub fn best_match(&self, needle: &str) -> Option<&str> {
        if needle.is_empty() {
            return None;
        }
        if self.layouts.contains_key(needle) {
            return self.layouts.get_key_value(needle).map(|(k, _)| k.as_str());
        }
        self.stems()
            .find(|stem| stem.contains(needle))
            .or_else(|| self.stems().find(|stem| !stem.is_empty() && needle.contains(stem)))
    }
}

// A file under `res/layout*` is always a candidate; elsewhere the root tag
// has to look like an Android container.
fn is_layout_candidate(path: &Path) -> bool {
    let parent_is_layout_dir = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("layout"));
    if parent_is_layout_dir {
        return true;
    }

    let Ok(source) = std::fs::read_to_string(path) else {
        return false;
    };
    sniff_root_tag(&source).is_some_and(is_layout_root_tag)
}

/// First element tag name in an XML document, skipping the declaration and
/// comments.
pub fn sniff_root_tag(source: &str) -> Option<&str> {
    let mut rest = source;
    loop {
        let open = rest.find('<')?;
        let after = &rest[open + 1..];
        if let Some(stripped) = after.strip_prefix("!--") {
            let close = stripped.find("-->")?;
            rest = &stripped[close + 3..];
        } else if after.starts_with('?') || after.starts_with('!') {
            let close = after.find('>')?;
            rest = &after[close + 1..];
        } else {
            let end = after
                .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
                .unwrap_or(after.len());
            let tag = &after[..end];
            return (!tag.is_empty()).then_some(tag);
        }
    }
}

fn is_layout_root_tag(tag: &str) -> bool {
    let simple = tag.rsplit('.').next().unwrap_or(tag);
    simple.ends_with("Layout")
        || simple.ends_with("ScrollView")
        || simple == "merge"
        || simple == "RadioGroup"
        || simple == "CardView"
}
