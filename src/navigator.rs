use std::collections::BTreeSet;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::keys::ancestor_paths;
use crate::tree::FolderNode;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeRow {
    pub path: String,
    pub name: String,
    pub depth: usize,
    pub has_children: bool,
    pub expanded: bool,
    pub active: bool,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Expansion and highlight state layered over a built tree.
///
/// State is keyed by path string, so it survives a rebuild of the tree even
/// though every node is new.
#[derive(Debug, Default)]
pub struct TreeNavigator {
    tree: FolderNode,
    expanded: BTreeSet<String>,
    active: String,
    failure: Option<String>,
}

impl TreeNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps in a freshly built tree, re-expanding every ancestor of each
    /// path in `expanded` and re-highlighting `active`. Paths the new tree no
    /// longer has are dropped.
    pub fn replace_tree<I>(&mut self, tree: FolderNode, expanded: I, active: &str)
    where
        I: IntoIterator<Item = String>,
    {
        let restored: BTreeSet<String> = expanded
            .into_iter()
            .flat_map(|path| ancestor_paths(&path))
            .filter(|path| tree.find(path).is_some())
            .collect();

        self.active = if !active.is_empty() && tree.find(active).is_some() {
            active.to_string()
        } else {
            String::new()
        };
        self.expanded = restored;
        self.tree = tree;
        self.failure = None;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.tree = FolderNode::default();
        self.failure = Some(message.into());
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn tree(&self) -> &FolderNode {
        &self.tree
    }

    pub fn active_path(&self) -> &str {
        &self.active
    }

    pub fn expanded_paths(&self) -> Vec<String> {
        self.expanded.iter().cloned().collect()
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.contains(path)
    }

    /// Folder click: highlight it and flip its expansion if it has children.
    /// Returns the path the content pane should load.
    pub fn activate(&mut self, path: &str) -> String {
        self.active = path.to_string();
        if self.tree.find(path).is_some_and(FolderNode::has_children) {
            self.toggle(path);
        }
        self.active.clone()
    }

    pub fn toggle(&mut self, path: &str) -> bool {
        if self.expanded.remove(path) {
            false
        } else {
            self.expanded.insert(path.to_string());
            true
        }
    }

    pub fn expand_to(&mut self, path: &str) {
        self.expanded.extend(ancestor_paths(path));
    }

    /// Visible rows in render order; children of collapsed folders are hidden.
    pub fn rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        self.push_rows(&self.tree, "", 0, &mut rows);
        rows
    }

    fn push_rows(&self, node: &FolderNode, base: &str, depth: usize, rows: &mut Vec<TreeRow>) {
        for (name, child) in node.sorted_children() {
            let path = format!("{base}{name}/");
            let expanded = child.has_children() && self.expanded.contains(&path);
            rows.push(TreeRow {
                path: path.clone(),
                name: name.to_string(),
                depth,
                has_children: child.has_children(),
                expanded,
                active: path == self.active,
                last_modified: child.last_modified,
            });
            if expanded {
                self.push_rows(child, &path, depth + 1, rows);
            }
        }
    }

    pub fn render(&self) -> String {
        if let Some(failure) = &self.failure {
            return format!("(folder tree unavailable: {failure})\n");
        }
        let rows = self.rows();
        if rows.is_empty() {
            return "(no folders)\n".to_string();
        }
        let mut out = String::new();
        for row in rows {
            let toggle = match (row.has_children, row.expanded) {
                (false, _) => ' ',
                (true, false) => '+',
                (true, true) => '-',
            };
            let marker = if row.active { '*' } else { ' ' };
            let _ = writeln!(
                out,
                "{marker}{indent}{toggle} {name}",
                indent = "  ".repeat(row.depth),
                name = row.name
            );
        }
        out
    }
}
