//! Folder tree synthesis from a flat key listing.
//!
//! The backend has no directories. A folder exists when some key has it as a
//! proper prefix; a `.keep` marker inside it is the only source of a folder
//! timestamp. Paths that pass through a `thumb` or `original` segment belong
//! to the content pane and never become navigable nodes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::keys::{has_reserved_segment, is_marker_key, MARKER_NAME};
use crate::store::ObjectEntry;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderNode {
    pub children: BTreeMap<String, FolderNode>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Only discovered in the reconciliation pass (no retained key walked
    /// through it). Diagnostic only.
    pub synthetic_only: bool,
    discovered: usize,
}

impl FolderNode {
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Children in render order: newest marker first, unmarked folders last,
    /// ties in discovery order.
    pub fn sorted_children(&self) -> Vec<(&str, &FolderNode)> {
        let mut children: Vec<(&str, &FolderNode)> = self
            .children
            .iter()
            .map(|(name, node)| (name.as_str(), node))
            .collect();
        children.sort_by(|(_, a), (_, b)| {
            sort_time(b)
                .cmp(&sort_time(a))
                .then(a.discovered.cmp(&b.discovered))
        });
        children
    }

    pub fn first_child_path(&self) -> Option<String> {
        self.sorted_children()
            .first()
            .map(|(name, _)| format!("{name}/"))
    }

    /// Looks up a node by its `/`-terminated path; `""` is the node itself.
    pub fn find(&self, path: &str) -> Option<&FolderNode> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    pub fn folder_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_paths(self, "", &mut out);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

fn sort_time(node: &FolderNode) -> i64 {
    node.last_modified
        .map(|time| time.timestamp_millis())
        .unwrap_or(0)
}

fn collect_paths(node: &FolderNode, base: &str, out: &mut Vec<String>) {
    for (name, child) in node.sorted_children() {
        let path = format!("{base}{name}/");
        out.push(path.clone());
        collect_paths(child, &path, out);
    }
}

struct TreeBuilder {
    root: FolderNode,
    dir_times: HashMap<String, DateTime<Utc>>,
    next_order: usize,
}

impl TreeBuilder {
    fn insert(&mut self, segments: &[&str], synthetic: bool) {
        let mut node = &mut self.root;
        let mut path = String::new();
        for segment in segments {
            path.push_str(segment);
            path.push('/');
            let order = self.next_order;
            let time = self.dir_times.get(&path).copied();
            let child = node
                .children
                .entry((*segment).to_string())
                .or_insert_with(|| FolderNode {
                    children: BTreeMap::new(),
                    last_modified: time,
                    synthetic_only: synthetic,
                    discovered: order,
                });
            if child.discovered == order {
                self.next_order += 1;
            }
            node = child;
        }
    }
}

/// Directory segments of a key: everything but the final segment, cut short
/// at the first empty one (`a//b` yields `a`, `/a` yields nothing). The flag
/// is false when the key was cut.
fn directory_segments(key: &str) -> (Vec<&str>, bool) {
    let mut segments: Vec<&str> = key.split('/').collect();
    segments.pop();
    match segments.iter().position(|segment| segment.is_empty()) {
        Some(cut) => {
            segments.truncate(cut);
            (segments, false)
        }
        None => (segments, true),
    }
}

/// Builds the navigable folder tree from a complete listing.
///
/// The result depends only on the set of entries, except that folders with
/// equal timestamps keep the order in which they were first seen.
pub fn build_tree(entries: &[ObjectEntry]) -> FolderNode {
    // Pass 1: every implied directory, and marker timestamps.
    let mut known_dirs: BTreeSet<String> = BTreeSet::new();
    let mut dir_times: HashMap<String, DateTime<Utc>> = HashMap::new();
    let mut discovery: Vec<String> = Vec::new();

    for entry in entries {
        let (segments, clean) = directory_segments(&entry.key);
        if !clean {
            tracing::debug!(key = %entry.key, "key has an empty segment");
        }
        let mut path = String::new();
        for segment in &segments {
            path.push_str(segment);
            path.push('/');
            if known_dirs.insert(path.clone()) {
                discovery.push(path.clone());
            }
        }
        if clean && is_marker_key(&entry.key) {
            let dir = entry.key[..entry.key.len() - MARKER_NAME.len()].to_string();
            let newer = dir_times
                .get(&dir)
                .map_or(true, |existing| entry.last_modified > *existing);
            if newer {
                dir_times.insert(dir, entry.last_modified);
            }
        }
    }

    let mut builder = TreeBuilder {
        root: FolderNode::default(),
        dir_times,
        next_order: 0,
    };

    // Pass 2: structure from keys outside thumb/original.
    for entry in entries {
        if has_reserved_segment(&entry.key) {
            continue;
        }
        let (segments, _) = directory_segments(&entry.key);
        builder.insert(&segments, false);
    }

    // Pass 3: folders that only exist through markers or pair sub-prefixes.
    for dir in &discovery {
        if has_reserved_segment(dir) || builder.root.find(dir).is_some() {
            continue;
        }
        let segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
        builder.insert(&segments, true);
    }

    builder.root
}
