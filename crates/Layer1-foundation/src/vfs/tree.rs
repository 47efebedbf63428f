//! Copy-on-write virtual file tree
//!
//! Nodes live in an arena keyed by their normalized path; folders keep an
//! ordered list of child names. Cloning a [`Vfs`] copies only the key table,
//! every node body is shared through an `Arc` until it is mutated.

use super::path::{self, ROOT};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// External representation
// ============================================================================

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

/// Serialized node exchanged with the editor, explorer and backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,

    pub name: String,

    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FsNode>>,

    /// Display-only marker set by the version-control collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_status: Option<String>,
}

impl FsNode {
    /// New empty file; its path is assigned when it is added to a tree
    pub fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::File,
            name: name.into(),
            path: String::new(),
            content: Some(content.into()),
            children: None,
            vcs_status: None,
        }
    }

    /// New folder with the given children
    pub fn folder(name: impl Into<String>, children: Vec<FsNode>) -> Self {
        Self {
            kind: NodeKind::Folder,
            name: name.into(),
            path: String::new(),
            content: None,
            children: Some(children),
            vcs_status: None,
        }
    }
}

// ============================================================================
// Arena
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    kind: NodeKind,
    name: String,
    content: String,
    /// Child names, folders first then by name
    children: Vec<String>,
    vcs_status: Option<String>,
}

impl Entry {
    fn root() -> Self {
        Self {
            kind: NodeKind::Folder,
            name: ROOT.to_string(),
            content: String::new(),
            children: Vec::new(),
            vcs_status: None,
        }
    }
}

fn child_order(a: (NodeKind, &str), b: (NodeKind, &str)) -> Ordering {
    match (a.0, b.0) {
        (NodeKind::Folder, NodeKind::File) => Ordering::Less,
        (NodeKind::File, NodeKind::Folder) => Ordering::Greater,
        _ => a.1.cmp(b.1),
    }
}

/// Immutable-by-default virtual file tree
#[derive(Debug, Clone)]
pub struct Vfs {
    entries: HashMap<String, Arc<Entry>>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    /// Tree containing only the root folder
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(ROOT.to_string(), Arc::new(Entry::root()));
        Self { entries }
    }

    /// Build a tree from its external representation.
    ///
    /// Accepts either `[root]` (a single folder whose path is `/`) or a bare
    /// list of top-level nodes. Incoming paths are ignored and recomputed
    /// from names.
    pub fn from_nodes(nodes: &[FsNode]) -> Result<Self> {
        let top: &[FsNode] = match nodes {
            [root] if root.kind == NodeKind::Folder && (root.name == ROOT || root.path == ROOT) => {
                root.children.as_deref().unwrap_or(&[])
            }
            other => other,
        };

        let mut vfs = Self::new();
        for node in top {
            vfs.add(ROOT, node.clone())?;
        }
        Ok(vfs)
    }

    /// External representation: `[root]`
    pub fn to_nodes(&self) -> Vec<FsNode> {
        self.root().map(|r| vec![r.to_node()]).unwrap_or_default()
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when only the root exists
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn root(&self) -> Option<NodeRef<'_>> {
        self.lookup(ROOT)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Find a node; the path is normalized first
    pub fn find(&self, path: &str) -> Option<NodeRef<'_>> {
        self.lookup(&path::normalize(path))
    }

    /// Find a folder or fail with a path error
    pub fn folder(&self, path: &str) -> Result<NodeRef<'_>> {
        match self.find(path) {
            Some(node) if node.is_folder() => Ok(node),
            Some(_) => Err(Error::path(format!("not a directory: {}", path))),
            None => Err(Error::path(format!("no such directory: {}", path))),
        }
    }

    /// Find a file or fail with a path error
    pub fn file(&self, path: &str) -> Result<NodeRef<'_>> {
        match self.find(path) {
            Some(node) if node.is_file() => Ok(node),
            Some(_) => Err(Error::path(format!("is a directory: {}", path))),
            None => Err(Error::path(format!("no such file: {}", path))),
        }
    }

    fn lookup(&self, key: &str) -> Option<NodeRef<'_>> {
        self.entries
            .get_key_value(key)
            .map(|(path, entry)| NodeRef {
                vfs: self,
                path: path.as_str(),
                entry: entry.as_ref(),
            })
    }

    /// Every path in the subtree rooted at `key`, parents before children
    fn subtree_paths(&self, key: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![key.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(entry) = self.entries.get(&current) {
                for child in entry.children.iter().rev() {
                    stack.push(path::join(&current, child));
                }
                out.push(current);
            }
        }
        out
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add `node` (and its subtree) under `parent_path`. Returns the new path.
    pub fn add(&mut self, parent_path: &str, node: FsNode) -> Result<String> {
        let parent = path::normalize(parent_path);
        match self.entries.get(&parent) {
            Some(entry) if entry.kind == NodeKind::Folder => {}
            Some(_) => return Err(Error::path(format!("not a directory: {}", parent))),
            None => return Err(Error::path(format!("no such directory: {}", parent))),
        }
        validate_subtree(&node)?;

        let child_path = path::join(&parent, &node.name);
        if self.entries.contains_key(&child_path) {
            return Err(Error::path(format!("'{}' already exists", child_path)));
        }

        let name = node.name.clone();
        let kind = node.kind;
        self.insert_subtree(&child_path, node);
        self.link_child(&parent, &name, kind);
        Ok(child_path)
    }

    /// Remove a node and everything below it
    pub fn delete(&mut self, target: &str) -> Result<()> {
        let key = path::normalize(target);
        if key == ROOT {
            return Err(Error::path("cannot remove the root folder"));
        }
        if !self.entries.contains_key(&key) {
            return Err(Error::path(format!("no such file or directory: {}", key)));
        }

        for doomed in self.subtree_paths(&key) {
            self.entries.remove(&doomed);
        }
        let (parent, name) = path::split(&key);
        self.unlink_child(parent, name);
        Ok(())
    }

    /// Replace a file's content
    pub fn update_content(&mut self, target: &str, text: impl Into<String>) -> Result<()> {
        let key = path::normalize(target);
        match self.entries.get_mut(&key) {
            Some(entry) if entry.kind == NodeKind::File => {
                Arc::make_mut(entry).content = text.into();
                Ok(())
            }
            Some(_) => Err(Error::path(format!("is a directory: {}", key))),
            None => Err(Error::path(format!("no such file: {}", key))),
        }
    }

    /// Rename a node in place. Every descendant path is rewritten.
    pub fn rename(&mut self, target: &str, new_name: &str) -> Result<String> {
        let key = path::normalize(target);
        if key == ROOT {
            return Err(Error::path("cannot rename the root folder"));
        }
        path::validate_name(new_name)?;
        let kind = match self.entries.get(&key) {
            Some(entry) => entry.kind,
            None => return Err(Error::path(format!("no such file or directory: {}", key))),
        };

        let (parent, old_name) = {
            let (p, n) = path::split(&key);
            (p.to_string(), n.to_string())
        };
        if old_name == new_name {
            return Ok(key);
        }
        let new_key = path::join(&parent, new_name);
        if self.entries.contains_key(&new_key) {
            return Err(Error::path(format!("'{}' already exists", new_key)));
        }

        for old in self.subtree_paths(&key) {
            if let Some(entry) = self.entries.remove(&old) {
                let moved = format!("{}{}", new_key, &old[key.len()..]);
                self.entries.insert(moved, entry);
            }
        }
        if let Some(entry) = self.entries.get_mut(&new_key) {
            Arc::make_mut(entry).name = new_name.to_string();
        }
        self.unlink_child(&parent, &old_name);
        self.link_child(&parent, new_name, kind);
        Ok(new_key)
    }

    /// Attach or clear the display-only version-control marker
    pub fn set_vcs_status(&mut self, target: &str, status: Option<String>) -> Result<()> {
        let key = path::normalize(target);
        match self.entries.get_mut(&key) {
            Some(entry) => {
                if entry.vcs_status != status {
                    Arc::make_mut(entry).vcs_status = status;
                }
                Ok(())
            }
            None => Err(Error::path(format!("no such file or directory: {}", key))),
        }
    }

    fn insert_subtree(&mut self, at: &str, node: FsNode) {
        let mut children: Vec<(NodeKind, String)> = Vec::new();
        if node.kind == NodeKind::Folder {
            for child in node.children.unwrap_or_default() {
                children.push((child.kind, child.name.clone()));
                let child_path = path::join(at, &child.name);
                self.insert_subtree(&child_path, child);
            }
        }
        children.sort_by(|a, b| child_order((a.0, &a.1), (b.0, &b.1)));

        let entry = Entry {
            kind: node.kind,
            name: node.name,
            content: match node.kind {
                NodeKind::File => node.content.unwrap_or_default(),
                NodeKind::Folder => String::new(),
            },
            children: children.into_iter().map(|(_, name)| name).collect(),
            vcs_status: node.vcs_status,
        };
        self.entries.insert(at.to_string(), Arc::new(entry));
    }

    fn link_child(&mut self, parent: &str, name: &str, kind: NodeKind) {
        let position = match self.entries.get(parent) {
            Some(entry) => entry.children.partition_point(|sibling| {
                let sibling_kind = self
                    .entries
                    .get(&path::join(parent, sibling))
                    .map(|e| e.kind)
                    .unwrap_or(NodeKind::File);
                child_order((sibling_kind, sibling), (kind, name)) == Ordering::Less
            }),
            None => return,
        };
        if let Some(entry) = self.entries.get_mut(parent) {
            Arc::make_mut(entry)
                .children
                .insert(position, name.to_string());
        }
    }

    fn unlink_child(&mut self, parent: &str, name: &str) {
        if let Some(entry) = self.entries.get_mut(parent) {
            Arc::make_mut(entry).children.retain(|child| child != name);
        }
    }
}

fn validate_subtree(node: &FsNode) -> Result<()> {
    path::validate_name(&node.name)?;
    if node.kind == NodeKind::Folder {
        let mut seen = HashSet::new();
        for child in node.children.as_deref().unwrap_or(&[]) {
            if !seen.insert(child.name.as_str()) {
                return Err(Error::path(format!(
                    "duplicate entry '{}' in '{}'",
                    child.name, node.name
                )));
            }
            validate_subtree(child)?;
        }
    }
    Ok(())
}

// ============================================================================
// NodeRef
// ============================================================================

/// Borrowed view of one node inside a [`Vfs`]
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    vfs: &'a Vfs,
    path: &'a str,
    entry: &'a Entry,
}

impl<'a> NodeRef<'a> {
    pub fn kind(&self) -> NodeKind {
        self.entry.kind
    }

    pub fn is_folder(&self) -> bool {
        self.entry.kind == NodeKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.entry.kind == NodeKind::File
    }

    pub fn name(&self) -> &'a str {
        &self.entry.name
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    /// File content; `None` for folders
    pub fn content(&self) -> Option<&'a str> {
        match self.entry.kind {
            NodeKind::File => Some(&self.entry.content),
            NodeKind::Folder => None,
        }
    }

    pub fn vcs_status(&self) -> Option<&'a str> {
        self.entry.vcs_status.as_deref()
    }

    /// Children in display order (empty for files)
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let vfs = self.vfs;
        let base = self.path;
        self.entry
            .children
            .iter()
            .filter_map(move |name| vfs.lookup(&path::join(base, name)))
    }

    /// Owned external representation of this subtree
    pub fn to_node(&self) -> FsNode {
        FsNode {
            kind: self.kind(),
            name: self.name().to_string(),
            path: self.path.to_string(),
            content: self.content().map(str::to_string),
            children: self
                .is_folder()
                .then(|| self.children().map(|c| c.to_node()).collect()),
            vcs_status: self.entry.vcs_status.clone(),
        }
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("path", &self.path)
            .field("kind", &self.entry.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vfs {
        Vfs::from_nodes(&[FsNode::folder(
            "/",
            vec![
                FsNode::file("main.py", "print('hi')"),
                FsNode::folder(
                    "src",
                    vec![
                        FsNode::file("lib.cpp", "int f();"),
                        FsNode::folder("deep", vec![FsNode::file("x.txt", "x")]),
                    ],
                ),
            ],
        )])
        .unwrap()
    }

    /// Every node's path equals parent.path + "/" + name and paths are unique
    fn assert_consistent(vfs: &Vfs) {
        fn walk(node: &FsNode, parent: Option<&str>, seen: &mut HashSet<String>) {
            if let Some(parent) = parent {
                assert_eq!(node.path, path::join(parent, &node.name));
            } else {
                assert_eq!(node.path, "/");
            }
            assert!(seen.insert(node.path.clone()), "duplicate path {}", node.path);
            for child in node.children.as_deref().unwrap_or(&[]) {
                walk(child, Some(&node.path), seen);
            }
        }
        let nodes = vfs.to_nodes();
        assert_eq!(nodes.len(), 1);
        let mut seen = HashSet::new();
        walk(&nodes[0], None, &mut seen);
        assert_eq!(seen.len(), vfs.len());
    }

    #[test]
    fn test_find_normalizes() {
        let vfs = sample();
        assert!(vfs.find("/src/./deep/../lib.cpp").is_some());
        assert_eq!(vfs.find("src/lib.cpp").unwrap().content(), Some("int f();"));
        assert!(vfs.find("/nope").is_none());
        assert!(vfs.folder("/main.py").is_err());
        assert!(vfs.file("/src").is_err());
    }

    #[test]
    fn test_children_folders_first() {
        let vfs = sample();
        let names: Vec<&str> = vfs.root().unwrap().children().map(|c| c.name()).collect();
        assert_eq!(names, vec!["src", "main.py"]);
    }

    #[test]
    fn test_add_assigns_path_and_rejects_duplicates() {
        let mut vfs = sample();
        let path = vfs.add("/src", FsNode::file("a.c", "")).unwrap();
        assert_eq!(path, "/src/a.c");
        assert!(matches!(
            vfs.add("/src", FsNode::file("a.c", "")),
            Err(Error::Path(_))
        ));
        assert!(vfs.add("/main.py", FsNode::file("x", "")).is_err());
        assert!(vfs.add("/missing", FsNode::file("x", "")).is_err());
        assert!(vfs.add("/", FsNode::file("..", "")).is_err());
        assert_consistent(&vfs);
    }

    #[test]
    fn test_delete_removes_subtree() {
        let mut vfs = sample();
        vfs.delete("/src").unwrap();
        assert!(vfs.find("/src/deep/x.txt").is_none());
        assert_eq!(vfs.len(), 2);
        assert!(vfs.delete("/").is_err());
        assert!(vfs.delete("/src").is_err());
        assert_consistent(&vfs);
    }

    #[test]
    fn test_rename_folder_rewrites_descendants() {
        let mut vfs = sample();
        let new_path = vfs.rename("/src", "lib").unwrap();
        assert_eq!(new_path, "/lib");
        assert!(vfs.find("/src").is_none());
        assert_eq!(vfs.find("/lib/deep/x.txt").unwrap().content(), Some("x"));
        assert_eq!(vfs.find("/lib").unwrap().name(), "lib");
        assert_consistent(&vfs);

        assert!(vfs.rename("/lib", "main.py").is_err());
        assert!(vfs.rename("/", "x").is_err());
    }

    #[test]
    fn test_snapshot_isolation() {
        let mut vfs = sample();
        let before = vfs.clone();
        vfs.update_content("/main.py", "print('bye')").unwrap();
        vfs.delete("/src/deep").unwrap();
        assert_eq!(before.find("/main.py").unwrap().content(), Some("print('hi')"));
        assert!(before.find("/src/deep/x.txt").is_some());
        assert_eq!(vfs.find("/main.py").unwrap().content(), Some("print('bye')"));
    }

    #[test]
    fn test_update_content_rejects_folders() {
        let mut vfs = sample();
        assert!(vfs.update_content("/src", "x").is_err());
        assert!(vfs.update_content("/missing", "x").is_err());
    }

    #[test]
    fn test_vcs_status_is_serialized() {
        let mut vfs = sample();
        vfs.set_vcs_status("/main.py", Some("M".to_string())).unwrap();
        let json = serde_json::to_value(vfs.to_nodes()).unwrap();
        let main = &json[0]["children"][1];
        assert_eq!(main["name"], "main.py");
        assert_eq!(main["vcsStatus"], "M");
        assert_eq!(json[0]["type"], "folder");
    }

    #[test]
    fn test_from_nodes_accepts_bare_list_and_recomputes_paths() {
        let mut stray = FsNode::file("a.js", "1");
        stray.path = "/wrong/place".to_string();
        let vfs = Vfs::from_nodes(&[stray]).unwrap();
        assert_eq!(vfs.find("/a.js").unwrap().path(), "/a.js");
    }

    #[test]
    fn test_random_mutations_keep_paths_consistent() {
        let mut vfs = Vfs::new();
        let mut seed: u64 = 0x5eed;
        let mut next = move |n: usize| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 33) as usize) % n
        };
        let names = ["a", "b", "c", "d.txt", "e.py"];

        for _ in 0..400 {
            let folders: Vec<String> = vfs
                .entries
                .iter()
                .filter(|(_, e)| e.kind == NodeKind::Folder)
                .map(|(p, _)| p.clone())
                .collect();
            let all: Vec<String> = vfs.entries.keys().cloned().collect();
            let name = names[next(names.len())];
            match next(3) {
                0 => {
                    let parent = &folders[next(folders.len())];
                    let node = if name.contains('.') {
                        FsNode::file(name, "")
                    } else {
                        FsNode::folder(name, vec![])
                    };
                    let _ = vfs.add(parent, node);
                }
                1 => {
                    let _ = vfs.delete(&all[next(all.len())]);
                }
                _ => {
                    let _ = vfs.rename(&all[next(all.len())], name);
                }
            }
            assert_consistent(&vfs);
        }
    }
}
