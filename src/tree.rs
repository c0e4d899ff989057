use indextree::{Arena, NodeId};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::crawler::LibraryEntry;
use crate::hierarchy::HierarchyNode;

/// A file or folder inside the library arena.
#[derive(Debug, Clone)]
pub struct LibraryNode {
    /// Path relative to the library root; empty for the root.
    pub relative: PathBuf,
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Arena-backed library tree built from crawler entries.
pub struct LibraryTree {
    arena: Arena<LibraryNode>,
    root: NodeId,
    path_to_node: HashMap<PathBuf, NodeId>,
}

impl LibraryTree {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(LibraryNode {
            relative: PathBuf::new(),
            name: "root".to_string(),
            size: 0,
            is_dir: true,
        });
        let mut path_to_node = HashMap::new();
        path_to_node.insert(PathBuf::new(), root);

        Self {
            arena,
            root,
            path_to_node,
        }
    }

    /// Build from crawler output. Parents must precede their children.
    pub fn from_entries(entries: &[LibraryEntry]) -> Self {
        let mut tree = Self::new();
        for entry in entries {
            tree.add_entry(entry);
        }
        tree
    }

    /// Attach an entry under its parent. Entries whose parent is unknown are dropped.
    pub fn add_entry(&mut self, entry: &LibraryEntry) {
        if self.path_to_node.contains_key(&entry.relative) {
            return;
        }
        let parent_path = entry.relative.parent().unwrap_or(Path::new(""));
        let Some(&parent_id) = self.path_to_node.get(parent_path) else {
            tracing::debug!("Orphan library entry {}", entry.relative.display());
            return;
        };

        let name = entry
            .relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let node_id = self.arena.new_node(LibraryNode {
            relative: entry.relative.clone(),
            name,
            size: entry.size,
            is_dir: entry.is_dir,
        });
        parent_id.append(node_id, &mut self.arena);
        self.path_to_node.insert(entry.relative.clone(), node_id);
    }

    pub fn get_root(&self) -> NodeId {
        self.root
    }

    pub fn get_arena(&self) -> &Arena<LibraryNode> {
        &self.arena
    }

    pub fn get_node(&self, relative: &Path) -> Option<NodeId> {
        self.path_to_node.get(relative).copied()
    }

    pub fn len(&self) -> usize {
        self.path_to_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Convert to the display hierarchy: the top level lists folders only,
    /// deeper levels list folders and documents, each sorted by name.
    pub fn to_hierarchy(&self) -> HierarchyNode {
        let children = self
            .sorted_children(self.root)
            .into_iter()
            .filter(|&id| self.arena[id].get().is_dir)
            .map(|id| self.convert(id))
            .collect();
        HierarchyNode::root(children)
    }

    fn sorted_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = id.children(&self.arena).collect();
        children.sort_by(|a, b| self.arena[*a].get().name.cmp(&self.arena[*b].get().name));
        children
    }

    fn convert(&self, id: NodeId) -> HierarchyNode {
        let node = self.arena[id].get();
        if node.is_dir {
            let children = self
                .sorted_children(id)
                .into_iter()
                .map(|child| self.convert(child))
                .collect();
            HierarchyNode::folder(node.name.clone(), children)
        } else {
            HierarchyNode::document(node.name.clone(), slash_path(&node.relative))
        }
    }
}

impl Default for LibraryTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Relative path with `/` separators regardless of platform.
pub fn slash_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
