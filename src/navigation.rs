use crate::error::{Result, VerbumError};
use crate::hierarchy::{HierarchyNode, NodeKind};

/// Drill-down position: the child names walked from the root to the current level.
///
/// The navigator never holds the tree itself; every transition is handed the
/// root it should resolve against, so a reloaded tree is picked up naturally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigator {
    path: Vec<String>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn is_at_root(&self) -> bool {
        self.path.is_empty()
    }

    /// The node the path currently names.
    pub fn current<'a>(&self, root: &'a HierarchyNode) -> Result<&'a HierarchyNode> {
        root.walk(&self.path)
    }

    /// Enter the folder child `name` of the current level.
    pub fn descend<'a>(&mut self, root: &'a HierarchyNode, name: &str) -> Result<&'a HierarchyNode> {
        let current = self.current(root)?;
        let child = current
            .child(name)
            .ok_or_else(|| VerbumError::UnknownChild {
                name: name.to_string(),
            })?;
        match child.kind {
            NodeKind::Folder => {
                self.path.push(name.to_string());
                tracing::info!("Descended into '{}' (depth {})", name, self.path.len());
                Ok(child)
            }
            NodeKind::Root | NodeKind::Document { .. } => Err(VerbumError::NotAFolder {
                name: name.to_string(),
            }),
        }
    }

    pub fn jump_to_root<'a>(&mut self, root: &'a HierarchyNode) -> &'a HierarchyNode {
        self.path.clear();
        tracing::info!("Returned to root");
        root
    }

    /// Keep the first `depth + 1` path segments and re-walk them from `root`.
    /// On failure the path is left untouched.
    pub fn jump_to_ancestor<'a>(
        &mut self,
        root: &'a HierarchyNode,
        depth: usize,
    ) -> Result<&'a HierarchyNode> {
        let len = depth + 1;
        if len > self.path.len() {
            return Err(VerbumError::DepthOutOfRange {
                depth,
                len: self.path.len(),
            });
        }
        let node = root.walk(&self.path[..len]).map_err(|err| {
            tracing::warn!("Ancestor jump to depth {} failed: {}", depth, err);
            err
        })?;
        self.path.truncate(len);
        Ok(node)
    }

    /// Move one level up; at the root this stays put.
    pub fn ascend<'a>(&mut self, root: &'a HierarchyNode) -> Result<&'a HierarchyNode> {
        match self.path.len() {
            0 => Ok(root),
            1 => Ok(self.jump_to_root(root)),
            n => self.jump_to_ancestor(root, n - 2),
        }
    }

    /// Adopt `path` if it resolves against `root`; otherwise keep the current one.
    pub fn restore<'a>(&mut self, root: &'a HierarchyNode, path: &[String]) -> Result<&'a HierarchyNode> {
        let node = root.walk(path)?;
        if !node.kind.is_folder() && !matches!(node.kind, NodeKind::Root) {
            return Err(VerbumError::NotAFolder {
                name: node.name.clone(),
            });
        }
        self.path = path.to_vec();
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> HierarchyNode {
        HierarchyNode::root(vec![
            HierarchyNode::folder(
                "A",
                vec![
                    HierarchyNode::folder(
                        "B",
                        vec![HierarchyNode::folder(
                            "C",
                            vec![HierarchyNode::document("deep.pdf", "A/B/C/deep.pdf")],
                        )],
                    ),
                    HierarchyNode::document("doc1.pdf", "A/doc1.pdf"),
                ],
            ),
            HierarchyNode::folder("Z", Vec::new()),
        ])
    }

    #[test]
    fn test_descend_appends_folder() {
        let root = sample_tree();
        let mut nav = Navigator::new();
        let node = nav.descend(&root, "A").unwrap();
        assert_eq!(node.name, "A");
        assert_eq!(nav.path(), ["A".to_string()]);
        assert_eq!(nav.current(&root).unwrap().name, "A");
    }

    #[test]
    fn test_descend_rejects_documents_and_unknown_names() {
        let root = sample_tree();
        let mut nav = Navigator::new();
        nav.descend(&root, "A").unwrap();

        assert!(matches!(
            nav.descend(&root, "doc1.pdf"),
            Err(VerbumError::NotAFolder { .. })
        ));
        assert!(matches!(
            nav.descend(&root, "nope"),
            Err(VerbumError::UnknownChild { .. })
        ));
        assert_eq!(nav.depth(), 1);
    }

    #[test]
    fn test_jump_to_root_after_any_descent() {
        let root = sample_tree();
        let mut nav = Navigator::new();
        nav.descend(&root, "A").unwrap();
        nav.descend(&root, "B").unwrap();
        nav.descend(&root, "C").unwrap();

        let node = nav.jump_to_root(&root);
        assert!(nav.is_at_root());
        assert_eq!(node, &root);
        assert_eq!(nav.current(&root).unwrap(), &root);
    }

    #[test]
    fn test_jump_to_ancestor_zero_returns_to_first_descent() {
        let root = sample_tree();
        let mut nav = Navigator::new();
        nav.descend(&root, "A").unwrap();
        let after_first = nav.clone();
        nav.descend(&root, "B").unwrap();
        nav.descend(&root, "C").unwrap();

        let node = nav.jump_to_ancestor(&root, 0).unwrap();
        assert_eq!(node.name, "A");
        assert_eq!(nav, after_first);
        assert_eq!(nav.depth(), 1);
    }

    #[test]
    fn test_jump_to_ancestor_out_of_range() {
        let root = sample_tree();
        let mut nav = Navigator::new();
        nav.descend(&root, "A").unwrap();
        assert!(matches!(
            nav.jump_to_ancestor(&root, 1),
            Err(VerbumError::DepthOutOfRange { depth: 1, len: 1 })
        ));
        assert_eq!(nav.depth(), 1);
    }

    #[test]
    fn test_unresolvable_ancestor_keeps_path() {
        let root = sample_tree();
        let mut nav = Navigator::new();
        nav.descend(&root, "A").unwrap();
        nav.descend(&root, "B").unwrap();

        // Same names, but "B" vanished from the reloaded tree.
        let reloaded = HierarchyNode::root(vec![HierarchyNode::folder("A", Vec::new())]);
        let err = nav.jump_to_ancestor(&reloaded, 1).unwrap_err();
        assert!(matches!(err, VerbumError::Unresolvable { depth: 1, .. }));
        assert_eq!(nav.path(), ["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_ascend_walks_back_one_level() {
        let root = sample_tree();
        let mut nav = Navigator::new();
        assert_eq!(nav.ascend(&root).unwrap(), &root);
        nav.descend(&root, "A").unwrap();
        nav.descend(&root, "B").unwrap();
        assert_eq!(nav.ascend(&root).unwrap().name, "A");
        assert_eq!(nav.ascend(&root).unwrap(), &root);
        assert!(nav.is_at_root());
    }

    #[test]
    fn test_restore_only_accepts_resolvable_folders() {
        let root = sample_tree();
        let mut nav = Navigator::new();
        let path = vec!["A".to_string(), "B".to_string()];
        assert_eq!(nav.restore(&root, &path).unwrap().name, "B");
        assert_eq!(nav.path(), path.as_slice());

        let to_doc = vec!["A".to_string(), "doc1.pdf".to_string()];
        assert!(nav.restore(&root, &to_doc).is_err());
        assert_eq!(nav.path(), path.as_slice());
    }
}
