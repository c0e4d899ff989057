use serde::{Deserialize, Serialize};

use crate::error::{Result, VerbumError};

/// Document extensions the viewer knows how to open.
const OPENABLE_EXTENSIONS: [&str; 1] = ["pdf"];

/// What a hierarchy node is. Documents carry their library-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Folder,
    Document { path: String },
}

impl NodeKind {
    pub fn is_folder(&self) -> bool {
        matches!(self, NodeKind::Folder)
    }

    pub fn document_path(&self) -> Option<&str> {
        match self {
            NodeKind::Document { path } => Some(path),
            NodeKind::Root | NodeKind::Folder => None,
        }
    }
}

/// A node of the folder/document tree, owning its children in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireNode", into = "WireNode")]
pub struct HierarchyNode {
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    pub fn root(children: Vec<HierarchyNode>) -> Self {
        Self {
            name: "root".to_string(),
            kind: NodeKind::Root,
            children,
        }
    }

    pub fn folder(name: impl Into<String>, children: Vec<HierarchyNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Folder,
            children,
        }
    }

    pub fn document(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Document { path: path.into() },
            children: Vec::new(),
        }
    }

    /// First child with exactly this name.
    pub fn child(&self, name: &str) -> Option<&HierarchyNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Walk from this node through `path`, one child name per segment.
    pub fn walk<S: AsRef<str>>(&self, path: &[S]) -> Result<&HierarchyNode> {
        let mut node = self;
        for (depth, segment) in path.iter().enumerate() {
            let segment = segment.as_ref();
            node = node.child(segment).ok_or_else(|| VerbumError::Unresolvable {
                segment: segment.to_string(),
                depth,
            })?;
        }
        Ok(node)
    }

    /// Number of nodes in this subtree, including itself.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(HierarchyNode::len).sum::<usize>()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Whether a document path names something the external viewer can open.
pub fn is_openable_document(path: &str) -> bool {
    let Some((_, ext)) = path.rsplit_once('.') else {
        return false;
    };
    OPENABLE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
}

/// Shape of a node on the wire: `type` is a string, `path` is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireNode {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<WireNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

impl TryFrom<WireNode> for HierarchyNode {
    type Error = VerbumError;

    fn try_from(wire: WireNode) -> Result<Self> {
        let kind = match wire.kind.as_str() {
            "root" => NodeKind::Root,
            "folder" => NodeKind::Folder,
            "document" => {
                let path = wire.path.filter(|p| !p.is_empty()).ok_or_else(|| {
                    VerbumError::malformed(format!("document '{}' has no path", wire.name))
                })?;
                if !wire.children.is_empty() {
                    return Err(VerbumError::malformed(format!(
                        "document '{}' has children",
                        wire.name
                    )));
                }
                NodeKind::Document { path }
            }
            other => {
                return Err(VerbumError::malformed(format!(
                    "node '{}' has unknown type '{}'",
                    wire.name, other
                )))
            }
        };

        let children = wire
            .children
            .into_iter()
            .map(HierarchyNode::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: wire.name,
            kind,
            children,
        })
    }
}

impl From<HierarchyNode> for WireNode {
    fn from(node: HierarchyNode) -> Self {
        let (kind, path) = match node.kind {
            NodeKind::Root => ("root", None),
            NodeKind::Folder => ("folder", None),
            NodeKind::Document { path } => ("document", Some(path)),
        };
        Self {
            name: node.name,
            kind: kind.to_string(),
            children: node.children.into_iter().map(WireNode::from).collect(),
            path,
        }
    }
}
