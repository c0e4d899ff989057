use std::collections::HashMap;

use glam::DVec2;

use crate::distance::DistanceTable;
use crate::error::Result;
use crate::geometry::{self, Cell, Rect};
use crate::hierarchy::{is_openable_document, HierarchyNode, NodeKind};
use crate::layout::{self, LayoutConfig, LayoutMode};
use crate::navigation::Navigator;

/// The tessellated children of one level, ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelView {
    pub path: Vec<String>,
    pub cells: Vec<Cell>,
    pub mode: LayoutMode,
}

impl LevelView {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// What activating a cell led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Entered a folder. `needs_distances` is set when no table is cached for it yet.
    Descended {
        path: Vec<String>,
        needs_distances: bool,
    },
    /// A document the external viewer should open. Navigation is unchanged.
    OpenDocument { path: String },
    Ignored { reason: String },
}

/// Drill-down explorer: owns the tree, the navigation path, and the current level's tiling.
pub struct Explorer {
    hierarchy: HierarchyNode,
    navigator: Navigator,
    distances: HashMap<Vec<String>, DistanceTable>,
    canvas: Rect,
    config: LayoutConfig,
    view: LevelView,
}

impl Explorer {
    pub fn new(
        hierarchy: HierarchyNode,
        root_distances: DistanceTable,
        canvas: Rect,
        config: LayoutConfig,
    ) -> Self {
        let mut distances = HashMap::new();
        distances.insert(Vec::new(), root_distances);
        let mut explorer = Self {
            hierarchy,
            navigator: Navigator::new(),
            distances,
            canvas,
            config,
            view: LevelView {
                path: Vec::new(),
                cells: Vec::new(),
                mode: LayoutMode::Circular,
            },
        };
        explorer.render();
        explorer
    }

    pub fn hierarchy(&self) -> &HierarchyNode {
        &self.hierarchy
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn path(&self) -> &[String] {
        self.navigator.path()
    }

    pub fn view(&self) -> &LevelView {
        &self.view
    }

    pub fn canvas(&self) -> Rect {
        self.canvas
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Root label followed by every path segment.
    pub fn breadcrumbs(&self) -> Vec<&str> {
        std::iter::once(self.hierarchy.name.as_str())
            .chain(self.navigator.path().iter().map(String::as_str))
            .collect()
    }

    pub fn has_distances(&self, path: &[String]) -> bool {
        self.distances.contains_key(path)
    }

    /// Current path, if its distances have not been provided yet.
    pub fn missing_distances(&self) -> Option<Vec<String>> {
        let path = self.navigator.path();
        (!self.distances.contains_key(path)).then(|| path.to_vec())
    }

    /// Cache a level's table. Re-lays out when it belongs to the level on screen.
    pub fn provide_distances(&mut self, path: Vec<String>, table: DistanceTable) -> bool {
        let current = path.as_slice() == self.navigator.path();
        tracing::debug!("Cached {} distances for /{}", table.len(), path.join("/"));
        self.distances.insert(path, table);
        if current {
            self.render();
        }
        current
    }

    pub fn cell_at(&self, point: DVec2) -> Option<&Cell> {
        geometry::cell_at(&self.view.cells, point).map(|i| &self.view.cells[i])
    }

    /// Activate the cell under `point`, if any.
    pub fn click(&mut self, point: DVec2) -> Result<Option<Activation>> {
        match geometry::cell_at(&self.view.cells, point) {
            Some(index) => self.activate(index).map(Some),
            None => Ok(None),
        }
    }

    /// Activate the cell at `index` of the current view.
    pub fn activate(&mut self, index: usize) -> Result<Activation> {
        let Some(cell) = self.view.cells.get(index) else {
            return Ok(Activation::Ignored {
                reason: format!("no cell at index {}", index),
            });
        };

        match &cell.point.kind {
            NodeKind::Folder => {
                let name = cell.point.name.clone();
                self.navigator.descend(&self.hierarchy, &name)?;
                self.render();
                let path = self.navigator.path().to_vec();
                Ok(Activation::Descended {
                    needs_distances: !self.distances.contains_key(&path),
                    path,
                })
            }
            NodeKind::Document { path } if is_openable_document(path) => {
                tracing::info!("Opening document {}", path);
                Ok(Activation::OpenDocument { path: path.clone() })
            }
            NodeKind::Document { path } => {
                tracing::warn!("Skipping unsupported document {}", path);
                Ok(Activation::Ignored {
                    reason: format!("unsupported document type: {}", path),
                })
            }
            NodeKind::Root => Ok(Activation::Ignored {
                reason: "root is not selectable".to_string(),
            }),
        }
    }

    pub fn jump_to_root(&mut self) {
        self.navigator.jump_to_root(&self.hierarchy);
        self.render();
    }

    pub fn jump_to_ancestor(&mut self, depth: usize) -> Result<()> {
        self.navigator.jump_to_ancestor(&self.hierarchy, depth)?;
        self.render();
        Ok(())
    }

    pub fn ascend(&mut self) -> Result<()> {
        self.navigator.ascend(&self.hierarchy)?;
        self.render();
        Ok(())
    }

    /// Breadcrumb 0 is the root; breadcrumb `k` is path depth `k - 1`.
    pub fn jump_to_breadcrumb(&mut self, index: usize) -> Result<()> {
        match index {
            0 => {
                self.jump_to_root();
                Ok(())
            }
            k => self.jump_to_ancestor(k - 1),
        }
    }

    pub fn resize(&mut self, canvas: Rect) {
        if canvas != self.canvas {
            self.canvas = canvas;
            self.render();
        }
    }

    pub fn set_config(&mut self, config: LayoutConfig) {
        self.config = config;
        self.render();
    }

    /// Swap in a reloaded tree. Cached distances are dropped and the current
    /// path is re-resolved; if it no longer resolves the previous view stays
    /// on screen and the fault is returned.
    pub fn replace_hierarchy(
        &mut self,
        hierarchy: HierarchyNode,
        root_distances: Option<DistanceTable>,
    ) -> Result<()> {
        self.hierarchy = hierarchy;
        self.distances.clear();
        if let Some(table) = root_distances {
            self.distances.insert(Vec::new(), table);
        }

        match self.navigator.current(&self.hierarchy) {
            Ok(_) => {
                self.render();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    "Reloaded tree no longer contains /{}: {}",
                    self.navigator.path().join("/"),
                    err
                );
                Err(err)
            }
        }
    }

    /// Lay out and tessellate the current level. A path that no longer
    /// resolves leaves the previous view in place.
    fn render(&mut self) {
        let node = match self.navigator.current(&self.hierarchy) {
            Ok(node) => node,
            Err(err) => {
                tracing::warn!("Keeping previous view: {}", err);
                return;
            }
        };

        let path = self.navigator.path().to_vec();
        let distances = self.distances.get(&path);
        let mode = LayoutMode::for_distances(distances);
        let points = layout::layout(&node.children, distances, self.canvas, &self.config);

        let cells = match geometry::tessellate(&points, self.canvas, self.config.margin) {
            Ok(cells) => cells,
            Err(err) => {
                tracing::warn!("Cannot tessellate /{}: {}", path.join("/"), err);
                Vec::new()
            }
        };

        tracing::debug!(
            "Rendered /{} with {} cells ({:?})",
            path.join("/"),
            cells.len(),
            mode
        );
        self.view = LevelView { path, cells, mode };
    }
}
