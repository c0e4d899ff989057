//! Drill-down Voronoi explorer for document libraries.
//!
//! Each level of a folder/document hierarchy is laid out (circularly, or by a
//! force simulation driven by semantic distances between siblings) and then
//! partitioned into Voronoi cells. Clicking a folder cell descends into it;
//! clicking a PDF cell opens it in an external viewer.

pub mod catalog;
pub mod config;
pub mod crawler;
pub mod distance;
pub mod error;
pub mod explorer;
pub mod geometry;
pub mod hierarchy;
pub mod http;
pub mod layout;
pub mod library;
pub mod logging;
pub mod navigation;
pub mod semantic;
pub mod session;
pub mod tree;
pub mod viewer;
pub mod watch;

pub use catalog::{Answer, Answerer, AskRequest, Catalog};
pub use distance::DistanceTable;
pub use error::{FailureClass, Result, VerbumError};
pub use explorer::{Activation, Explorer, LevelView};
pub use geometry::{tessellate, Cell, Polygon, PositionedPoint, Rect};
pub use hierarchy::{HierarchyNode, NodeKind};
pub use layout::{layout, LayoutConfig, LayoutMode};
pub use navigation::Navigator;
pub use session::Session;
