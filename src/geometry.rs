use std::collections::HashSet;

use glam::DVec2;
use rayon::prelude::*;

use crate::error::{Result, VerbumError};
use crate::hierarchy::NodeKind;

/// Vertices closer than this (in canvas units) are merged after clipping.
const VERTEX_EPSILON: f64 = 1e-9;

/// Offset applied to coincident generators, relative to the canvas diagonal.
const NUDGE_FRACTION: f64 = 1e-7;

/// Golden angle in radians, used to spread nudges deterministically.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

/// Axis-aligned rectangle in canvas coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle anchored at the origin.
    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn short_side(&self) -> f64 {
        self.width.min(self.height)
    }

    pub fn center(&self) -> DVec2 {
        DVec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn min(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }

    pub fn max(&self) -> DVec2 {
        DVec2::new(self.x + self.width, self.y + self.height)
    }

    pub fn is_positive(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }

    /// Shrink by `margin` on every side. The margin is capped at a quarter of
    /// the short side so a positive rectangle stays positive.
    pub fn inset(&self, margin: f64) -> Rect {
        let margin = margin.max(0.0).min(self.short_side() * 0.25);
        Rect::new(
            self.x + margin,
            self.y + margin,
            self.width - margin * 2.0,
            self.height - margin * 2.0,
        )
    }

    pub fn contains(&self, point: DVec2) -> bool {
        let (min, max) = (self.min(), self.max());
        point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
    }

    pub fn clamp(&self, point: DVec2) -> DVec2 {
        point.clamp(self.min(), self.max())
    }

    /// Corners with positive shoelace area, starting at the minimum corner.
    pub fn corners(&self) -> [DVec2; 4] {
        let (min, max) = (self.min(), self.max());
        [
            min,
            DVec2::new(max.x, min.y),
            max,
            DVec2::new(min.x, max.y),
        ]
    }

    pub fn diagonal(&self) -> f64 {
        (self.width * self.width + self.height * self.height).sqrt()
    }
}

/// Closed convex polygon; the last vertex connects back to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<DVec2>,
}

impl Polygon {
    pub fn new(vertices: Vec<DVec2>) -> Self {
        Self { vertices }
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self::new(rect.corners().to_vec())
    }

    /// Shoelace area; positive for the winding every cell uses.
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f64 = (0..n)
            .map(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice * 0.5
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Area centroid, falling back to the vertex mean for slivers.
    pub fn centroid(&self) -> DVec2 {
        let n = self.vertices.len();
        if n == 0 {
            return DVec2::ZERO;
        }
        let area = self.signed_area();
        if area.abs() < VERTEX_EPSILON {
            return self.vertices.iter().copied().sum::<DVec2>() / n as f64;
        }
        let mut acc = DVec2::ZERO;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let cross = a.x * b.y - b.x * a.y;
            acc += (a + b) * cross;
        }
        acc / (6.0 * area)
    }

    /// Point-in-polygon for a convex polygon with positive winding.
    /// `tolerance` > 0 admits points slightly outside; < 0 demands strict interior.
    pub fn contains_with_tolerance(&self, point: DVec2, tolerance: f64) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        (0..n).all(|i| {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let edge = b - a;
            let len = edge.length();
            if len == 0.0 {
                return true;
            }
            // Signed distance of `point` to the left of edge a->b.
            edge.perp_dot(point - a) / len >= -tolerance
        })
    }

    pub fn contains(&self, point: DVec2) -> bool {
        self.contains_with_tolerance(point, 1e-9)
    }
}

/// A child of the current level, placed on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedPoint {
    /// Index of the node among its siblings.
    pub index: usize,
    pub name: String,
    pub kind: NodeKind,
    pub position: DVec2,
}

/// One point together with its clipped Voronoi region.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub point: PositionedPoint,
    pub polygon: Polygon,
}

/// Partition `bounds` (after insetting by `margin`) into one Voronoi cell per point.
pub fn tessellate(points: &[PositionedPoint], bounds: Rect, margin: f64) -> Result<Vec<Cell>> {
    if !bounds.is_positive() {
        return Err(VerbumError::invalid(format!(
            "tessellation bounds must have positive size, got {}x{}",
            bounds.width, bounds.height
        )));
    }
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let clip = bounds.inset(margin);
    let sites: Vec<DVec2> = points.iter().map(|p| p.position).collect();
    let polygons = voronoi_cells(&sites, clip);

    Ok(points
        .iter()
        .cloned()
        .zip(polygons)
        .map(|(point, polygon)| Cell { point, polygon })
        .collect())
}

/// Voronoi regions of `sites`, each clipped to `clip`, in input order.
///
/// Every region starts as the clip rectangle and is cut by the bisector
/// half-plane of every other site, nearest first.
pub fn voronoi_cells(sites: &[DVec2], clip: Rect) -> Vec<Polygon> {
    let generators = separate_generators(sites, clip);

    generators
        .par_iter()
        .enumerate()
        .map(|(i, &site)| {
            let mut others: Vec<DVec2> = generators
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &other)| other)
                .collect();
            others.sort_by(|a, b| site.distance_squared(*a).total_cmp(&site.distance_squared(*b)));

            let mut vertices = clip.corners().to_vec();
            for other in others {
                if vertices.len() < 3 {
                    break;
                }
                vertices = clip_to_bisector(&vertices, site, other);
            }
            Polygon::new(vertices)
        })
        .collect()
}

/// Hit test: index of the first cell containing `point`.
pub fn cell_at(cells: &[Cell], point: DVec2) -> Option<usize> {
    cells.iter().position(|cell| cell.polygon.contains(point))
}

/// Keep the part of `polygon` that is at least as close to `site` as to `other`.
fn clip_to_bisector(polygon: &[DVec2], site: DVec2, other: DVec2) -> Vec<DVec2> {
    let normal = other - site;
    let offset = normal.dot((site + other) * 0.5);
    let side = |p: DVec2| normal.dot(p) - offset;

    let n = polygon.len();
    let mut out = Vec::with_capacity(n + 1);
    for i in 0..n {
        let current = polygon[i];
        let next = polygon[(i + 1) % n];
        let dc = side(current);
        let dn = side(next);

        if dc <= 0.0 {
            push_vertex(&mut out, current);
        }
        if (dc <= 0.0) != (dn <= 0.0) {
            let t = dc / (dc - dn);
            push_vertex(&mut out, current + (next - current) * t);
        }
    }

    if out.len() > 1 && out[0].distance(out[out.len() - 1]) < VERTEX_EPSILON {
        out.pop();
    }
    out
}

fn push_vertex(out: &mut Vec<DVec2>, vertex: DVec2) {
    if let Some(last) = out.last() {
        if last.distance(vertex) < VERTEX_EPSILON {
            return;
        }
    }
    out.push(vertex);
}

/// Clamp sites into `clip` and move exact duplicates apart by a sub-pixel step.
fn separate_generators(sites: &[DVec2], clip: Rect) -> Vec<DVec2> {
    let step = clip.diagonal() * NUDGE_FRACTION;
    let mut taken: HashSet<(u64, u64)> = HashSet::with_capacity(sites.len());
    let key = |p: DVec2| (p.x.to_bits(), p.y.to_bits());

    sites
        .iter()
        .enumerate()
        .map(|(i, &site)| {
            let mut candidate = clip.clamp(site);
            let mut attempt = 0usize;
            while taken.contains(&key(candidate)) {
                attempt += 1;
                let angle = GOLDEN_ANGLE * (i + attempt) as f64;
                let offset = DVec2::new(angle.cos(), angle.sin()) * step * attempt as f64;
                candidate = clip.clamp(clip.clamp(site) + offset);
            }
            if attempt > 0 {
                tracing::debug!("Separated coincident generator {} after {} nudges", i, attempt);
            }
            taken.insert(key(candidate));
            candidate
        })
        .collect()
}
