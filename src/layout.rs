use std::f64::consts::PI;

use glam::DVec2;
use serde::Deserialize;

use crate::distance::DistanceTable;
use crate::error::{Result, VerbumError};
use crate::geometry::{PositionedPoint, Rect};
use crate::hierarchy::HierarchyNode;

/// Radius step of the initial phyllotaxis placement.
const INITIAL_RADIUS: f64 = 10.0;

/// Squared separations below this are softened in the charge force.
const MIN_DISTANCE_SQUARED: f64 = 1.0;

/// Tunables for both layouts. Any field missing from a config file keeps its default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Fixed number of relaxation steps.
    pub iterations: usize,
    /// Pairwise charge; negative repels.
    pub charge_strength: f64,
    /// Per-node collision radius.
    pub collision_radius: f64,
    /// Canvas units per unit of semantic distance.
    pub distance_scale: f64,
    pub semantic_strength: f64,
    /// Fraction of velocity lost each step.
    pub velocity_decay: f64,
    /// Alpha reached after the last step.
    pub alpha_min: f64,
    /// Circular layout radius is `min(width, height) / circle_divisor`.
    pub circle_divisor: f64,
    /// Inset applied to the canvas before fitting and tessellating.
    pub margin: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            iterations: 300,
            charge_strength: -2000.0,
            collision_radius: 100.0,
            distance_scale: 200.0,
            semantic_strength: 1.0,
            velocity_decay: 0.4,
            alpha_min: 0.001,
            circle_divisor: 2.5,
            margin: 8.0,
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(VerbumError::invalid("iterations must be at least 1"));
        }
        if !(self.circle_divisor > 2.0) {
            return Err(VerbumError::invalid(format!(
                "circle_divisor must exceed 2, got {}",
                self.circle_divisor
            )));
        }
        if !(0.0..=1.0).contains(&self.velocity_decay) {
            return Err(VerbumError::invalid(format!(
                "velocity_decay must lie in [0, 1], got {}",
                self.velocity_decay
            )));
        }
        if !(self.alpha_min > 0.0 && self.alpha_min < 1.0) {
            return Err(VerbumError::invalid(format!(
                "alpha_min must lie in (0, 1), got {}",
                self.alpha_min
            )));
        }
        for (name, value) in [
            ("collision_radius", self.collision_radius),
            ("distance_scale", self.distance_scale),
            ("semantic_strength", self.semantic_strength),
            ("margin", self.margin),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(VerbumError::invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if !self.charge_strength.is_finite() {
            return Err(VerbumError::invalid("charge_strength must be finite"));
        }
        Ok(())
    }
}

/// Which placement a level received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    Circular,
    Force,
}

impl LayoutMode {
    pub fn for_distances(distances: Option<&DistanceTable>) -> Self {
        match distances {
            Some(table) if !table.is_empty() => LayoutMode::Force,
            _ => LayoutMode::Circular,
        }
    }
}

/// Target separation between two nodes, by index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticLink {
    pub source: usize,
    pub target: usize,
    pub distance: f64,
}

/// Place `children` on `canvas`: circular without distances, force-directed with them.
pub fn layout(
    children: &[HierarchyNode],
    distances: Option<&DistanceTable>,
    canvas: Rect,
    config: &LayoutConfig,
) -> Vec<PositionedPoint> {
    if children.is_empty() {
        return Vec::new();
    }

    let positions = match (LayoutMode::for_distances(distances), distances) {
        (LayoutMode::Force, Some(table)) => {
            let links = semantic_links(children, table);
            tracing::debug!(
                "Force layout for {} children with {} semantic links",
                children.len(),
                links.len()
            );
            let settled = ForceSimulation::new(children.len(), links, canvas.center(), config).run();
            fit_to_bounds(settled, canvas.center(), canvas.inset(config.margin))
        }
        _ => {
            tracing::debug!("Circular layout for {} children", children.len());
            circular_positions(children.len(), canvas, config.circle_divisor)
        }
    };

    children
        .iter()
        .zip(positions)
        .enumerate()
        .map(|(index, (node, position))| PositionedPoint {
            index,
            name: node.name.clone(),
            kind: node.kind.clone(),
            position,
        })
        .collect()
}

/// Even spacing on a circle around the canvas center, first child at angle 0.
pub fn circular_positions(count: usize, canvas: Rect, divisor: f64) -> Vec<DVec2> {
    let center = canvas.center();
    let radius = canvas.short_side() / divisor;
    (0..count)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / count as f64;
            center + DVec2::new(angle.cos(), angle.sin()) * radius
        })
        .collect()
}

/// Resolve table entries to sibling indices. Pairs naming an absent child are dropped.
pub fn semantic_links(children: &[HierarchyNode], table: &DistanceTable) -> Vec<SemanticLink> {
    let index_of = |name: &str| children.iter().position(|child| child.name == name);
    table
        .iter()
        .filter_map(|(a, b, distance)| match (index_of(a), index_of(b)) {
            (Some(source), Some(target)) => Some(SemanticLink {
                source,
                target,
                distance,
            }),
            _ => {
                tracing::debug!("Ignoring distance '{}|{}': not a child of this level", a, b);
                None
            }
        })
        .collect()
}

/// Velocity deltas pulling every linked pair toward `distance * distance_scale`.
///
/// Both endpoints receive equal and opposite deltas, so a pair's centroid is
/// unchanged. Nodes named by no link receive zero.
pub fn semantic_forces(
    positions: &[DVec2],
    links: &[SemanticLink],
    alpha: f64,
    config: &LayoutConfig,
) -> Vec<DVec2> {
    let mut deltas = vec![DVec2::ZERO; positions.len()];
    for link in links {
        let (Some(&source), Some(&target)) = (positions.get(link.source), positions.get(link.target))
        else {
            continue;
        };
        let offset = target - source;
        let length = offset.length();
        if length == 0.0 {
            continue;
        }
        let goal = link.distance * config.distance_scale;
        let k = (length - goal) / length * alpha * config.semantic_strength;
        let pull = offset * k;
        deltas[link.source] += pull;
        deltas[link.target] -= pull;
    }
    deltas
}

/// Small deterministic perturbation for coincident nodes.
#[derive(Debug, Clone)]
struct Jiggle(u64);

impl Jiggle {
    fn next(&mut self) -> f64 {
        // 64-bit LCG (Knuth MMIX constants).
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 11) as f64 / (1u64 << 53) as f64 - 0.5) * 1e-6
    }
}

/// Velocity-Verlet style relaxation with charge, collision, centering and semantic forces.
#[derive(Debug, Clone)]
pub struct ForceSimulation {
    positions: Vec<DVec2>,
    velocities: Vec<DVec2>,
    links: Vec<SemanticLink>,
    center: DVec2,
    alpha: f64,
    alpha_decay: f64,
    config: LayoutConfig,
    jiggle: Jiggle,
}

impl ForceSimulation {
    /// Start from a phyllotaxis spiral around `center`.
    pub fn new(count: usize, links: Vec<SemanticLink>, center: DVec2, config: &LayoutConfig) -> Self {
        let angle_step = PI * (3.0 - 5.0_f64.sqrt());
        let positions = (0..count)
            .map(|i| {
                let radius = INITIAL_RADIUS * (0.5 + i as f64).sqrt();
                let angle = i as f64 * angle_step;
                center + DVec2::new(angle.cos(), angle.sin()) * radius
            })
            .collect();
        Self::with_positions(positions, links, center, config)
    }

    pub fn with_positions(
        positions: Vec<DVec2>,
        links: Vec<SemanticLink>,
        center: DVec2,
        config: &LayoutConfig,
    ) -> Self {
        let iterations = config.iterations.max(1) as f64;
        Self {
            velocities: vec![DVec2::ZERO; positions.len()],
            positions,
            links,
            center,
            alpha: 1.0,
            alpha_decay: 1.0 - config.alpha_min.powf(1.0 / iterations),
            config: config.clone(),
            jiggle: Jiggle(0x5eed),
        }
    }

    pub fn positions(&self) -> &[DVec2] {
        &self.positions
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// One relaxation step.
    pub fn tick(&mut self) {
        self.alpha += (0.0 - self.alpha) * self.alpha_decay;

        self.apply_charge();
        let semantic = semantic_forces(&self.positions, &self.links, self.alpha, &self.config);
        for (velocity, delta) in self.velocities.iter_mut().zip(semantic) {
            *velocity += delta;
        }
        self.apply_collision();

        let keep = 1.0 - self.config.velocity_decay;
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            *velocity *= keep;
            *position += *velocity;
        }
        self.recenter();
    }

    /// Run the full step budget and return the settled positions.
    pub fn run(mut self) -> Vec<DVec2> {
        for _ in 0..self.config.iterations {
            self.tick();
        }
        self.positions
    }

    fn apply_charge(&mut self) {
        let n = self.positions.len();
        let strength = self.config.charge_strength * self.alpha;
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let mut offset = self.positions[j] - self.positions[i];
                if offset.x == 0.0 {
                    offset.x = self.jiggle.next();
                }
                if offset.y == 0.0 {
                    offset.y = self.jiggle.next();
                }
                let mut l2 = offset.length_squared();
                if l2 < MIN_DISTANCE_SQUARED {
                    l2 = (MIN_DISTANCE_SQUARED * l2).sqrt();
                }
                self.velocities[i] += offset * (strength / l2);
            }
        }
    }

    fn apply_collision(&mut self) {
        let n = self.positions.len();
        let reach = self.config.collision_radius * 2.0;
        if reach <= 0.0 {
            return;
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let predicted_i = self.positions[i] + self.velocities[i];
                let predicted_j = self.positions[j] + self.velocities[j];
                let mut offset = predicted_i - predicted_j;
                let mut l2 = offset.length_squared();
                if l2 >= reach * reach {
                    continue;
                }
                if offset.x == 0.0 {
                    offset.x = self.jiggle.next();
                    l2 += offset.x * offset.x;
                }
                if offset.y == 0.0 {
                    offset.y = self.jiggle.next();
                    l2 += offset.y * offset.y;
                }
                let l = l2.sqrt();
                let push = offset * ((reach - l) / l * 0.5);
                self.velocities[i] += push;
                self.velocities[j] -= push;
            }
        }
    }

    fn recenter(&mut self) {
        if self.positions.is_empty() {
            return;
        }
        let centroid = self.positions.iter().copied().sum::<DVec2>() / self.positions.len() as f64;
        let shift = self.center - centroid;
        for position in &mut self.positions {
            *position += shift;
        }
    }
}

/// Scale uniformly about `center` until every position lies inside `bounds`.
pub fn fit_to_bounds(positions: Vec<DVec2>, center: DVec2, bounds: Rect) -> Vec<DVec2> {
    let (min, max) = (bounds.min(), bounds.max());
    let limit = |offset: f64, low: f64, high: f64, origin: f64| {
        if offset > 0.0 {
            (high - origin) / offset
        } else if offset < 0.0 {
            (low - origin) / offset
        } else {
            f64::INFINITY
        }
    };

    let scale = positions
        .iter()
        .map(|p| {
            let offset = *p - center;
            limit(offset.x, min.x, max.x, center.x).min(limit(offset.y, min.y, max.y, center.y))
        })
        .fold(1.0_f64, f64::min)
        .max(0.0);

    if scale >= 1.0 {
        return positions;
    }
    // Shave a hair off so rounding cannot land a point past the edge.
    let scale = scale * (1.0 - 1e-9);
    tracing::debug!("Scaling force layout by {:.3} to fit the canvas", scale);
    positions
        .into_iter()
        .map(|p| center + (p - center) * scale)
        .collect()
}
