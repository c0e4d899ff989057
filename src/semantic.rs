//! Local semantic distances between siblings.
//!
//! Every sibling is summarized as a short text, embedded as a hashed
//! bag-of-words vector, and compared by cosine similarity. Distances are
//! `1 - similarity`, which keeps them within `[0, 1]` because term counts are
//! never negative.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;

use crate::distance::DistanceTable;
use crate::error::Result;
use crate::hierarchy::{HierarchyNode, NodeKind};

pub const DEFAULT_DIMENSIONS: usize = 256;

/// Document titles sampled into a folder summary.
const MAX_TOPICS: usize = 5;

/// Words every summary shares through its template.
const TEMPLATE_WORDS: [&str; 5] = ["knowledge", "domain", "subdomains", "representative", "topics"];

/// Summary text for one sibling; `relative` is its `/`-separated library path.
pub fn summarize(node: &HierarchyNode, relative: &str) -> String {
    match &node.kind {
        NodeKind::Document { .. } => format!("Document: {}", clean_title(&node.name)),
        NodeKind::Root | NodeKind::Folder => {
            let mut parts = vec![format!("Knowledge domain: {}", relative)];

            let subfolders: Vec<&str> = node
                .children
                .iter()
                .filter(|child| child.kind.is_folder())
                .map(|child| child.name.as_str())
                .collect();
            if !subfolders.is_empty() {
                parts.push(format!("Subdomains: {}", subfolders.join(", ")));
            }

            let mut topics = Vec::new();
            collect_topics(node, &mut topics);
            if !topics.is_empty() {
                parts.push(format!("Representative topics: {}", topics.join(", ")));
            }
            parts.join(" ")
        }
    }
}

fn collect_topics(node: &HierarchyNode, topics: &mut Vec<String>) {
    for child in &node.children {
        if topics.len() >= MAX_TOPICS {
            return;
        }
        match &child.kind {
            NodeKind::Document { .. } if child.name.to_ascii_lowercase().ends_with(".pdf") => {
                topics.push(clean_title(&child.name));
            }
            NodeKind::Document { .. } => {}
            NodeKind::Root | NodeKind::Folder => collect_topics(child, topics),
        }
    }
}

/// File name without extension, with `_` and `-` read as spaces.
pub fn clean_title(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    stem.replace(['_', '-'], " ")
}

/// Unit-length hashed term-frequency vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TermVector {
    values: Vec<f64>,
}

impl TermVector {
    pub fn embed(text: &str, dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        let mut values = vec![0.0; dimensions];
        for token in tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            values[(hasher.finish() % dimensions as u64) as usize] += 1.0;
        }

        let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    pub fn cosine_similarity(&self, other: &TermVector) -> f64 {
        if self.dim() != other.dim() || self.is_zero() || other.is_zero() {
            return 0.0;
        }
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a * b)
            .sum()
    }

    pub fn distance(&self, other: &TermVector) -> f64 {
        (1.0 - self.cosine_similarity(other)).clamp(0.0, 1.0)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|word| !TEMPLATE_WORDS.contains(&word.as_str()))
}

/// Per-level distance computation with vectors cached by library path.
pub struct SemanticIndex {
    dimensions: usize,
    cache: DashMap<String, Arc<TermVector>>,
}

impl SemanticIndex {
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_DIMENSIONS)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            cache: DashMap::new(),
        }
    }

    fn vector_for(&self, node: &HierarchyNode, relative: &str) -> Arc<TermVector> {
        if let Some(hit) = self.cache.get(relative) {
            return hit.value().clone();
        }
        let vector = Arc::new(TermVector::embed(&summarize(node, relative), self.dimensions));
        self.cache.insert(relative.to_string(), vector.clone());
        vector
    }

    /// Distances between the children of the folder at `path`.
    /// Children whose summary carries no terms are left out.
    pub fn level_distances(&self, root: &HierarchyNode, path: &[String]) -> Result<DistanceTable> {
        let level = root.walk(path)?;
        let prefix = path.join("/");

        let vectors: Vec<(&str, Arc<TermVector>)> = level
            .children
            .par_iter()
            .filter_map(|child| {
                let relative = if prefix.is_empty() {
                    child.name.clone()
                } else {
                    format!("{}/{}", prefix, child.name)
                };
                let vector = self.vector_for(child, &relative);
                if vector.is_zero() {
                    tracing::debug!("No terms to embed for {}", relative);
                    None
                } else {
                    Some((child.name.as_str(), vector))
                }
            })
            .collect();

        let mut table = DistanceTable::new();
        for (i, (a, va)) in vectors.iter().enumerate() {
            for (b, vb) in &vectors[i + 1..] {
                if a == b {
                    tracing::warn!("Duplicate sibling name '{}' under /{}", a, prefix);
                    continue;
                }
                table.insert(a, b, va.distance(vb))?;
            }
        }
        tracing::debug!("Computed {} distances for /{}", table.len(), prefix);
        Ok(table)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for SemanticIndex {
    fn default() -> Self {
        Self::new()
    }
}
