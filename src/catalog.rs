use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::distance::DistanceTable;
use crate::error::{Result, VerbumError};
use crate::hierarchy::HierarchyNode;

/// Where the tree, its per-level distances, and document bytes come from.
pub trait Catalog: Send + Sync {
    fn hierarchy(&self) -> Result<HierarchyNode>;

    /// Distances between the children of the folder at `path` (empty path = root level).
    /// An empty table means the level has no semantic data.
    fn level_distances(&self, path: &[String]) -> Result<DistanceTable>;

    fn document(&self, path: &str) -> Result<Vec<u8>>;

    /// The tree together with its root-level distances, fetched concurrently.
    /// Catalogs that derive distances from their own tree should compute both
    /// from the same snapshot.
    fn load(&self) -> Result<(HierarchyNode, DistanceTable)> {
        let (hierarchy, distances) =
            rayon::join(|| self.hierarchy(), || self.level_distances(&[]));
        Ok((hierarchy?, distances?))
    }

    /// Short human-readable description for status lines.
    fn describe(&self) -> String;
}

/// Question answering about one document.
pub trait Answerer: Send + Sync {
    fn ask(&self, request: &AskRequest) -> Result<Answer>;
}

/// Answerer used when no question backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

impl Answerer for Unavailable {
    fn ask(&self, _request: &AskRequest) -> Result<Answer> {
        Err(VerbumError::AnswererUnavailable)
    }
}

/// `GET /api/hierarchy` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyEnvelope {
    pub hierarchy: HierarchyNode,
}

/// `GET /api/semantic-distances/level-N` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistancesEnvelope {
    pub distances: BTreeMap<String, f64>,
    /// Names the table covers, when the server reports them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
}

impl DistancesEnvelope {
    pub fn from_table(table: &DistanceTable, nodes: Vec<String>) -> Self {
        Self {
            distances: table.to_wire(),
            nodes,
        }
    }

    pub fn into_table(self) -> Result<DistanceTable> {
        DistanceTable::from_wire(&self.distances)
    }
}

/// `POST /api/ask` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub document: String,
}

/// `POST /api/ask` reply: an answer with confidence, or an error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AskReply {
    Answered { answer: String, confidence: f64 },
    Failed { error: String },
}

impl AskReply {
    pub fn into_answer(self) -> Result<Answer> {
        match self {
            AskReply::Answered { answer, confidence } => Ok(Answer::new(answer, confidence)),
            AskReply::Failed { error } => Err(VerbumError::Question { message: error }),
        }
    }
}

/// A successful answer. Confidence is kept within `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub confidence: f64,
}

impl Answer {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// Confidence as a whole percentage.
    pub fn percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }
}
