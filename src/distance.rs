use std::collections::BTreeMap;

use crate::error::{Result, VerbumError};

/// Separator between the two sibling names in a wire key.
pub const PAIR_SEPARATOR: char = '|';

/// Unordered pair of sibling names, stored with the smaller name first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    low: String,
    high: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    pub fn names(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }
}

/// Pairwise semantic distances between siblings of one level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceTable {
    entries: BTreeMap<PairKey, f64>,
}

impl DistanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a distance. Self pairs and negative or non-finite values are rejected.
    pub fn insert(&mut self, a: &str, b: &str, distance: f64) -> Result<()> {
        if a == b {
            return Err(VerbumError::malformed(format!(
                "distance pairs '{}' with itself",
                a
            )));
        }
        if !distance.is_finite() || distance < 0.0 {
            return Err(VerbumError::malformed(format!(
                "distance between '{}' and '{}' is {}",
                a, b, distance
            )));
        }
        self.entries.insert(PairKey::new(a, b), distance);
        Ok(())
    }

    /// Order-insensitive lookup.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.entries.get(&PairKey::new(a, b)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.entries.iter().map(|(key, &d)| {
            let (a, b) = key.names();
            (a, b, d)
        })
    }

    /// Decode the `{"a|b": distance}` wire map.
    ///
    /// A pair listed in both orders keeps the first value in key order.
    pub fn from_wire(map: &BTreeMap<String, f64>) -> Result<Self> {
        let mut table = Self::new();
        for (key, &distance) in map {
            let (a, b) = key.split_once(PAIR_SEPARATOR).ok_or_else(|| {
                VerbumError::malformed(format!("distance key '{}' has no separator", key))
            })?;
            if table.get(a, b).is_some() {
                tracing::warn!("Distance pair '{}' listed twice, keeping first value", key);
                continue;
            }
            table.insert(a, b, distance)?;
        }
        Ok(table)
    }

    /// Encode back to wire keys, `low|high`.
    pub fn to_wire(&self) -> BTreeMap<String, f64> {
        self.iter()
            .map(|(a, b, d)| (format!("{}{}{}", a, PAIR_SEPARATOR, b), d))
            .collect()
    }
}
