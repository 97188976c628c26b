//! Label set and ranked results

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::engine::ProbabilityVector;
use super::error::{InferenceError, Result};

/// GTZAN genre labels, in classifier output order
pub const GTZAN_GENRES: [&str; 10] = [
    "blues",
    "classical",
    "country",
    "disco",
    "hiphop",
    "jazz",
    "metal",
    "pop",
    "reggae",
    "rock",
];

/// Ordered, non-empty list of unique genre labels
///
/// Position `i` names classifier output `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Arc<[String]>,
}

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(InferenceError::InvalidLabels("label list is empty".into()));
        }
        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if !seen.insert(label.as_str()) {
                return Err(InferenceError::InvalidLabels(format!("duplicate label '{}'", label)));
            }
        }
        Ok(Self { labels: labels.into() })
    }

    pub fn gtzan() -> Self {
        Self {
            labels: GTZAN_GENRES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// One label with its raw score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub label: String,
    /// Position in the label set
    pub index: usize,
    pub score: f32,
}

/// Display entry: score expressed as a percentage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopEntry {
    pub label: String,
    pub percent: f32,
}

/// All labels sorted by descending score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    entries: Vec<RankedEntry>,
}

impl Ranking {
    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    /// Highest-scoring entry
    pub fn predicted(&self) -> Option<&RankedEntry> {
        self.entries.first()
    }

    /// First `k` entries as percentages (all of them if `k` exceeds the label count)
    pub fn top_k(&self, k: usize) -> Vec<TopEntry> {
        self.entries
            .iter()
            .take(k)
            .map(|e| TopEntry {
                label: e.label.clone(),
                percent: e.score * 100.0,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pair scores with labels and sort descending
///
/// Ties keep label order. Scores are not renormalized. Non-finite scores are
/// rejected since they have no place in a descending order.
pub fn rank(probs: &ProbabilityVector, labels: &LabelSet) -> Result<Ranking> {
    if probs.len() != labels.len() {
        return Err(InferenceError::LabelMismatch {
            expected: labels.len(),
            actual: probs.len(),
        });
    }
    if let Some(index) = probs.scores().iter().position(|s| !s.is_finite()) {
        return Err(InferenceError::Inference(format!(
            "non-finite score for label '{}'",
            labels.get(index).unwrap_or("?")
        )));
    }

    let mut entries: Vec<RankedEntry> = labels
        .iter()
        .zip(probs.scores())
        .enumerate()
        .map(|(index, (label, &score))| RankedEntry {
            label: label.to_string(),
            index,
            score,
        })
        .collect();

    // sort_by is stable
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));

    Ok(Ranking { entries })
}
