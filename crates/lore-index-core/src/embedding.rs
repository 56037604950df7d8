//! TF-IDF embedder and sparse vector utilities.
//!
//! The embedder is fitted over the full chunk corpus and maps text to a
//! sparse term-weight vector. A vector is only meaningful together with the
//! vocabulary and idf table that produced it, which is why the index always
//! persists and restores the three together.
//!
//! # Weighting
//!
//! - `tf(term)`: raw count of the term in the text.
//! - `idf(term) = ln((N + 1) / (df(term) + 1)) + 1`, where `N` is the number
//!   of fitted documents and `df` the number of documents containing the term.
//! - Terms outside the fitted vocabulary contribute nothing. Queries that only
//!   use unseen words score zero against every chunk.
//!
//! # Example
//!
//! ```rust
//! use lore_index_core::embedding::{cosine_similarity, TfIdfEmbedder};
//!
//! let embedder = TfIdfEmbedder::fit(["glintstone sorcery", "faith incantations"]);
//! let doc = embedder.vectorize("glintstone sorcery");
//! let query = embedder.vectorize("Which sorcery?");
//! assert!(cosine_similarity(&doc, &query) > 0.0);
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Split text into lowercase alphanumeric terms.
///
/// Any non-alphanumeric character (punctuation, whitespace, symbols) is a
/// separator, so `"Glintstone-Sorcery!"` yields `["glintstone", "sorcery"]`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Sparse term-weight vector, entries sorted by vocabulary index.
///
/// Serializes as `[[index, weight], ...]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SparseVector(Vec<(u32, f32)>);

impl SparseVector {
    /// Build a vector from arbitrary entries, sorting by index.
    ///
    /// Duplicate indices are summed.
    pub fn from_entries(entries: impl IntoIterator<Item = (u32, f32)>) -> Self {
        let mut merged: BTreeMap<u32, f32> = BTreeMap::new();
        for (index, weight) in entries {
            *merged.entry(index).or_insert(0.0) += weight;
        }
        Self(merged.into_iter().collect())
    }

    pub fn entries(&self) -> &[(u32, f32)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that a deserialized vector is usable under a vocabulary of
    /// `dims` terms.
    ///
    /// Indices must be strictly increasing and below `dims`, and weights
    /// finite and non-negative. Deserialization bypasses [`from_entries`],
    /// so persisted vectors must pass this before they are scored.
    ///
    /// [`from_entries`]: SparseVector::from_entries
    pub fn check(&self, dims: usize) -> Result<(), String> {
        let mut previous: Option<u32> = None;
        for &(index, weight) in &self.0 {
            if index as u64 >= dims as u64 {
                return Err(format!(
                    "term index {} outside a vocabulary of {}",
                    index, dims
                ));
            }
            if previous.is_some_and(|p| index <= p) {
                return Err(format!("term index {} is out of order", index));
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("term index {} has weight {}", index, weight));
            }
            previous = Some(index);
        }
        Ok(())
    }

    pub fn norm(&self) -> f64 {
        self.0
            .iter()
            .map(|(_, w)| (*w as f64) * (*w as f64))
            .sum::<f64>()
            .sqrt()
    }
}

/// Cosine similarity between two sparse vectors.
///
/// Returns exactly `0.0` when either vector has zero norm; never `NaN`.
/// TF-IDF weights are non-negative, so the result lies in `[0.0, 1.0]`.
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f32 {
    let norm_a = a.norm();
    let norm_b = b.norm();
    if norm_a < f64::EPSILON || norm_b < f64::EPSILON {
        return 0.0;
    }

    let (mut i, mut j) = (0, 0);
    let (xs, ys) = (a.entries(), b.entries());
    let mut dot = 0.0f64;
    while i < xs.len() && j < ys.len() {
        match xs[i].0.cmp(&ys[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += xs[i].1 as f64 * ys[j].1 as f64;
                i += 1;
                j += 1;
            }
        }
    }

    let sim = dot / (norm_a * norm_b);
    if sim.is_finite() {
        sim.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

/// Vocabulary and idf table fitted over a corpus of chunk texts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfIdfEmbedder {
    vocabulary: BTreeMap<String, u32>,
    idf: BTreeMap<String, f32>,
}

impl TfIdfEmbedder {
    /// An embedder with an empty vocabulary; every vector it produces is empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit a fresh vocabulary and idf table over `corpus`.
    ///
    /// Indices are assigned in order of first appearance, so fitting the same
    /// ordered corpus twice yields identical state.
    pub fn fit<'a, I>(corpus: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut vocabulary: BTreeMap<String, u32> = BTreeMap::new();
        let mut df: BTreeMap<String, u64> = BTreeMap::new();
        let mut docs: u64 = 0;

        for text in corpus {
            docs += 1;
            let mut seen: HashSet<String> = HashSet::new();
            for term in tokenize(text) {
                if !vocabulary.contains_key(&term) {
                    let next = vocabulary.len() as u32;
                    vocabulary.insert(term.clone(), next);
                }
                if seen.insert(term.clone()) {
                    *df.entry(term).or_insert(0) += 1;
                }
            }
        }

        let n = docs as f64;
        let idf = df
            .into_iter()
            .map(|(term, count)| {
                let weight = ((n + 1.0) / (count as f64 + 1.0)).ln() + 1.0;
                (term, weight as f32)
            })
            .collect();

        Self { vocabulary, idf }
    }

    /// Reassemble an embedder from persisted parts without refitting.
    pub fn from_parts(vocabulary: BTreeMap<String, u32>, idf: BTreeMap<String, f32>) -> Self {
        Self { vocabulary, idf }
    }

    pub fn vocabulary(&self) -> &BTreeMap<String, u32> {
        &self.vocabulary
    }

    pub fn idf(&self) -> &BTreeMap<String, f32> {
        &self.idf
    }

    /// Number of vocabulary terms (the vector space dimensionality).
    pub fn dims(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// Map `text` to a TF-IDF vector under the current vocabulary.
    pub fn vectorize(&self, text: &str) -> SparseVector {
        let mut tf: BTreeMap<u32, (f32, f32)> = BTreeMap::new();
        for term in tokenize(text) {
            let (Some(&index), Some(&idf)) = (self.vocabulary.get(&term), self.idf.get(&term))
            else {
                continue;
            };
            tf.entry(index).or_insert((0.0, idf)).0 += 1.0;
        }
        SparseVector(
            tf.into_iter()
                .map(|(index, (count, idf))| (index, count * idf))
                .collect(),
        )
    }
}
