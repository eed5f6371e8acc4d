//! Threat-seed storage and similarity search.
//!
//! The in-memory store backs the semantic detector: seeds are embedded once
//! at load, reads are concurrent, and bulk upserts take the write lock.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A semantic threat pattern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreatSeed {
    pub id: Uuid,
    pub category: String,
    pub text: String,
    /// Embedding with the provider's dimension; empty until embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Severity in `[0, 1]`; benign seeds carry 0.
    pub severity: f64,
    /// Multi-turn phase name, when the seed belongs to a phased pattern.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phase: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Where the seed came from: yaml, user, or learned.
    pub source: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreatSeed {
    pub fn new(category: impl Into<String>, text: impl Into<String>, severity: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            category: category.into(),
            text: text.into(),
            embedding: Vec::new(),
            severity: severity.clamp(0.0, 1.0),
            phase: String::new(),
            language: "en".to_string(),
            tags: Vec::new(),
            metadata: HashMap::new(),
            source: "yaml".to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One similarity match.
#[derive(Clone, Debug)]
pub struct SeedMatch {
    pub seed: ThreatSeed,
    /// Cosine similarity in `[0, 1]` for unit-ish vectors.
    pub similarity: f64,
}

/// Cosine similarity between two vectors; 0 on dimension mismatch.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for i in 0..a.len() {
        dot += a[i] as f64 * b[i] as f64;
        norm_a += (a[i] as f64).powi(2);
        norm_b += (b[i] as f64).powi(2);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Euclidean distance; `f64::MAX` on dimension mismatch.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::MAX;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (*x as f64 - *y as f64).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// In-memory seed store with concurrent reads.
#[derive(Default)]
pub struct MemoryVectorStore {
    seeds: RwLock<Vec<ThreatSeed>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seeds.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace by seed ID. Takes the write lock once for the
    /// whole batch. Returns how many seeds were written.
    pub fn bulk_upsert(&self, seeds: Vec<ThreatSeed>) -> usize {
        let mut written = 0;
        if let Ok(mut guard) = self.seeds.write() {
            for seed in seeds {
                match guard.iter_mut().find(|s| s.id == seed.id) {
                    Some(existing) => *existing = seed,
                    None => guard.push(seed),
                }
                written += 1;
            }
        }
        written
    }

    /// Top-`limit` active seeds by cosine similarity, at or above
    /// `min_similarity`. Pass an empty `category` to search all categories.
    pub fn search_similar(
        &self,
        embedding: &[f32],
        category: &str,
        limit: usize,
        min_similarity: f64,
    ) -> Vec<SeedMatch> {
        let Ok(guard) = self.seeds.read() else {
            return Vec::new();
        };

        let mut matches: Vec<SeedMatch> = guard
            .iter()
            .filter(|s| s.active && !s.embedding.is_empty())
            .filter(|s| category.is_empty() || s.category == category)
            .filter_map(|s| {
                let similarity = cosine_similarity(embedding, &s.embedding);
                (similarity >= min_similarity).then(|| SeedMatch {
                    seed: s.clone(),
                    similarity,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        matches
    }

    /// Active seeds in a category (all categories when empty), up to
    /// `limit`.
    pub fn list_seeds(&self, category: &str, limit: usize) -> Vec<ThreatSeed> {
        let Ok(guard) = self.seeds.read() else {
            return Vec::new();
        };
        guard
            .iter()
            .filter(|s| s.active && (category.is_empty() || s.category == category))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Per-category seed counts.
    pub fn stats(&self) -> HashMap<String, usize> {
        let mut stats = HashMap::new();
        if let Ok(guard) = self.seeds.read() {
            for seed in guard.iter() {
                *stats.entry(seed.category.clone()).or_insert(0) += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_with_embedding(category: &str, severity: f64, embedding: Vec<f32>) -> ThreatSeed {
        let mut seed = ThreatSeed::new(category, "example text", severity);
        seed.embedding = embedding;
        seed
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn l2_distance_basics() {
        assert!((l2_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-9);
        assert_eq!(l2_distance(&[1.0], &[1.0, 2.0]), f64::MAX);
    }

    #[test]
    fn bulk_upsert_replaces_by_id() {
        let store = MemoryVectorStore::new();
        let mut seed = seed_with_embedding("jailbreak", 0.9, vec![1.0, 0.0]);
        let id = seed.id;
        assert_eq!(store.bulk_upsert(vec![seed.clone()]), 1);
        assert_eq!(store.len(), 1);

        seed.severity = 0.5;
        seed.id = id;
        store.bulk_upsert(vec![seed]);
        assert_eq!(store.len(), 1);
        let seeds = store.list_seeds("jailbreak", 10);
        assert!((seeds[0].severity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn search_orders_by_similarity_and_respects_threshold() {
        let store = MemoryVectorStore::new();
        store.bulk_upsert(vec![
            seed_with_embedding("a", 0.9, vec![1.0, 0.0]),
            seed_with_embedding("b", 0.9, vec![0.9, 0.1]),
            seed_with_embedding("c", 0.9, vec![0.0, 1.0]),
        ]);

        let matches = store.search_similar(&[1.0, 0.0], "", 5, 0.65);
        assert_eq!(matches.len(), 2);
        assert!(matches[0].similarity >= matches[1].similarity);
        assert_eq!(matches[0].seed.category, "a");
    }

    #[test]
    fn search_filters_by_category_and_inactive() {
        let store = MemoryVectorStore::new();
        let mut inactive = seed_with_embedding("a", 0.9, vec![1.0, 0.0]);
        inactive.active = false;
        store.bulk_upsert(vec![inactive, seed_with_embedding("b", 0.9, vec![1.0, 0.0])]);

        assert!(store.search_similar(&[1.0, 0.0], "a", 5, 0.0).is_empty());
        assert_eq!(store.search_similar(&[1.0, 0.0], "b", 5, 0.0).len(), 1);
    }
}
