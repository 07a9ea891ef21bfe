// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Semantic Index
//!
//! A dependency-free side index that gives discovery a similarity signal
//! without an embedding service. Each tool gets a 100-dimensional unit
//! vector: coordinates 0..49 are binary presence of a fixed 50-word domain
//! lexicon in the lowercased `name + " " + description`, coordinates 50..99
//! are the first fifty bytes of the tool name scaled to [0, 1]. Similarity
//! is cosine similarity.
//!
//! Category tags fall out of the same lexicon; a tool matching no keyword
//! is tagged `general`.

use std::collections::HashMap;

use parking_lot::RwLock;

pub const VECTOR_DIM: usize = 100;
const LEXICON_DIM: usize = 50;

/// Fixed keyword lexicon; index = vector coordinate.
const LEXICON: [&str; LEXICON_DIM] = [
    "file", "read", "write", "delete", "directory", "path",
    "math", "add", "subtract", "multiply", "divide", "calculate",
    "network", "http", "request", "fetch", "url", "socket",
    "encrypt", "decrypt", "hash", "sign", "verify", "auth",
    "data", "json", "parse", "format", "convert", "transform",
    "text", "string", "search", "replace", "split",
    "system", "process", "execute", "shell", "command",
    "message", "send", "email", "notify",
    "database", "query", "store", "cache",
    "model", "embed",
];

/// Keyword-range → category tag, in priority order.
const CATEGORIES: [(std::ops::Range<usize>, &str); 9] = [
    (0..6, "file_management"),
    (6..12, "mathematics"),
    (12..18, "networking"),
    (18..24, "security"),
    (24..30, "data_processing"),
    (30..35, "text_processing"),
    (35..40, "system"),
    (40..44, "communication"),
    (44..48, "storage"),
];

#[derive(Debug, Clone)]
struct IndexedTool {
    vector: Vec<f32>,
    categories: Vec<String>,
}

#[derive(Default)]
struct IndexState {
    tools: HashMap<String, IndexedTool>,
    /// Top-match cache, invalidated wholesale on every index mutation.
    similar_cache: HashMap<String, Vec<(String, f32)>>,
}

/// Feature-vector index over registered tools.
#[derive(Default)]
pub struct SemanticIndex {
    state: RwLock<IndexState>,
}

/// Compute the raw (pre-normalization) feature vector for a tool.
fn featurize(name: &str, description: &str) -> Vec<f32> {
    let text = format!("{} {}", name, description).to_lowercase();
    let mut vector = vec![0.0f32; VECTOR_DIM];
    for (i, word) in LEXICON.iter().enumerate() {
        if text.contains(word) {
            vector[i] = 1.0;
        }
    }
    for (i, byte) in name.bytes().take(LEXICON_DIM).enumerate() {
        vector[LEXICON_DIM + i] = byte as f32 / 255.0;
    }
    vector
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two unit vectors (plain dot product once both are
/// normalized, but tolerant of non-unit inputs).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn categorize(name: &str, description: &str) -> Vec<String> {
    let text = format!("{} {}", name, description).to_lowercase();
    let mut categories: Vec<String> = CATEGORIES
        .iter()
        .filter(|(range, _)| LEXICON[range.clone()].iter().any(|w| text.contains(w)))
        .map(|(_, tag)| tag.to_string())
        .collect();
    if categories.is_empty() {
        categories.push("general".to_string());
    }
    categories
}

impl SemanticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or refresh a tool. Drops the whole similarity cache.
    pub fn index_tool(&self, name: &str, description: &str) {
        let mut vector = featurize(name, description);
        normalize(&mut vector);
        let categories = categorize(name, description);
        let mut state = self.state.write();
        state.tools.insert(name.to_string(), IndexedTool { vector, categories });
        state.similar_cache.clear();
    }

    pub fn remove_tool(&self, name: &str) {
        let mut state = self.state.write();
        state.tools.remove(name);
        state.similar_cache.clear();
    }

    pub fn categories_of(&self, name: &str) -> Vec<String> {
        self.state
            .read()
            .tools
            .get(name)
            .map(|t| t.categories.clone())
            .unwrap_or_default()
    }

    pub fn indexed_count(&self) -> usize {
        self.state.read().tools.len()
    }

    /// Top-ten tools most similar to `name`, above 0.3, cached until the
    /// next index mutation.
    pub fn find_similar_tools(&self, name: &str) -> Vec<(String, f32)> {
        {
            let state = self.state.read();
            if let Some(hit) = state.similar_cache.get(name) {
                return hit.clone();
            }
        }

        let mut state = self.state.write();
        let Some(target) = state.tools.get(name).map(|t| t.vector.clone()) else {
            return Vec::new();
        };
        let mut scored: Vec<(String, f32)> = state
            .tools
            .iter()
            .filter(|(other, _)| other.as_str() != name)
            .map(|(other, t)| (other.clone(), cosine_similarity(&target, &t.vector)))
            .filter(|(_, sim)| *sim > 0.3)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(10);
        state.similar_cache.insert(name.to_string(), scored.clone());
        scored
    }

    /// Score every indexed tool against a query by constructing a synthetic
    /// tool from the query's capability list and environment.
    pub fn score_query(&self, capabilities: &[String], environment: Option<&str>) -> Vec<(String, f32)> {
        let synthetic_name = capabilities.join(" ").replace('*', "");
        let synthetic_desc = environment.unwrap_or_default();
        let mut query_vector = featurize(&synthetic_name, synthetic_desc);
        normalize(&mut query_vector);

        let state = self.state.read();
        let mut scored: Vec<(String, f32)> = state
            .tools
            .iter()
            .map(|(name, t)| (name.clone(), cosine_similarity(&query_vector, &t.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_shape_and_normalization() {
        let mut v = featurize("math.add", "add two numbers");
        assert_eq!(v.len(), VECTOR_DIM);
        assert_eq!(v[6], 1.0); // "math"
        assert_eq!(v[7], 1.0); // "add"
        assert_eq!(v[0], 0.0); // no "file"
        normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_name_bytes_tail() {
        let v = featurize("ab", "");
        assert!((v[50] - b'a' as f32 / 255.0).abs() < 1e-6);
        assert!((v[51] - b'b' as f32 / 255.0).abs() < 1e-6);
        assert_eq!(v[52], 0.0);
    }

    #[test]
    fn test_categories() {
        let index = SemanticIndex::new();
        index.index_tool("file.read", "read a file from disk");
        index.index_tool("math.add", "add numbers");
        index.index_tool("frobnicate", "mystery operation");

        assert!(index.categories_of("file.read").contains(&"file_management".to_string()));
        assert!(index.categories_of("math.add").contains(&"mathematics".to_string()));
        assert_eq!(index.categories_of("frobnicate"), vec!["general".to_string()]);
    }

    #[test]
    fn test_similar_tools_threshold_and_cache() {
        let index = SemanticIndex::new();
        index.index_tool("math.add", "add two numbers");
        index.index_tool("math.subtract", "subtract two numbers");
        index.index_tool("file.read", "read a file");

        let similar = index.find_similar_tools("math.add");
        assert!(similar.iter().any(|(name, _)| name == "math.subtract"));
        assert!(similar.iter().all(|(_, sim)| *sim > 0.3));

        // Cached result is reused verbatim...
        let cached = index.find_similar_tools("math.add");
        assert_eq!(similar, cached);

        // ...until the next index mutation invalidates it.
        index.index_tool("math.multiply", "multiply two numbers");
        let refreshed = index.find_similar_tools("math.add");
        assert!(refreshed.iter().any(|(name, _)| name == "math.multiply"));
    }

    #[test]
    fn test_query_scoring_prefers_matching_domain() {
        let index = SemanticIndex::new();
        index.index_tool("math.add", "add two numbers");
        index.index_tool("file.read", "read a file");

        let scored = index.score_query(&["math.*".to_string()], None);
        assert_eq!(scored[0].0, "math.add");
        assert!(scored[0].1 > scored[1].1);
    }

    #[test]
    fn test_cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0; 4], &[1.0, 0.0, 0.0, 0.0]), 0.0);
    }
}
