//! Searcher (C9): hybrid vector + BM25 + fuzzy retrieval, fused with
//! Reciprocal Rank Fusion. Mode selection and the RRF constant (k=60) follow
//! the system this crate generalizes exactly; `bm25_weight` only switches
//! modes at its 0.0/1.0 endpoints and is otherwise unused inside RRF itself,
//! matching that behavior rather than inventing a weighted blend.

use crate::config::Config;
use crate::embedder::Embedder;
use crate::error::{CoreError, CoreResult};
use crate::store::{ChunkStore, StoredChunk};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

const RRF_K: f64 = 60.0;
const FUZZY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub filepath: String,
    pub filename: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start_line: i32,
    pub end_line: i32,
    pub score: f64,
    pub vector_score: Option<f64>,
    pub fts_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub results: Vec<SearchResult>,
    pub query: String,
    pub search_type: String,
    pub elapsed_ms: f64,
}

impl SearchResult {
    fn from_chunk(chunk: StoredChunk, score: f64, vector_score: Option<f64>, fts_score: Option<f64>) -> Self {
        SearchResult {
            id: chunk.id,
            text: chunk.text,
            filepath: chunk.filepath,
            filename: chunk.filename,
            name: chunk.name,
            kind: kind_str(chunk.kind),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            score,
            vector_score,
            fts_score,
        }
    }
}

fn kind_str(kind: crate::chunk::ChunkKind) -> String {
    match kind {
        crate::chunk::ChunkKind::Function => "function",
        crate::chunk::ChunkKind::Class => "class",
        crate::chunk::ChunkKind::Method => "method",
        crate::chunk::ChunkKind::Module => "module",
    }
    .to_string()
}

pub struct Searcher {
    store: Arc<ChunkStore>,
    embedder: Arc<dyn Embedder>,
}

impl Searcher {
    pub fn new(store: Arc<ChunkStore>, embedder: Arc<dyn Embedder>, _config: &Config) -> Self {
        Searcher { store, embedder }
    }

    pub fn search(
        &self,
        query: &str,
        limit: usize,
        fuzzy: bool,
        bm25_weight: f64,
    ) -> CoreResult<SearchResults> {
        if query.trim().is_empty() {
            return Err(CoreError::QueryInvalid("query cannot be empty".into()));
        }
        if self.store.count()? == 0 {
            return Err(CoreError::NoIndex);
        }

        let start = std::time::Instant::now();
        let (results, search_type) = if fuzzy {
            (self.fuzzy_search(query, limit)?, "fuzzy")
        } else if bm25_weight <= 0.0 {
            (self.vector_search(query, limit)?, "vector")
        } else if bm25_weight >= 1.0 {
            (self.fts_search(query, limit), "fts")
        } else {
            (self.hybrid_search(query, limit)?, "hybrid")
        };
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(SearchResults {
            results,
            query: query.to_string(),
            search_type: search_type.to_string(),
            elapsed_ms,
        })
    }

    pub fn vector_search(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchResult>> {
        let query_vector = self.embedder.embed_one(query)?;
        let rows = self.store.vector_search(&query_vector, limit)?;
        Ok(rows
            .into_iter()
            .map(|(chunk, distance)| {
                let similarity = 1.0 / (1.0 + distance as f64);
                SearchResult::from_chunk(chunk, similarity, Some(similarity), None)
            })
            .collect())
    }

    pub fn fts_search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        self.store
            .fts_search("text", query, limit)
            .into_iter()
            .map(|(chunk, score)| {
                let score = score as f64;
                SearchResult::from_chunk(chunk, score, None, Some(score))
            })
            .collect()
    }

    /// SequenceMatcher-style Gestalt ratio on the `name` column: twice the
    /// length of matching blocks over the sum of both string lengths.
    /// No pack crate implements Ratcliff/Obershelp, so this is hand-rolled.
    pub fn fuzzy_search(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchResult>> {
        let names = self.store.all_names()?;
        let query_lower = query.to_lowercase();

        let mut scored: Vec<(String, f64)> = names
            .into_iter()
            .filter_map(|(id, name)| {
                let ratio = gestalt_ratio(&query_lower, &name.to_lowercase());
                (ratio > FUZZY_THRESHOLD).then_some((id, ratio))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        let mut out = Vec::with_capacity(scored.len());
        for (id, ratio) in scored {
            if let Some((filepath, start_line)) = id.rsplit_once(':') {
                let start_line: i32 = start_line.parse().unwrap_or(0);
                if let Some(chunk) = self
                    .store
                    .get_by_path(filepath)?
                    .into_iter()
                    .find(|c| c.start_line == start_line)
                {
                    out.push(SearchResult::from_chunk(chunk, ratio, None, Some(ratio)));
                }
            }
        }
        Ok(out)
    }

    pub fn hybrid_search(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchResult>> {
        let fetch_k = limit * 3;
        let vector_results = self.vector_search(query, fetch_k)?;
        let fts_results = self.fts_search(query, fetch_k);

        if vector_results.is_empty() && fts_results.is_empty() {
            return Ok(Vec::new());
        }
        if vector_results.is_empty() {
            return Ok(fts_results.into_iter().take(limit).collect());
        }
        if fts_results.is_empty() {
            return Ok(vector_results.into_iter().take(limit).collect());
        }

        Ok(rerank_rrf(vector_results, fts_results, limit))
    }
}

fn rerank_rrf(vector_results: Vec<SearchResult>, fts_results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut result_map: HashMap<String, SearchResult> = HashMap::new();
    let mut vector_scores: HashMap<String, f64> = HashMap::new();
    let mut fts_scores: HashMap<String, f64> = HashMap::new();

    for (rank, result) in vector_results.into_iter().enumerate() {
        let rank = rank as f64 + 1.0;
        *scores.entry(result.id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank);
        vector_scores.insert(result.id.clone(), result.vector_score.unwrap_or(0.0));
        result_map.insert(result.id.clone(), result);
    }

    for (rank, result) in fts_results.into_iter().enumerate() {
        let rank = rank as f64 + 1.0;
        *scores.entry(result.id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank);
        fts_scores.insert(result.id.clone(), result.fts_score.unwrap_or(0.0));
        result_map.entry(result.id.clone()).or_insert(result);
    }

    let mut ids: Vec<String> = scores.keys().cloned().collect();
    ids.sort_by(|a, b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));
    ids.truncate(limit);

    ids.into_iter()
        .filter_map(|id| {
            let result = result_map.remove(&id)?;
            Some(SearchResult {
                score: scores[&id],
                vector_score: vector_scores.get(&id).copied(),
                fts_score: fts_scores.get(&id).copied(),
                ..result
            })
        })
        .collect()
}

/// Ratcliff/Obershelp-style ratio: 2M / (|a| + |b|), where M is the total
/// length of matching blocks found by repeatedly taking the longest common
/// substring of the remaining unmatched regions.
fn gestalt_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let matches = matching_chars(&a, &b);
    2.0 * matches as f64 / (a.len() + b.len()) as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (len, (ai, bi)) = longest_common_substring(a, b);
    if len == 0 {
        return 0;
    }
    matching_chars(&a[..ai], &b[..bi]) + len + matching_chars(&a[ai + len..], &b[bi + len..])
}

fn longest_common_substring(a: &[char], b: &[char]) -> (usize, (usize, usize)) {
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    let mut best = (0usize, (0usize, 0usize));
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            if a[i - 1] == b[j - 1] {
                dp[i][j] = dp[i - 1][j - 1] + 1;
                if dp[i][j] > best.0 {
                    best = (dp[i][j], (i - dp[i][j], j - dp[i][j]));
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::FakeEmbedder;

    #[test]
    fn gestalt_ratio_identical_strings_is_one() {
        assert_eq!(gestalt_ratio("hello", "hello"), 1.0);
    }

    #[test]
    fn gestalt_ratio_empty_strings_is_one() {
        assert_eq!(gestalt_ratio("", ""), 1.0);
    }

    #[test]
    fn gestalt_ratio_disjoint_strings_is_zero() {
        assert_eq!(gestalt_ratio("abc", "xyz"), 0.0);
    }

    #[test]
    fn gestalt_ratio_partial_overlap_is_between_zero_and_one() {
        let ratio = gestalt_ratio("search_engine", "search_enjine");
        assert!(ratio > 0.5 && ratio < 1.0);
    }

    #[test]
    fn empty_query_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path(), 8).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(8));
        let searcher = Searcher::new(store, embedder, &Config::default());
        let result = searcher.search("   ", 10, false, 0.5);
        assert!(matches!(result, Err(CoreError::QueryInvalid(_))));
    }

    #[test]
    fn empty_index_yields_no_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path(), 8).unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(8));
        let searcher = Searcher::new(store, embedder, &Config::default());
        let result = searcher.search("foo", 10, false, 0.5);
        assert!(matches!(result, Err(CoreError::NoIndex)));
    }

    #[test]
    fn rrf_favors_results_ranked_highly_in_both_lists() {
        let chunk = |id: &str| SearchResult {
            id: id.to_string(),
            text: String::new(),
            filepath: String::new(),
            filename: String::new(),
            name: String::new(),
            kind: "function".to_string(),
            start_line: 1,
            end_line: 1,
            score: 0.0,
            vector_score: Some(0.9),
            fts_score: None,
        };
        let vector_results = vec![chunk("a"), chunk("b")];
        let mut fts_results = vec![chunk("b"), chunk("a")];
        for r in &mut fts_results {
            r.fts_score = Some(0.5);
        }
        let ranked = rerank_rrf(vector_results, fts_results, 2);
        assert_eq!(ranked.len(), 2);
        assert!((ranked[0].score - ranked[1].score).abs() < 1e-9);
    }
}
