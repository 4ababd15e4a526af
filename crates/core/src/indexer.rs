//! Indexer (C8): orchestrates scan → diff → chunk → embed → store, in the
//! exact sequence the original pipeline used — manifest written last, so a
//! crash mid-run never leaves a manifest claiming work that never landed in
//! the store.

use crate::chunk::{chunk_file, Chunk};
use crate::config::Config;
use crate::diff::diff_trees;
use crate::embedder::Embedder;
use crate::error::CoreResult;
use crate::hash::hex_lower;
use crate::manifest::Manifest;
use crate::scan::{scan_tree, Node};
use crate::store::{CacheEntry, ChunkStore, EmbedCache, StoredChunk};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct IndexStats {
    pub files_scanned: u64,
    pub files_new: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub chunks_added: usize,
    pub chunks_deleted: usize,
    pub embeddings_computed: usize,
    pub embeddings_cached: usize,
}

/// Output of the parallel read+chunk pre-pass for one new/modified file.
struct PreparedFile {
    filepath: String,
    file_hash: String,
    chunks: Vec<Chunk>,
}

/// Holds `index.lock` exclusive for the lifetime of one `index()` call; the
/// OS releases the advisory lock when `file` closes on drop.
struct IndexLock {
    #[allow(dead_code)]
    file: std::fs::File,
}

pub struct Indexer {
    project_root: std::path::PathBuf,
    state_dir: std::path::PathBuf,
    config: Config,
    embedder: Arc<dyn Embedder>,
    store: ChunkStore,
    cache: EmbedCache,
}

impl Indexer {
    pub fn new(
        project_root: &Path,
        state_dir: &Path,
        config: Config,
        embedder: Arc<dyn Embedder>,
    ) -> CoreResult<Self> {
        let lancedb_dir = state_dir.join("lancedb");
        let store = ChunkStore::open(&lancedb_dir, config.embedding_dimensions)?;
        let cache = EmbedCache::open(&lancedb_dir, config.embedding_dimensions)?;
        Ok(Indexer {
            project_root: project_root.to_path_buf(),
            state_dir: state_dir.to_path_buf(),
            config,
            embedder,
            store,
            cache,
        })
    }

    /// `progress_callback`, when given, is invoked as `(current, total, stage)`
    /// once before each new/modified file is processed (`stage = "indexing"`)
    /// and once more after the batch completes (`stage = "complete"`), mirroring
    /// the original's `ProgressCallback` contract.
    pub fn index(
        &self,
        force: bool,
        progress_callback: Option<&dyn Fn(usize, usize, &str)>,
    ) -> CoreResult<IndexStats> {
        let _lock = self.acquire_lock()?;
        let mut stats = IndexStats::default();

        let previous_manifest = Manifest::load(&self.state_dir)?;
        let prior_tree = previous_manifest.as_ref().and_then(|m| m.tree.clone());

        let forest = scan_tree(
            &self.project_root,
            &self.config.extensions,
            &self.config.exclude_patterns,
            if force { None } else { prior_tree.as_ref() },
        )?;

        if force {
            self.store.clear()?;
        }

        let diff = if force || prior_tree.is_none() {
            let mut diff = crate::diff::TreeDiff::default();
            if let Some(root) = &forest.root {
                collect_all(root, &mut diff.new);
            }
            diff
        } else {
            diff_trees(prior_tree.as_ref(), forest.root.as_ref())
        };

        stats.files_scanned = count_files(forest.root.as_ref());
        stats.files_new = diff.new.len();
        stats.files_modified = diff.modified.len();
        stats.files_deleted = diff.deleted.len();

        if !diff.has_changes() {
            self.write_manifest(forest.root, &mut stats)?;
            return Ok(stats);
        }

        if !diff.deleted.is_empty() {
            self.store.delete_by_paths(&diff.deleted)?;
            stats.chunks_deleted = diff.deleted.len();
        }

        let file_hashes = file_hash_index(forest.root.as_ref());
        let files_to_process: Vec<&String> = diff.new.iter().chain(diff.modified.iter()).collect();
        let total_files = files_to_process.len();

        // Reading and chunking is pure CPU/IO work with no shared mutable
        // state, so it parallelizes across files; the embed-cache lookup and
        // ChunkStore writes that follow stay on the Indexer's own thread,
        // serialized one file at a time (per SPEC_FULL.md §5).
        let prepared: Vec<Option<PreparedFile>> = files_to_process
            .par_iter()
            .map(|filepath| self.read_and_chunk(filepath, &file_hashes))
            .collect();

        for (i, prepared) in prepared.into_iter().enumerate() {
            if let Some(cb) = progress_callback {
                cb(i, total_files, "indexing");
            }
            let Some(prepared) = prepared else { continue };
            let (added, computed, cached) = self.embed_and_store(prepared)?;
            stats.chunks_added += added;
            stats.embeddings_computed += computed;
            stats.embeddings_cached += cached;
        }
        if let Some(cb) = progress_callback {
            cb(total_files, total_files, "complete");
        }

        self.write_manifest(forest.root, &mut stats)?;
        info!(
            new = stats.files_new,
            modified = stats.files_modified,
            deleted = stats.files_deleted,
            chunks_added = stats.chunks_added,
            embeddings_computed = stats.embeddings_computed,
            "index run complete"
        );
        Ok(stats)
    }

    /// Read and chunk a single file. Pure function of the filesystem (no
    /// store/cache access), safe to run from any thread.
    fn read_and_chunk(
        &self,
        filepath: &str,
        file_hashes: &std::collections::HashMap<String, String>,
    ) -> Option<PreparedFile> {
        let abs_path = self.project_root.join(filepath);
        let content = match std::fs::read_to_string(&abs_path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = filepath, error = %e, "skipping file, read failed");
                return None;
            }
        };
        let file_hash = file_hashes.get(filepath)?.clone();

        let extension = Path::new(filepath)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let stem = Path::new(filepath)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let chunks = chunk_file(&extension, &stem, &content);

        Some(PreparedFile {
            filepath: filepath.to_string(),
            file_hash,
            chunks,
        })
    }

    fn embed_and_store(&self, prepared: PreparedFile) -> CoreResult<(usize, usize, usize)> {
        let PreparedFile { filepath, file_hash, chunks } = prepared;
        let filepath = filepath.as_str();
        let file_hash = file_hash.as_str();

        self.store.delete_by_path(filepath)?;

        let hashes: Vec<String> = chunks.iter().map(|c| c.content_hash()).collect();
        let found = self.cache.get_many(&hashes)?;

        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());
        let mut computed_count = 0;
        for hash in &hashes {
            if let Some(v) = found.get(hash) {
                vectors.push(Some(v.clone()));
            } else {
                vectors.push(None);
                computed_count += 1;
            }
        }
        let cached_count = chunks.len() - computed_count;

        debug!(path = filepath, chunks = chunks.len(), cached = cached_count, "chunked file");

        if computed_count > 0 {
            let texts: Vec<String> = chunks
                .iter()
                .zip(vectors.iter())
                .filter(|(_, v)| v.is_none())
                .map(|(c, _)| c.text.clone())
                .collect();
            let computed = self.embedder.embed(&texts)?;
            let mut computed_iter = computed.into_iter();
            let mut cache_entries = Vec::new();
            for (i, v) in vectors.iter_mut().enumerate() {
                if v.is_none() {
                    let vector = computed_iter.next().unwrap_or_default();
                    cache_entries.push(CacheEntry {
                        content_hash: hashes[i].clone(),
                        vector: vector.clone(),
                        created_at: chrono::Utc::now().to_rfc3339(),
                    });
                    *v = Some(vector);
                }
            }
            self.cache.put_many(&cache_entries)?;
        }

        let stored: Vec<StoredChunk> = chunks
            .iter()
            .zip(vectors.into_iter())
            .map(|(chunk, vector)| {
                StoredChunk::from_chunk(chunk, vector.unwrap_or_default(), filepath, file_hash)
            })
            .collect();
        let count = stored.len();
        self.store.upsert_many(&stored)?;

        Ok((count, computed_count, cached_count))
    }

    /// Advisory exclusion against a second concurrent `index()` on the same
    /// project, per SPEC_FULL.md §5 — one writer at a time, enforced via
    /// `<state_dir>/index.lock`. Released when the returned guard drops.
    fn acquire_lock(&self) -> CoreResult<IndexLock> {
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| crate::error::CoreError::StoreError(format!("creating {}: {e}", self.state_dir.display())))?;
        let path = self.state_dir.join("index.lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| crate::error::CoreError::StoreError(format!("opening {}: {e}", path.display())))?;
        fs2::FileExt::try_lock_exclusive(&file).map_err(|_| {
            crate::error::CoreError::StoreError(
                "another index() is already running for this project (index.lock held)".into(),
            )
        })?;
        Ok(IndexLock { file })
    }

    fn write_manifest(&self, tree: Option<Node>, stats: &mut IndexStats) -> CoreResult<()> {
        let mut manifest = Manifest::load(&self.state_dir)?.unwrap_or_default();
        manifest.tree = tree;
        manifest.stats.total_files = stats.files_scanned;
        manifest.stats.total_chunks = self.store.count()?;
        manifest.save(&self.state_dir)
    }
}

fn collect_all(node: &Node, out: &mut Vec<String>) {
    match node {
        Node::File(f) => out.push(f.path.clone()),
        Node::Dir(d) => {
            for child in d.children.values() {
                collect_all(child, out);
            }
        }
    }
}

fn count_files(node: Option<&Node>) -> u64 {
    fn visit(node: &Node, count: &mut u64) {
        match node {
            Node::File(_) => *count += 1,
            Node::Dir(d) => {
                for child in d.children.values() {
                    visit(child, count);
                }
            }
        }
    }
    let mut count = 0;
    if let Some(node) = node {
        visit(node, &mut count);
    }
    count
}

fn file_hash_index(node: Option<&Node>) -> std::collections::HashMap<String, String> {
    fn visit(node: &Node, out: &mut std::collections::HashMap<String, String>) {
        match node {
            Node::File(f) => {
                out.insert(f.path.clone(), hex_lower(&f.hash));
            }
            Node::Dir(d) => {
                for child in d.children.values() {
                    visit(child, out);
                }
            }
        }
    }
    let mut out = std::collections::HashMap::new();
    if let Some(node) = node {
        visit(node, &mut out);
    }
    out
}
