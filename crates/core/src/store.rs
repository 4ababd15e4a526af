//! ChunkStore (C7) and EmbedCache (C5): the LanceDB-backed persistent
//! state. Both tables live under the same `lancedb/` directory inside the
//! project's state directory.
//!
//! LanceDB's Rust client is async-only; the spec describes a synchronous,
//! single-writer component, so each public method blocks on a shared
//! current-thread-friendly multi-thread runtime rather than exposing
//! `async fn` up through Indexer/Searcher (see SPEC_FULL.md §9).

use crate::chunk::{Chunk, ChunkKind};
use crate::error::{CoreError, CoreResult};
use arrow_array::{
    Array, ArrayRef, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const CHUNKS_TABLE: &str = "code_chunks";
const CACHE_TABLE: &str = "embedding_cache";

fn runtime() -> &'static tokio::runtime::Runtime {
    static RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RT.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("failed to start storage runtime")
    })
}

fn store_err(e: impl std::fmt::Display) -> CoreError {
    CoreError::StoreError(e.to_string())
}

fn escape(s: &str) -> String {
    s.replace('\'', "''")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub content_hash: String,
    pub filepath: String,
    pub filename: String,
    pub extension: String,
    pub kind: ChunkKind,
    pub name: String,
    pub start_line: i32,
    pub end_line: i32,
    pub file_hash: String,
}

impl StoredChunk {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>, filepath: &str, file_hash: &str) -> Self {
        let filename = Path::new(filepath)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = Path::new(filepath)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        StoredChunk {
            id: format!("{filepath}:{}", chunk.start_line),
            vector,
            text: chunk.text.clone(),
            content_hash: chunk.content_hash(),
            filepath: filepath.to_string(),
            filename,
            extension,
            kind: chunk.kind,
            name: chunk.name.clone(),
            start_line: chunk.start_line as i32,
            end_line: chunk.end_line as i32,
            file_hash: file_hash.to_string(),
        }
    }
}

fn kind_str(kind: ChunkKind) -> &'static str {
    match kind {
        ChunkKind::Function => "function",
        ChunkKind::Class => "class",
        ChunkKind::Method => "method",
        ChunkKind::Module => "module",
    }
}

fn kind_from_str(s: &str) -> ChunkKind {
    match s {
        "class" => ChunkKind::Class,
        "method" => ChunkKind::Method,
        "module" => ChunkKind::Module,
        _ => ChunkKind::Function,
    }
}

fn chunks_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("filepath", DataType::Utf8, false),
        Field::new("filename", DataType::Utf8, false),
        Field::new("extension", DataType::Utf8, false),
        Field::new("type", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("start_line", DataType::Int32, false),
        Field::new("end_line", DataType::Int32, false),
        Field::new("file_hash", DataType::Utf8, false),
    ]))
}

fn vector_array(vectors: &[Vec<f32>], dim: i32) -> CoreResult<ArrayRef> {
    let mut flat = Vec::with_capacity(vectors.len() * dim as usize);
    for v in vectors {
        if v.len() != dim as usize {
            return Err(store_err("embedding dimension mismatch"));
        }
        flat.extend_from_slice(v);
    }
    let values: ArrayRef = Arc::new(Float32Array::from(flat));
    let item_field = Arc::new(Field::new("item", DataType::Float32, true));
    Ok(Arc::new(
        arrow_array::FixedSizeListArray::try_new(item_field, dim, values, None)
            .map_err(store_err)?,
    ))
}

fn chunks_to_batch(chunks: &[StoredChunk], dim: i32) -> CoreResult<RecordBatch> {
    let schema = chunks_schema(dim);
    let ids: ArrayRef = Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| &c.id)));
    let vectors: Vec<Vec<f32>> = chunks.iter().map(|c| c.vector.clone()).collect();
    let vector_col = vector_array(&vectors, dim)?;
    let text: ArrayRef = Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| &c.text)));
    let content_hash: ArrayRef =
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| &c.content_hash)));
    let filepath: ArrayRef =
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| &c.filepath)));
    let filename: ArrayRef =
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| &c.filename)));
    let extension: ArrayRef =
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| &c.extension)));
    let kind: ArrayRef =
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| kind_str(c.kind))));
    let name: ArrayRef = Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| &c.name)));
    let start_line: ArrayRef =
        Arc::new(Int32Array::from_iter_values(chunks.iter().map(|c| c.start_line)));
    let end_line: ArrayRef =
        Arc::new(Int32Array::from_iter_values(chunks.iter().map(|c| c.end_line)));
    let file_hash: ArrayRef =
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| &c.file_hash)));

    RecordBatch::try_new(
        schema.clone(),
        vec![
            ids, vector_col, text, content_hash, filepath, filename, extension, kind, name,
            start_line, end_line, file_hash,
        ],
    )
    .map_err(store_err)
}

fn batch_to_chunks(batch: &RecordBatch, distance_col: Option<&str>) -> Vec<(StoredChunk, Option<f32>)> {
    let col = |name: &str| -> Option<&ArrayRef> {
        batch.schema().index_of(name).ok().map(|i| batch.column(i))
    };
    let get_str = |arr: &ArrayRef, i: usize| -> String {
        arr.as_any()
            .downcast_ref::<StringArray>()
            .map(|a| a.value(i).to_string())
            .unwrap_or_default()
    };
    let get_i32 = |arr: &ArrayRef, i: usize| -> i32 {
        arr.as_any().downcast_ref::<Int32Array>().map(|a| a.value(i)).unwrap_or(0)
    };

    let id_col = col("id");
    let text_col = col("text");
    let content_hash_col = col("content_hash");
    let filepath_col = col("filepath");
    let filename_col = col("filename");
    let extension_col = col("extension");
    let kind_col = col("type");
    let name_col = col("name");
    let start_col = col("start_line");
    let end_col = col("end_line");
    let file_hash_col = col("file_hash");
    let dist_col = distance_col.and_then(col);

    let n = batch.num_rows();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let chunk = StoredChunk {
            id: id_col.map(|c| get_str(c, i)).unwrap_or_default(),
            vector: Vec::new(),
            text: text_col.map(|c| get_str(c, i)).unwrap_or_default(),
            content_hash: content_hash_col.map(|c| get_str(c, i)).unwrap_or_default(),
            filepath: filepath_col.map(|c| get_str(c, i)).unwrap_or_default(),
            filename: filename_col.map(|c| get_str(c, i)).unwrap_or_default(),
            extension: extension_col.map(|c| get_str(c, i)).unwrap_or_default(),
            kind: kind_col.map(|c| kind_from_str(&get_str(c, i))).unwrap_or(ChunkKind::Module),
            name: name_col.map(|c| get_str(c, i)).unwrap_or_default(),
            start_line: start_col.map(|c| get_i32(c, i)).unwrap_or(0),
            end_line: end_col.map(|c| get_i32(c, i)).unwrap_or(0),
            file_hash: file_hash_col.map(|c| get_str(c, i)).unwrap_or_default(),
        };
        let distance = dist_col.and_then(|c| {
            c.as_any()
                .downcast_ref::<Float32Array>()
                .map(|a| a.value(i))
                .or_else(|| {
                    c.as_any()
                        .downcast_ref::<arrow_array::Float64Array>()
                        .map(|a| a.value(i) as f32)
                })
        });
        out.push((chunk, distance));
    }
    out
}

pub struct ChunkStore {
    conn: lancedb::Connection,
    dim: i32,
    text_fts_ready: std::sync::atomic::AtomicBool,
    name_fts_ready: std::sync::atomic::AtomicBool,
}

impl ChunkStore {
    pub fn open(lancedb_dir: &Path, dimensions: usize) -> CoreResult<Self> {
        std::fs::create_dir_all(lancedb_dir).map_err(store_err)?;
        let conn = runtime()
            .block_on(lancedb::connect(&lancedb_dir.to_string_lossy()).execute())
            .map_err(store_err)?;
        Ok(ChunkStore {
            conn,
            dim: dimensions as i32,
            text_fts_ready: std::sync::atomic::AtomicBool::new(false),
            name_fts_ready: std::sync::atomic::AtomicBool::new(false),
        })
    }

    async fn table(&self) -> Option<lancedb::Table> {
        self.conn.open_table(CHUNKS_TABLE).execute().await.ok()
    }

    pub fn upsert_many(&self, chunks: &[StoredChunk]) -> CoreResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        runtime().block_on(async {
            let table = match self.table().await {
                Some(t) => t,
                None => {
                    let batch = chunks_to_batch(chunks, self.dim)?;
                    let schema = batch.schema();
                    let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
                    self.conn
                        .create_table(CHUNKS_TABLE, Box::new(reader))
                        .execute()
                        .await
                        .map_err(store_err)?;
                    return Ok(());
                }
            };
            let ids: Vec<String> = chunks.iter().map(|c| format!("'{}'", escape(&c.id))).collect();
            let filter = format!("id IN ({})", ids.join(", "));
            if let Err(e) = table.delete(&filter).await {
                debug!(error = %e, "pre-upsert delete matched no rows");
            }
            let batch = chunks_to_batch(chunks, self.dim)?;
            let schema = batch.schema();
            let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
            table.add(Box::new(reader)).execute().await.map_err(store_err)?;
            Ok(())
        })
    }

    pub fn delete_by_path(&self, path: &str) -> CoreResult<()> {
        self.delete_by_paths(&[path.to_string()])
    }

    pub fn delete_by_paths(&self, paths: &[String]) -> CoreResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        runtime().block_on(async {
            let Some(table) = self.table().await else {
                return Ok(());
            };
            let list: Vec<String> = paths.iter().map(|p| format!("'{}'", escape(p))).collect();
            let filter = format!("filepath IN ({})", list.join(", "));
            table.delete(&filter).await.map_err(store_err)
        })
    }

    pub fn get_by_path(&self, path: &str) -> CoreResult<Vec<StoredChunk>> {
        runtime().block_on(async {
            let Some(table) = self.table().await else {
                return Ok(Vec::new());
            };
            let filter = format!("filepath = '{}'", escape(path));
            let mut stream = table
                .query()
                .only_if(filter)
                .execute()
                .await
                .map_err(store_err)?;
            let mut rows = Vec::new();
            while let Some(batch) = stream.try_next().await.map_err(store_err)? {
                rows.extend(batch_to_chunks(&batch, None).into_iter().map(|(c, _)| c));
            }
            rows.sort_by_key(|c| c.start_line);
            Ok(rows)
        })
    }

    pub fn all_paths(&self) -> CoreResult<BTreeSet<String>> {
        runtime().block_on(async {
            let Some(table) = self.table().await else {
                return Ok(BTreeSet::new());
            };
            let mut stream = table
                .query()
                .select(lancedb::query::Select::columns(&["filepath"]))
                .execute()
                .await
                .map_err(store_err)?;
            let mut paths = BTreeSet::new();
            while let Some(batch) = stream.try_next().await.map_err(store_err)? {
                if let Some(col) = batch.column_by_name("filepath") {
                    if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
                        for i in 0..arr.len() {
                            paths.insert(arr.value(i).to_string());
                        }
                    }
                }
            }
            Ok(paths)
        })
    }

    pub fn count(&self) -> CoreResult<u64> {
        runtime().block_on(async {
            match self.table().await {
                Some(t) => t.count_rows(None).await.map(|n| n as u64).map_err(store_err),
                None => Ok(0),
            }
        })
    }

    /// Vector similarity search. Returns rows with a cosine/L2 distance
    /// (metric must match embedder output) mapped to similarity by the
    /// caller.
    pub fn vector_search(&self, query: &[f32], k: usize) -> CoreResult<Vec<(StoredChunk, f32)>> {
        runtime().block_on(async {
            let Some(table) = self.table().await else {
                return Ok(Vec::new());
            };
            let mut stream = table
                .vector_search(query.to_vec())
                .map_err(store_err)?
                .limit(k)
                .execute()
                .await
                .map_err(store_err)?;
            let mut out = Vec::new();
            while let Some(batch) = stream.try_next().await.map_err(store_err)? {
                for (chunk, dist) in batch_to_chunks(&batch, Some("_distance")) {
                    out.push((chunk, dist.unwrap_or(0.0)));
                }
            }
            Ok(out)
        })
    }

    fn ensure_fts_index(&self, column: &str) -> CoreResult<()> {
        let ready = if column == "text" {
            &self.text_fts_ready
        } else {
            &self.name_fts_ready
        };
        if ready.load(std::sync::atomic::Ordering::Relaxed) {
            return Ok(());
        }
        runtime().block_on(async {
            if let Some(table) = self.table().await {
                // Idempotent: an already-existing index is not an error.
                if let Err(e) = table
                    .create_index(&[column], lancedb::index::Index::FTS(Default::default()))
                    .execute()
                    .await
                {
                    debug!(column, error = %e, "fts index creation was a no-op");
                }
            }
        });
        ready.store(true, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// BM25-style full-text search over `column` ("text" or "name").
    /// Returns an empty result set on any query error (pure punctuation,
    /// tokenizer rejection) rather than propagating it.
    pub fn fts_search(&self, column: &str, query: &str, k: usize) -> Vec<(StoredChunk, f32)> {
        if self.ensure_fts_index(column).is_err() {
            return Vec::new();
        }
        let result = runtime().block_on(async {
            let table = self.table().await?;
            let mut stream = table
                .query()
                .full_text_search(lancedb::query::FullTextSearchQuery::new(query.to_string()))
                .limit(k)
                .execute()
                .await
                .ok()?;
            let mut out = Vec::new();
            while let Ok(Some(batch)) = stream.try_next().await {
                for (chunk, score) in batch_to_chunks(&batch, Some("_score")) {
                    out.push((chunk, score.unwrap_or(0.0)));
                }
            }
            Some(out)
        });
        result.unwrap_or_default()
    }

    /// Stream `(id, name)` pairs for every stored chunk with a non-empty
    /// name, for fuzzy matching.
    pub fn all_names(&self) -> CoreResult<Vec<(String, String)>> {
        runtime().block_on(async {
            let Some(table) = self.table().await else {
                return Ok(Vec::new());
            };
            let mut stream = table
                .query()
                .select(lancedb::query::Select::columns(&["id", "name"]))
                .execute()
                .await
                .map_err(store_err)?;
            let mut out = Vec::new();
            while let Some(batch) = stream.try_next().await.map_err(store_err)? {
                let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>().cloned());
                let names = batch.column_by_name("name").and_then(|c| c.as_any().downcast_ref::<StringArray>().cloned());
                if let (Some(ids), Some(names)) = (ids, names) {
                    for i in 0..ids.len() {
                        let name = names.value(i).to_string();
                        if !name.is_empty() {
                            out.push((ids.value(i).to_string(), name));
                        }
                    }
                }
            }
            Ok(out)
        })
    }

    /// Drops the chunk table but preserves the embedding cache — the
    /// asymmetry documented in SPEC_FULL.md §9.
    pub fn clear(&self) -> CoreResult<()> {
        runtime().block_on(async {
            if let Err(e) = self.conn.drop_table(CHUNKS_TABLE).await {
                debug!(error = %e, "clear: chunk table did not exist");
            } else {
                warn!("chunk table dropped; embedding cache retained");
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content_hash: String,
    pub vector: Vec<f32>,
    pub created_at: String,
}

pub struct EmbedCache {
    conn: lancedb::Connection,
    dim: i32,
}

fn cache_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("content_hash", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            false,
        ),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn cache_to_batch(entries: &[CacheEntry], dim: i32) -> CoreResult<RecordBatch> {
    let schema = cache_schema(dim);
    let hashes: ArrayRef =
        Arc::new(StringArray::from_iter_values(entries.iter().map(|e| &e.content_hash)));
    let vectors: Vec<Vec<f32>> = entries.iter().map(|e| e.vector.clone()).collect();
    let vector_col = vector_array(&vectors, dim)?;
    let created: ArrayRef =
        Arc::new(StringArray::from_iter_values(entries.iter().map(|e| &e.created_at)));
    RecordBatch::try_new(schema.clone(), vec![hashes, vector_col, created]).map_err(store_err)
}

impl EmbedCache {
    pub fn open(lancedb_dir: &Path, dimensions: usize) -> CoreResult<Self> {
        std::fs::create_dir_all(lancedb_dir).map_err(store_err)?;
        let conn = runtime()
            .block_on(lancedb::connect(&lancedb_dir.to_string_lossy()).execute())
            .map_err(store_err)?;
        Ok(EmbedCache {
            conn,
            dim: dimensions as i32,
        })
    }

    async fn table(&self) -> Option<lancedb::Table> {
        self.conn.open_table(CACHE_TABLE).execute().await.ok()
    }

    /// Returns every hit; misses are simply absent from the map.
    pub fn get_many(&self, hashes: &[String]) -> CoreResult<HashMap<String, Vec<f32>>> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        runtime().block_on(async {
            let Some(table) = self.table().await else {
                return Ok(HashMap::new());
            };
            let list: Vec<String> = hashes.iter().map(|h| format!("'{}'", escape(h))).collect();
            let filter = format!("content_hash IN ({})", list.join(", "));
            let mut stream = table
                .query()
                .only_if(filter)
                .execute()
                .await
                .map_err(store_err)?;
            let mut out = HashMap::new();
            while let Some(batch) = stream.try_next().await.map_err(store_err)? {
                let hash_col = batch
                    .column_by_name("content_hash")
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>().cloned());
                let vec_col = batch
                    .column_by_name("vector")
                    .and_then(|c| c.as_any().downcast_ref::<arrow_array::FixedSizeListArray>().cloned());
                if let (Some(hash_col), Some(vec_col)) = (hash_col, vec_col) {
                    for i in 0..hash_col.len() {
                        if let Some(values) = vec_col.value(i).as_any().downcast_ref::<Float32Array>() {
                            out.insert(hash_col.value(i).to_string(), values.values().to_vec());
                        }
                    }
                }
            }
            Ok(out)
        })
    }

    /// Insert-or-replace by hash (delete-then-add upsert).
    pub fn put_many(&self, entries: &[CacheEntry]) -> CoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        runtime().block_on(async {
            let table = match self.table().await {
                Some(t) => t,
                None => {
                    let batch = cache_to_batch(entries, self.dim)?;
                    let schema = batch.schema();
                    let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
                    self.conn
                        .create_table(CACHE_TABLE, Box::new(reader))
                        .execute()
                        .await
                        .map_err(store_err)?;
                    return Ok(());
                }
            };
            let list: Vec<String> = entries
                .iter()
                .map(|e| format!("'{}'", escape(&e.content_hash)))
                .collect();
            let filter = format!("content_hash IN ({})", list.join(", "));
            let _ = table.delete(&filter).await;
            let batch = cache_to_batch(entries, self.dim)?;
            let schema = batch.schema();
            let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
            table.add(Box::new(reader)).execute().await.map_err(store_err)?;
            Ok(())
        })
    }

    pub fn count(&self) -> CoreResult<u64> {
        runtime().block_on(async {
            match self.table().await {
                Some(t) => t.count_rows(None).await.map(|n| n as u64).map_err(store_err),
                None => Ok(0),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;

    fn sample_chunk(path: &str, line: u32, text: &str) -> StoredChunk {
        let chunk = Chunk {
            text: text.to_string(),
            kind: ChunkKind::Function,
            name: "foo".to_string(),
            start_line: line,
            end_line: line + 1,
        };
        StoredChunk::from_chunk(&chunk, vec![0.1, 0.2, 0.3], path, "deadbeef")
    }

    #[test]
    fn upsert_then_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(dir.path(), 3).unwrap();
        store.upsert_many(&[sample_chunk("a.rs", 1, "fn foo() {}")]).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn upsert_same_rows_is_idempotent_on_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(dir.path(), 3).unwrap();
        let chunks = vec![sample_chunk("a.rs", 1, "fn foo() {}")];
        store.upsert_many(&chunks).unwrap();
        store.upsert_many(&chunks).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn delete_by_path_removes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(dir.path(), 3).unwrap();
        store.upsert_many(&[sample_chunk("a.rs", 1, "fn foo() {}")]).unwrap();
        store.delete_by_path("a.rs").unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn all_paths_reflects_store_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(dir.path(), 3).unwrap();
        store.upsert_many(&[sample_chunk("a.rs", 1, "fn a() {}")]).unwrap();
        store.upsert_many(&[sample_chunk("b.rs", 1, "fn b() {}")]).unwrap();
        let paths = store.all_paths().unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn clear_drops_chunks_not_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::open(dir.path(), 3).unwrap();
        let cache = EmbedCache::open(dir.path(), 3).unwrap();
        store.upsert_many(&[sample_chunk("a.rs", 1, "fn a() {}")]).unwrap();
        cache
            .put_many(&[CacheEntry {
                content_hash: "h1".into(),
                vector: vec![0.1, 0.2, 0.3],
                created_at: "2026-01-01T00:00:00Z".into(),
            }])
            .unwrap();
        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(cache.count().unwrap(), 1);
    }

    #[test]
    fn cache_get_many_returns_only_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbedCache::open(dir.path(), 3).unwrap();
        cache
            .put_many(&[CacheEntry {
                content_hash: "h1".into(),
                vector: vec![1.0, 0.0, 0.0],
                created_at: "2026-01-01T00:00:00Z".into(),
            }])
            .unwrap();
        let found = cache.get_many(&["h1".to_string(), "missing".to_string()]).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("h1"));
    }
}
