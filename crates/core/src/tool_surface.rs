//! ToolSurface (C12): the single transport-independent boundary consumed by
//! both the CLI and the MCP binary. Every method returns a `ToolResult`
//! instead of propagating `CoreError` directly — the teacher's MCP dispatch
//! convention ("never isError:true, wrap caught errors into a structured
//! result") generalized to a transport-agnostic type, so neither consumer
//! has to reimplement error-wrapping.

use crate::chunk::ChunkKind;
use crate::config::Config;
use crate::embedder::{create_embedder, Embedder};
use crate::error::CoreError;
use crate::indexer::{IndexStats, Indexer};
use crate::manifest::Manifest;
use crate::searcher::{SearchResults, Searcher};
use crate::staleness::{check_stale, StaleStatus};
use crate::store::ChunkStore;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const STATE_DIR_NAME: &str = ".codecairn";

#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for ToolError {}

pub type ToolResult<T> = Result<T, ToolError>;

impl From<CoreError> for ToolError {
    fn from(e: CoreError) -> Self {
        let kind = match &e {
            CoreError::NotInitialized(_) => "not_initialized",
            CoreError::ConfigInvalid(_) => "config_invalid",
            CoreError::EmbedderUnavailable(_) => "embedder_unavailable",
            CoreError::StoreError(_) => "store_error",
            CoreError::QueryInvalid(_) => "query_invalid",
            CoreError::NoIndex => "no_index",
            CoreError::ScanError(_) => "scan_error",
        };
        ToolError {
            kind: kind.to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Hybrid,
    Vector,
    Bm25,
    Fuzzy,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    #[serde(flatten)]
    pub results: SearchResults,
    pub stale_warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexOutcome {
    pub stats: IndexStats,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileContext {
    pub filepath: String,
    pub chunks: Vec<crate::store::StoredChunk>,
    pub related_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub total_files: u64,
    pub total_chunks: u64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub filepath: String,
    pub chunk_count: usize,
    pub kinds: Vec<String>,
}

pub struct ToolSurface {
    project_root: PathBuf,
    state_dir: PathBuf,
    config: Config,
    embedder: Arc<dyn Embedder>,
}

impl ToolSurface {
    /// Loads config (falling back to defaults) and builds an embedder, but
    /// never touches `<project_root>/.codecairn` on disk — every other
    /// operation checks `state_dir` for existence before opening the store,
    /// so a project that was never indexed surfaces `NotInitialized` instead
    /// of silently materializing an empty one.
    pub fn open(project_root: &Path) -> ToolResult<Self> {
        let state_dir = project_root.join(STATE_DIR_NAME);
        let config = Config::load(&state_dir)?;
        let embedder = create_embedder(&config)?;
        Ok(ToolSurface {
            project_root: project_root.to_path_buf(),
            state_dir,
            config,
            embedder,
        })
    }

    fn require_initialized(&self) -> ToolResult<()> {
        if self.state_dir.exists() {
            Ok(())
        } else {
            Err(CoreError::NotInitialized(self.state_dir.clone()).into())
        }
    }

    fn open_store(&self) -> ToolResult<Arc<ChunkStore>> {
        self.require_initialized()?;
        Ok(Arc::new(ChunkStore::open(
            &self.state_dir.join("lancedb"),
            self.config.embedding_dimensions,
        )?))
    }

    fn open_searcher(&self) -> ToolResult<Searcher> {
        let store = self.open_store()?;
        Ok(Searcher::new(store, self.embedder.clone(), &self.config))
    }

    pub fn search(&self, query: &str, top_k: usize, mode: SearchMode, bm25_weight: f64) -> ToolResult<SearchOutcome> {
        let searcher = self.open_searcher()?;
        let (fuzzy, weight) = match mode {
            SearchMode::Hybrid => (false, bm25_weight.clamp(0.0001, 0.9999)),
            SearchMode::Vector => (false, 0.0),
            SearchMode::Bm25 => (false, 1.0),
            SearchMode::Fuzzy => (true, bm25_weight),
        };
        let results = searcher.search(query, top_k, fuzzy, weight)?;
        let stale_warning = self.stale_warning();
        Ok(SearchOutcome { results, stale_warning })
    }

    pub fn fuzzy_find(&self, symbol_name: &str, symbol_type: Option<ChunkKind>) -> ToolResult<SearchResults> {
        let searcher = self.open_searcher()?;
        let mut results = searcher.fuzzy_search(symbol_name, 20)?;
        if let Some(kind) = symbol_type {
            let kind_str = kind_str(kind);
            results.retain(|r| r.kind == kind_str);
        }
        results.truncate(10);
        Ok(SearchResults {
            results,
            query: symbol_name.to_string(),
            search_type: "fuzzy".to_string(),
            elapsed_ms: 0.0,
        })
    }

    /// The one operation exempt from `require_initialized`: it is what
    /// creates `.codecairn` in the first place.
    pub fn index(&self, force: bool) -> ToolResult<IndexOutcome> {
        let indexer = Indexer::new(&self.project_root, &self.state_dir, self.config.clone(), self.embedder.clone())?;
        let stats = indexer.index(force, None)?;
        let message = if stats.files_new + stats.files_modified + stats.files_deleted == 0 {
            "index is up to date".to_string()
        } else {
            format!(
                "indexed {} new, {} modified, {} deleted file(s); {} chunk(s) added",
                stats.files_new, stats.files_modified, stats.files_deleted, stats.chunks_added
            )
        };
        Ok(IndexOutcome { stats, message })
    }

    pub fn get_file_context(&self, filepath: &str, include_related: bool) -> ToolResult<FileContext> {
        let store = self.open_store()?;
        let chunks = store.get_by_path(filepath)?;
        let related_files = if include_related {
            let filename = Path::new(filepath)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let mut seen = BTreeSet::new();
            for (chunk, _score) in store.fts_search("text", &filename, 20) {
                if chunk.filepath != filepath {
                    seen.insert(chunk.filepath);
                }
            }
            seen.into_iter().collect()
        } else {
            Vec::new()
        };
        Ok(FileContext {
            filepath: filepath.to_string(),
            chunks,
            related_files,
        })
    }

    pub fn get_stale_status(&self) -> ToolResult<StaleStatus> {
        self.require_initialized()?;
        Ok(check_stale(&self.project_root, &self.state_dir, &self.config)?)
    }

    pub fn status(&self) -> ToolResult<StatusView> {
        let store = self.open_store()?;
        let manifest = Manifest::load(&self.state_dir)?;
        Ok(StatusView {
            total_files: manifest.as_ref().map(|m| m.stats.total_files).unwrap_or(0),
            total_chunks: store.count()?,
            created_at: manifest.as_ref().map(|m| m.created_at),
            updated_at: manifest.as_ref().map(|m| m.updated_at),
        })
    }

    pub fn config(&self) -> ToolResult<Config> {
        self.require_initialized()?;
        Ok(self.config.clone())
    }

    pub fn files(&self) -> ToolResult<Vec<FileSummary>> {
        let store = self.open_store()?;
        let paths = store.all_paths()?;
        let mut out = Vec::with_capacity(paths.len());
        for filepath in paths {
            let chunks = store.get_by_path(&filepath)?;
            let kinds: BTreeSet<String> = chunks.iter().map(|c| kind_str(c.kind).to_string()).collect();
            out.push(FileSummary {
                chunk_count: chunks.len(),
                kinds: kinds.into_iter().collect(),
                filepath,
            });
        }
        Ok(out)
    }

    fn stale_warning(&self) -> Option<String> {
        match check_stale(&self.project_root, &self.state_dir, &self.config) {
            Ok(status) if status.is_stale => Some(status.message),
            _ => None,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn open_with_fake_embedder(project_root: &Path) -> ToolSurface {
        let state_dir = project_root.join(STATE_DIR_NAME);
        let mut config = Config::default();
        config.embedding_dimensions = 8;
        config.save(&state_dir).unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(crate::embedder::FakeEmbedder::new(8));
        ToolSurface {
            project_root: project_root.to_path_buf(),
            state_dir,
            config,
            embedder,
        }
    }

    fn uninitialized_with_fake_embedder(project_root: &Path) -> ToolSurface {
        let state_dir = project_root.join(STATE_DIR_NAME);
        let mut config = Config::default();
        config.embedding_dimensions = 8;
        let embedder: Arc<dyn Embedder> = Arc::new(crate::embedder::FakeEmbedder::new(8));
        ToolSurface {
            project_root: project_root.to_path_buf(),
            state_dir,
            config,
            embedder,
        }
    }

    #[test]
    fn index_then_status_reports_counts() {
        let project = tempfile::tempdir().unwrap();
        write(project.path(), "a.rs", "fn a() {}\n");
        let surface = open_with_fake_embedder(project.path());
        let outcome = surface.index(false).unwrap();
        assert_eq!(outcome.stats.files_new, 1);
        let status = surface.status().unwrap();
        assert_eq!(status.total_files, 1);
        assert_eq!(status.total_chunks, 1);
    }

    #[test]
    fn search_on_empty_index_surfaces_no_index_error() {
        let project = tempfile::tempdir().unwrap();
        let surface = open_with_fake_embedder(project.path());
        let result = surface.search("foo", 10, SearchMode::Hybrid, 0.5);
        assert_eq!(result.unwrap_err().kind, "no_index");
    }

    #[test]
    fn file_context_returns_all_chunks_for_path() {
        let project = tempfile::tempdir().unwrap();
        write(project.path(), "a.rs", "fn a() {}\nfn b() {}\n");
        let surface = open_with_fake_embedder(project.path());
        surface.index(false).unwrap();
        let context = surface.get_file_context("a.rs", false).unwrap();
        assert_eq!(context.chunks.len(), 2);
        assert!(context.related_files.is_empty());
    }

    #[test]
    fn files_lists_distinct_paths_with_kinds() {
        let project = tempfile::tempdir().unwrap();
        write(project.path(), "a.rs", "struct S;\nimpl S {\n    fn m(&self) {}\n}\n");
        let surface = open_with_fake_embedder(project.path());
        surface.index(false).unwrap();
        let files = surface.files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filepath, "a.rs");
        assert!(files[0].kinds.contains(&"class".to_string()));
        assert!(files[0].kinds.contains(&"method".to_string()));
    }

    #[test]
    fn stale_status_reflects_filesystem_changes() {
        let project = tempfile::tempdir().unwrap();
        write(project.path(), "a.rs", "fn a() {}\n");
        let surface = open_with_fake_embedder(project.path());
        surface.index(false).unwrap();
        assert!(!surface.get_stale_status().unwrap().is_stale);

        write(project.path(), "a.rs", "fn a() { 1 }\n");
        assert!(surface.get_stale_status().unwrap().is_stale);
    }

    #[test]
    fn operations_before_index_surface_not_initialized() {
        let project = tempfile::tempdir().unwrap();
        let surface = uninitialized_with_fake_embedder(project.path());
        assert_eq!(surface.status().unwrap_err().kind, "not_initialized");
        assert_eq!(surface.config().unwrap_err().kind, "not_initialized");
        assert_eq!(surface.get_stale_status().unwrap_err().kind, "not_initialized");
        assert_eq!(
            surface.search("foo", 10, SearchMode::Hybrid, 0.5).unwrap_err().kind,
            "not_initialized"
        );
    }

    #[test]
    fn index_initializes_state_dir_for_later_calls() {
        let project = tempfile::tempdir().unwrap();
        write(project.path(), "a.rs", "fn a() {}\n");
        let surface = uninitialized_with_fake_embedder(project.path());
        surface.index(false).unwrap();
        let status = surface.status().unwrap();
        assert_eq!(status.total_files, 1);
    }
}
