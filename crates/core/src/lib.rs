//! codecairn-core: a continuously-refreshed semantic index over a codebase.
//!
//! The pipeline is Merkle-tree change detection (`hash`, `scan`, `diff`) →
//! syntax-aware chunking (`chunk`) → content-addressed embedding (`embedder`,
//! `store::EmbedCache`) → hybrid retrieval (`searcher`) backed by a LanceDB
//! store (`store::ChunkStore`), orchestrated by `indexer::Indexer` and
//! exposed to consumers through `tool_surface::ToolSurface`.

pub mod chunk;
pub mod config;
pub mod diff;
pub mod embedder;
pub mod error;
pub mod hash;
pub mod indexer;
pub mod manifest;
pub mod scan;
pub mod searcher;
pub mod staleness;
pub mod store;
pub mod tool_surface;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use tool_surface::{SearchMode, ToolError, ToolResult, ToolSurface};
