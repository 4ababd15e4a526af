//! StalenessOracle (C11): tells a caller whether the index still matches
//! the filesystem, using the same scan/diff machinery as the Indexer but
//! never writing anything back.

use crate::config::Config;
use crate::diff::diff_trees;
use crate::error::CoreResult;
use crate::manifest::Manifest;
use crate::scan::scan_tree;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct StaleStatus {
    pub is_stale: bool,
    pub stale_files: Vec<String>,
    pub message: String,
}

const STALE_FILES_CAP: usize = 20;

pub fn check_stale(project_root: &Path, state_dir: &Path, config: &Config) -> CoreResult<StaleStatus> {
    let manifest = Manifest::load(state_dir)?;
    let prior_tree = manifest.as_ref().and_then(|m| m.tree.clone());

    if prior_tree.is_none() {
        return Ok(StaleStatus {
            is_stale: true,
            stale_files: Vec::new(),
            message: "no index present".to_string(),
        });
    }

    let forest = scan_tree(project_root, &config.extensions, &config.exclude_patterns, prior_tree.as_ref())?;

    let prior_hash = prior_tree.as_ref().map(|n| *n.hash());
    let current_hash = forest.root.as_ref().map(|n| *n.hash());
    if prior_hash == current_hash {
        return Ok(StaleStatus {
            is_stale: false,
            stale_files: Vec::new(),
            message: "index is fresh".to_string(),
        });
    }

    let diff = diff_trees(prior_tree.as_ref(), forest.root.as_ref());
    let mut stale_files: Vec<String> = diff
        .deleted
        .iter()
        .chain(diff.new.iter())
        .chain(diff.modified.iter())
        .cloned()
        .collect();
    stale_files.sort();
    stale_files.dedup();
    let total = stale_files.len();
    stale_files.truncate(STALE_FILES_CAP);

    Ok(StaleStatus {
        is_stale: true,
        message: format!("{total} file(s) changed since the last index"),
        stale_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn no_manifest_is_stale() {
        let project = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let status = check_stale(project.path(), state.path(), &Config::default()).unwrap();
        assert!(status.is_stale);
    }

    #[test]
    fn unchanged_tree_is_fresh() {
        let project = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        write(project.path(), "a.rs", "fn a() {}");
        let config = Config::default();
        let forest = scan_tree(project.path(), &config.extensions, &config.exclude_patterns, None).unwrap();
        let mut manifest = Manifest::new();
        manifest.tree = forest.root;
        manifest.save(state.path()).unwrap();

        let status = check_stale(project.path(), state.path(), &config).unwrap();
        assert!(!status.is_stale);
    }

    #[test]
    fn changed_file_is_reported_stale() {
        let project = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        write(project.path(), "a.rs", "fn a() {}");
        let config = Config::default();
        let forest = scan_tree(project.path(), &config.extensions, &config.exclude_patterns, None).unwrap();
        let mut manifest = Manifest::new();
        manifest.tree = forest.root;
        manifest.save(state.path()).unwrap();

        write(project.path(), "a.rs", "fn a() { 1 }");
        let status = check_stale(project.path(), state.path(), &config).unwrap();
        assert!(status.is_stale);
        assert_eq!(status.stale_files, vec!["a.rs".to_string()]);
    }
}
