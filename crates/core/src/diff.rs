//! TreeDiff (C3): compute {new, modified, deleted} path sets between two
//! Merkle forests by recursive descent, short-circuiting on hash equality.

use crate::scan::Node;
use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct TreeDiff {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl TreeDiff {
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.new.len() + self.modified.len() + self.deleted.len()
    }
}

/// Collect every file path under `node` into `out`, used when an entire
/// subtree is new or deleted.
fn collect_all_files(node: &Node, out: &mut Vec<String>) {
    match node {
        Node::File(f) => out.push(f.path.clone()),
        Node::Dir(d) => {
            for child in d.children.values() {
                collect_all_files(child, out);
            }
        }
    }
}

pub fn diff_trees(old: Option<&Node>, new: Option<&Node>) -> TreeDiff {
    let mut diff = TreeDiff::default();
    compare_nodes(old, new, &mut diff);
    diff
}

fn compare_nodes(old: Option<&Node>, new: Option<&Node>, diff: &mut TreeDiff) {
    match (old, new) {
        (None, None) => {}
        (None, Some(n)) => collect_all_files(n, &mut diff.new),
        (Some(o), None) => collect_all_files(o, &mut diff.deleted),
        (Some(o), Some(n)) => {
            if o.hash() == n.hash() {
                return;
            }
            match (o, n) {
                (Node::File(_), Node::File(f)) => diff.modified.push(f.path.clone()),
                (Node::File(_), Node::Dir(_)) => {
                    collect_all_files(o, &mut diff.deleted);
                    collect_all_files(n, &mut diff.new);
                }
                (Node::Dir(_), Node::File(_)) => {
                    collect_all_files(o, &mut diff.deleted);
                    collect_all_files(n, &mut diff.new);
                }
                (Node::Dir(od), Node::Dir(nd)) => {
                    let mut names: std::collections::BTreeSet<&String> = od.children.keys().collect();
                    names.extend(nd.children.keys());
                    for name in names {
                        compare_nodes(od.children.get(name), nd.children.get(name), diff);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan_tree;
    use std::path::Path;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn identical_trees_diff_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.rs", "fn a() {}");
        let forest = scan_tree(dir.path(), &[".rs".into()], &[], None).unwrap();
        let diff = diff_trees(forest.root.as_ref(), forest.root.as_ref());
        assert!(!diff.has_changes());
    }

    #[test]
    fn new_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.rs", "fn a() {}");
        let before = scan_tree(dir.path(), &[".rs".into()], &[], None).unwrap();
        write(dir.path(), "b.rs", "fn b() {}");
        let after = scan_tree(dir.path(), &[".rs".into()], &[], None).unwrap();
        let diff = diff_trees(before.root.as_ref(), after.root.as_ref());
        assert_eq!(diff.new, vec!["b.rs".to_string()]);
        assert!(diff.modified.is_empty());
        assert!(diff.deleted.is_empty());
    }

    #[test]
    fn modified_file_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.rs", "fn a() {}");
        write(dir.path(), "b.rs", "fn b() {}");
        let before = scan_tree(dir.path(), &[".rs".into()], &[], None).unwrap();
        write(dir.path(), "a.rs", "fn a() { 1 }");
        let after = scan_tree(dir.path(), &[".rs".into()], &[], None).unwrap();
        let diff = diff_trees(before.root.as_ref(), after.root.as_ref());
        assert_eq!(diff.modified, vec!["a.rs".to_string()]);
        assert!(diff.new.is_empty());
        assert!(diff.deleted.is_empty());
    }

    #[test]
    fn deleted_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.rs", "fn a() {}");
        write(dir.path(), "b.rs", "fn b() {}");
        let before = scan_tree(dir.path(), &[".rs".into()], &[], None).unwrap();
        std::fs::remove_file(dir.path().join("a.rs")).unwrap();
        let after = scan_tree(dir.path(), &[".rs".into()], &[], None).unwrap();
        let diff = diff_trees(before.root.as_ref(), after.root.as_ref());
        assert_eq!(diff.deleted, vec!["a.rs".to_string()]);
    }

    #[test]
    fn unchanged_subtree_is_not_visited_twice() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.rs", "fn a() {}");
        write(dir.path(), "src/b.rs", "fn b() {}");
        let before = scan_tree(dir.path(), &[".rs".into()], &[], None).unwrap();
        write(dir.path(), "other.rs", "fn other() {}");
        let after = scan_tree(dir.path(), &[".rs".into()], &[], None).unwrap();
        let diff = diff_trees(before.root.as_ref(), after.root.as_ref());
        assert_eq!(diff.new, vec!["other.rs".to_string()]);
    }
}
