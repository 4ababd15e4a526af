//! Content hashing for files and directories (C1).
//!
//! Directory hashes are a pure function of the (name, hash) multiset of
//! their children: children are fed in ascending name order with no
//! separator between name and hash, so any two implementations agree.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::scan::Node;

pub type Hash32 = [u8; 32];

const STREAM_BLOCK: usize = 8192;

/// Stream the file through SHA-256 in 8 KiB blocks.
pub fn hash_file(path: &Path) -> std::io::Result<Hash32> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; STREAM_BLOCK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// SHA-256 over `name ++ hex(child.hash)` for each child, in name order.
pub fn hash_dir(children: &BTreeMap<String, Node>) -> Hash32 {
    let mut hasher = Sha256::new();
    for (name, node) in children {
        hasher.update(name.as_bytes());
        hasher.update(hex_lower(node.hash()).as_bytes());
    }
    hasher.finalize().into()
}

pub fn hash_bytes(data: &[u8]) -> Hash32 {
    Sha256::digest(data).into()
}

pub fn hex_lower(hash: &Hash32) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hash_file_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let h1 = hash_file(&path).unwrap();
        let h2 = hash_file(&path).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_file_streams_large_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        let chunk = vec![0xABu8; STREAM_BLOCK * 4 + 17];
        f.write_all(&chunk).unwrap();
        drop(f);
        let streamed = hash_file(&path).unwrap();
        let direct = hash_bytes(&chunk);
        assert_eq!(streamed, direct);
    }

    #[test]
    fn hash_dir_is_order_independent_by_construction() {
        // BTreeMap already orders by key; insertion order must not matter.
        let mut a = BTreeMap::new();
        a.insert("b.txt".to_string(), Node::test_file([1u8; 32]));
        a.insert("a.txt".to_string(), Node::test_file([2u8; 32]));

        let mut b = BTreeMap::new();
        b.insert("a.txt".to_string(), Node::test_file([2u8; 32]));
        b.insert("b.txt".to_string(), Node::test_file([1u8; 32]));

        assert_eq!(hash_dir(&a), hash_dir(&b));
    }

    #[test]
    fn hash_dir_changes_when_child_hash_changes() {
        let mut a = BTreeMap::new();
        a.insert("a.txt".to_string(), Node::test_file([2u8; 32]));
        let mut b = BTreeMap::new();
        b.insert("a.txt".to_string(), Node::test_file([3u8; 32]));
        assert_ne!(hash_dir(&a), hash_dir(&b));
    }
}
