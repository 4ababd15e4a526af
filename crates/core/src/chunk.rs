//! Chunker (C4): syntax-tree based semantic chunk extraction for Rust, with
//! a deterministic whole-file fallback for anything else.
//!
//! Extracted node kinds: `function_item` → Function (or Method if nested
//! directly inside an `impl` block), `struct_item`/`enum_item`/`trait_item`
//! → Class (the closest Rust analog to a named type that can own methods).
//! Methods are attached to their immediately enclosing `impl`'s type name,
//! regardless of deeper nesting.

use crate::hash::{hash_bytes, hex_lower};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Method,
    Module,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub text: String,
    pub kind: ChunkKind,
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl Chunk {
    pub fn content_hash(&self) -> String {
        hex_lower(&hash_bytes(self.text.as_bytes()))
    }
}

/// Extract chunks from `content`. `stem` is the file name without
/// extension, used as the fallback module chunk's name.
pub fn chunk_file(extension: &str, stem: &str, content: &str) -> Vec<Chunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    if extension == ".rs" {
        if let Some(chunks) = try_chunk_rust(content) {
            if !chunks.is_empty() {
                return chunks;
            }
            return vec![fallback_chunk(content, "")];
        }
    }

    vec![fallback_chunk(content, stem)]
}

#[cfg(feature = "treesitter")]
fn try_chunk_rust(content: &str) -> Option<Vec<Chunk>> {
    chunk_rust(content)
}

#[cfg(not(feature = "treesitter"))]
fn try_chunk_rust(_content: &str) -> Option<Vec<Chunk>> {
    None
}

fn fallback_chunk(content: &str, name: &str) -> Chunk {
    let line_count = content.lines().count().max(1) as u32;
    Chunk {
        text: content.to_string(),
        kind: ChunkKind::Module,
        name: name.to_string(),
        start_line: 1,
        end_line: line_count,
    }
}

#[cfg(feature = "treesitter")]
fn chunk_rust(content: &str) -> Option<Vec<Chunk>> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_rust::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(content, None)?;
    let bytes = content.as_bytes();
    let mut chunks = Vec::new();
    visit(tree.root_node(), bytes, None, &mut chunks);
    Some(chunks)
}

#[cfg(feature = "treesitter")]
fn node_text(node: tree_sitter::Node, bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[node.start_byte()..node.end_byte()]).to_string()
}

#[cfg(feature = "treesitter")]
fn identifier_name(node: tree_sitter::Node, bytes: &[u8]) -> String {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "identifier" || child.kind() == "type_identifier" {
            return node_text(child, bytes);
        }
    }
    String::new()
}

#[cfg(feature = "treesitter")]
fn visit(
    node: tree_sitter::Node,
    bytes: &[u8],
    enclosing_impl: Option<&str>,
    chunks: &mut Vec<Chunk>,
) {
    match node.kind() {
        "function_item" => {
            let name = identifier_name(node, bytes);
            let kind = if enclosing_impl.is_some() {
                ChunkKind::Method
            } else {
                ChunkKind::Function
            };
            chunks.push(Chunk {
                text: node_text(node, bytes),
                kind,
                name,
                start_line: node.start_position().row as u32 + 1,
                end_line: node.end_position().row as u32 + 1,
            });
            // Function bodies may contain nested fns; they do not change
            // the kind of their parent, so we do not recurse further here.
        }
        "struct_item" | "enum_item" | "trait_item" => {
            let name = identifier_name(node, bytes);
            chunks.push(Chunk {
                text: node_text(node, bytes),
                kind: ChunkKind::Class,
                name,
                start_line: node.start_position().row as u32 + 1,
                end_line: node.end_position().row as u32 + 1,
            });
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, bytes, enclosing_impl, chunks);
            }
        }
        "impl_item" => {
            let type_name = node
                .child_by_field_name("type")
                .map(|n| node_text(n, bytes))
                .unwrap_or_default();
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, bytes, Some(&type_name), chunks);
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, bytes, enclosing_impl, chunks);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_has_no_chunks() {
        assert!(chunk_file(".rs", "empty", "   \n  ").is_empty());
    }

    #[test]
    fn unsupported_extension_falls_back_to_module() {
        let chunks = chunk_file(".py", "script", "print('hi')\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Module);
        assert_eq!(chunks[0].name, "script");
    }

    #[test]
    fn top_level_function_is_a_function_chunk() {
        let src = "fn foo() -> i32 {\n    1\n}\n";
        let chunks = chunk_file(".rs", "a", src);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Function);
        assert_eq!(chunks[0].name, "foo");
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
    }

    #[test]
    fn struct_and_methods_are_class_and_method() {
        let src = "struct C;\n\nimpl C {\n    fn m(&self) {}\n}\n";
        let chunks = chunk_file(".rs", "a", src);
        let kinds: Vec<ChunkKind> = chunks.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&ChunkKind::Class));
        assert!(kinds.contains(&ChunkKind::Method));
        let method = chunks.iter().find(|c| c.kind == ChunkKind::Method).unwrap();
        assert_eq!(method.name, "m");
    }

    #[test]
    fn file_with_no_definitions_falls_back_to_module() {
        let src = "use std::fmt;\nconst X: i32 = 1;\n";
        let chunks = chunk_file(".rs", "consts", src);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Module);
    }

    #[test]
    fn content_hash_is_stable_for_identical_text() {
        let a = fallback_chunk("same text", "x");
        let b = fallback_chunk("same text", "y");
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn chunks_are_in_source_order() {
        let src = "fn a() {}\nfn b() {}\nfn c() {}\n";
        let chunks = chunk_file(".rs", "a", src);
        let names: Vec<&str> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
