//! Language parsers.
//!
//! Each parser walks a tree-sitter CST and produces the uniform
//! [`ParsedFile`] schema: symbols (with embedded call sites), imports,
//! exports, and one code chunk per named symbol. Parsers are stateless and
//! shared behind `Arc` by the registry.

pub mod go;
pub mod java;
pub mod python;
pub mod registry;
pub mod rust;
pub mod typescript;

pub use registry::ParserRegistry;

use tree_sitter::Node;

use cv_core::{Chunk, ChunkKind, Error, Language, ParsedFile, Result, SymbolRecord};

/// Trait implemented by each language-specific parser.
pub trait LanguageParser: Send + Sync {
    fn language(&self) -> Language;

    /// File extensions this parser handles (without leading dot).
    fn extensions(&self) -> &[&str];

    /// Parse a source file into the uniform schema.
    fn parse(&self, path: &str, source: &str) -> Result<ParsedFile>;
}

/// Detect a language from the path's extension.
///
/// Unknown extensions are refused with a typed error.
pub fn detect_language(path: &str) -> Result<Language> {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| Error::UnsupportedLanguage(format!("{path}: no extension")))?;

    Language::from_extension(ext).ok_or_else(|| Error::UnsupportedLanguage(ext.to_string()))
}

// ── Shared helpers (free functions, used by every parser) ──

pub(crate) fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-based start line.
pub(crate) fn start_line(node: &Node) -> u32 {
    node.start_position().row as u32 + 1
}

/// 1-based end line.
pub(crate) fn end_line(node: &Node) -> u32 {
    node.end_position().row as u32 + 1
}

/// The declaration's header text: everything up to the first `{` or `;`,
/// collapsed to a single line.
pub(crate) fn signature_text(node: &Node, source: &str) -> Option<String> {
    let text = node_text(node, source);
    let cut = text.find(['{', ';']).unwrap_or(text.len());
    let header = text[..cut].split_whitespace().collect::<Vec<_>>().join(" ");
    if header.is_empty() {
        None
    } else {
        Some(header)
    }
}

/// Count branching constructs in the node's subtree. Cyclomatic complexity
/// is 1 plus this count; the construct set is declared by each parser.
pub(crate) fn count_branches(node: &Node, kinds: &[&str]) -> u32 {
    let mut count = 0;
    let mut cursor = node.walk();
    let mut reached_root = false;
    while !reached_root {
        if kinds.contains(&cursor.node().kind()) {
            count += 1;
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                reached_root = true;
                break;
            }
        }
    }
    count
}

/// True when `node` has an ancestor of one of `kinds` strictly inside the
/// enclosing symbol node.
pub(crate) fn has_conditional_ancestor(node: &Node, symbol: &Node, kinds: &[&str]) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.id() == symbol.id() {
            return false;
        }
        if kinds.contains(&parent.kind()) {
            return true;
        }
        current = parent.parent();
    }
    false
}

/// Produce one chunk per named symbol: the symbol's full source span.
pub(crate) fn chunks_from_symbols(
    path: &str,
    source: &str,
    symbols: &[SymbolRecord],
) -> Vec<Chunk> {
    let lines: Vec<&str> = source.lines().collect();
    symbols
        .iter()
        .filter(|sym| !sym.name.is_empty())
        .filter_map(|sym| {
            let start = sym.start_line.saturating_sub(1) as usize;
            let end = (sym.end_line as usize).min(lines.len());
            if start >= end {
                return None;
            }
            Some(Chunk {
                file: path.to_string(),
                start_line: sym.start_line,
                end_line: sym.end_line,
                text: lines[start..end].join("\n"),
                symbol: Some(sym.qualified_name.clone()),
                kind: ChunkKind::Code,
            })
        })
        .collect()
}

/// Collect a run of preceding comment siblings of the given CST kind,
/// stripping each line's `prefix`. Shared by the `//`-style languages.
pub(crate) fn leading_comments(
    node: &Node,
    source: &str,
    comment_kind: &str,
    prefixes: &[&str],
) -> Option<String> {
    let mut comments = Vec::new();
    let mut sibling = node.prev_sibling();

    while let Some(prev) = sibling {
        if prev.kind() != comment_kind {
            break;
        }
        let text = node_text(&prev, source).trim();
        let stripped = prefixes
            .iter()
            .find_map(|p| text.strip_prefix(p))
            .unwrap_or(text)
            .trim_start();
        comments.push(stripped.to_string());
        sibling = prev.prev_sibling();
    }

    if comments.is_empty() {
        None
    } else {
        comments.reverse();
        Some(comments.join("\n"))
    }
}

/// Strip `/** … */` delimiters and leading `*` gutters from a block
/// doc comment.
pub(crate) fn clean_block_comment(text: &str) -> Option<String> {
    let inner = text
        .trim()
        .strip_prefix("/**")
        .or_else(|| text.trim().strip_prefix("/*"))?
        .strip_suffix("*/")?;

    let cleaned = inner
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_comment_gutter_is_stripped() {
        let doc = clean_block_comment("/**\n * Adds two numbers.\n * @param a left\n */");
        assert_eq!(doc.as_deref(), Some("Adds two numbers.\n@param a left"));
        assert_eq!(clean_block_comment("// not a block"), None);
    }

    #[test]
    fn unknown_extension_is_refused() {
        let err = detect_language("README.md").unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(_)));
        assert!(detect_language("Makefile").is_err());
    }

    #[test]
    fn known_extensions_map() {
        assert_eq!(detect_language("src/a.tsx").unwrap(), Language::TypeScript);
        assert_eq!(detect_language("pkg/m.go").unwrap(), Language::Go);
        assert_eq!(detect_language("App.java").unwrap(), Language::Java);
    }
}
