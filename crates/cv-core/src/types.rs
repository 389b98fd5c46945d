use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Languages ──

/// The closed set of languages the engine parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Rust,
    Go,
    Java,
}

impl Language {
    /// Detect a language from a file extension (without leading dot).
    ///
    /// Returns `None` for extensions outside the closed mapping.
    pub fn from_extension(ext: &str) -> Option<Language> {
        match ext {
            "ts" | "tsx" | "mts" | "cts" => Some(Language::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "py" | "pyw" | "pyi" => Some(Language::Python),
            "rs" => Some(Language::Rust),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    /// Extension candidates tried when resolving an import of this language
    /// to a file inside the working tree.
    pub fn import_suffixes(&self) -> &'static [&'static str] {
        match self {
            Language::TypeScript | Language::JavaScript => &[
                "", ".ts", ".tsx", ".js", ".jsx", "/index.ts", "/index.js",
            ],
            Language::Python => &["", ".py", "/__init__.py"],
            Language::Rust => &["", ".rs", "/mod.rs"],
            Language::Go => &["", ".go"],
            Language::Java => &["", ".java"],
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
        };
        write!(f, "{s}")
    }
}

// ── Symbols ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Struct,
    Enum,
    Trait,
    Type,
    Variable,
    Property,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Trait => "trait",
            Self::Type => "type",
            Self::Variable => "variable",
            Self::Property => "property",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "function" => Ok(Self::Function),
            "method" => Ok(Self::Method),
            "class" => Ok(Self::Class),
            "interface" => Ok(Self::Interface),
            "struct" => Ok(Self::Struct),
            "enum" => Ok(Self::Enum),
            "trait" => Ok(Self::Trait),
            "type" => Ok(Self::Type),
            "variable" => Ok(Self::Variable),
            "property" => Ok(Self::Property),
            other => Err(format!("unknown SymbolKind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "protected" => Ok(Self::Protected),
            "private" => Ok(Self::Private),
            other => Err(format!("unknown Visibility: {other}")),
        }
    }
}

/// One formal parameter, with the declared type when the language has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
}

/// A call site inside a symbol body, before cross-file resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSite {
    /// Callee short name: identifier, method name, or the final segment
    /// of a scoped name.
    pub callee: String,
    pub line: u32,
    /// True when the call sits under a branch/try ancestor within the
    /// enclosing symbol.
    pub is_conditional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRecord {
    /// Primary key within a repo: `<file>:<name>`, or
    /// `<file>:<owner>.<name>` for members.
    pub qualified_name: String,
    pub name: String,
    pub kind: SymbolKind,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    pub visibility: Visibility,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub is_static: bool,
    /// Cyclomatic count: 1 plus the branching constructs in the symbol's
    /// subtree. The exact construct set is documented per parser.
    pub complexity: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<CallSite>,
}

impl SymbolRecord {
    /// Build the file-qualified primary key.
    pub fn qualify(file: &str, owner: Option<&str>, name: &str) -> String {
        match owner {
            Some(owner) => format!("{file}:{owner}.{name}"),
            None => format!("{file}:{name}"),
        }
    }
}

// ── Imports / exports ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportStyle {
    Default,
    Named,
    Namespace,
    SideEffect,
}

impl std::fmt::Display for ImportStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::Named => "named",
            Self::Namespace => "namespace",
            Self::SideEffect => "side-effect",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    /// The raw module specifier as written in the source.
    pub source: String,
    /// Bound names; empty for wildcard/namespace imports.
    #[serde(default)]
    pub imported_symbols: Vec<String>,
    pub style: ImportStyle,
    /// Best-guess: does the specifier point outside the working tree?
    pub is_external: bool,
    pub line: u32,
}

// ── Chunks ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Code,
    Docstring,
    Commit,
    Requirement,
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Code => "code",
            Self::Docstring => "docstring",
            Self::Commit => "commit",
            Self::Requirement => "requirement",
        };
        write!(f, "{s}")
    }
}

/// A (file, line-range) span of source treated as one unit for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub kind: ChunkKind,
}

impl Chunk {
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.file, self.start_line, self.end_line)
    }
}

// ── Parser output ──

/// Uniform output schema shared by every language parser.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub path: String,
    pub language: Option<Language>,
    pub content: String,
    pub symbols: Vec<SymbolRecord>,
    pub imports: Vec<ImportRecord>,
    pub exports: Vec<String>,
    pub chunks: Vec<Chunk>,
}

// ── File nodes ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Repo-relative path; primary key within a repo.
    pub path: String,
    pub language: String,
    pub size: u64,
    /// Git blob hash; empty for untracked files.
    pub hash: String,
    /// ISO-8601 timestamp.
    pub last_modified: String,
    pub loc: u32,
    pub complexity: u32,
}

// ── Sync state ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Enumerate,
    Parse,
    GraphWrite,
    VectorWrite,
    Export,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Enumerate => "Enumerate",
            Self::Parse => "Parse",
            Self::GraphWrite => "GraphWrite",
            Self::VectorWrite => "VectorWrite",
            Self::Export => "Export",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub file: String,
    pub message: String,
}

/// Per-repo scratch record persisted to `.cv/sync_state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_full_sync: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_incremental_sync: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_synced: Option<String>,
    #[serde(default)]
    pub files: usize,
    #[serde(default)]
    pub symbols: usize,
    #[serde(default)]
    pub relationships: usize,
    #[serde(default)]
    pub vectors: usize,
    /// Per-language file counts.
    #[serde(default)]
    pub languages: BTreeMap<String, usize>,
    #[serde(default)]
    pub duration_ms: u64,
    /// Non-fatal errors from the last sync pass.
    #[serde(default)]
    pub errors: Vec<SyncError>,
}

/// Live graph counts, read back after writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub files: usize,
    pub symbols: usize,
    pub relationships: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_detection_is_closed() {
        assert_eq!(Language::from_extension("ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("cjs"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("pyi"), Some(Language::Python));
        assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
        assert_eq!(Language::from_extension("lua"), None);
    }

    #[test]
    fn qualified_name_forms() {
        assert_eq!(
            SymbolRecord::qualify("src/a.ts", None, "foo"),
            "src/a.ts:foo"
        );
        assert_eq!(
            SymbolRecord::qualify("src/a.ts", Some("Widget"), "render"),
            "src/a.ts:Widget.render"
        );
    }

    #[test]
    fn chunk_id_is_path_and_span() {
        let chunk = Chunk {
            file: "src/a.ts".into(),
            start_line: 3,
            end_line: 9,
            text: String::new(),
            symbol: None,
            kind: ChunkKind::Code,
        };
        assert_eq!(chunk.id(), "src/a.ts:3:9");
    }

    #[test]
    fn import_style_serializes_kebab_case() {
        let json = serde_json::to_string(&ImportStyle::SideEffect).unwrap();
        assert_eq!(json, "\"side-effect\"");
    }
}
