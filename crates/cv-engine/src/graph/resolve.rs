//! Cross-file call resolution.
//!
//! Before CALLS edges are written, a per-sync index is built over every
//! symbol seen (plus, on incremental syncs, the symbols already in the live
//! graph). Resolution is best-effort: same-file first, then through the
//! file's local imports, then the global export table; unresolved calls are
//! dropped.

use std::collections::{HashMap, HashSet};

use cv_core::{ImportRecord, ImportStyle, Language, ParsedFile};

#[derive(Default)]
pub struct ResolutionIndex {
    /// `(filePath, shortName) → qualifiedName` for every symbol in scope.
    symbol_index: HashMap<(String, String), String>,
    /// `shortName → qualifiedName` for symbols named in their file's exports.
    exported_index: HashMap<String, String>,
    /// Every file path known to this sync, for import-path resolution.
    files: HashSet<String>,
    imports_by_file: HashMap<String, Vec<ImportRecord>>,
    languages: HashMap<String, Language>,
}

impl ResolutionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index everything a parsed file contributes.
    pub fn add_parsed_file(&mut self, file: &ParsedFile) {
        self.add_file(&file.path);
        if let Some(language) = file.language {
            self.languages.insert(file.path.clone(), language);
        }
        for sym in &file.symbols {
            self.add_symbol(&file.path, &sym.name, &sym.qualified_name);
            if file.exports.iter().any(|e| e == &sym.name) {
                self.exported_index
                    .insert(sym.name.clone(), sym.qualified_name.clone());
            }
        }
        self.imports_by_file
            .insert(file.path.clone(), file.imports.clone());
    }

    /// Register a file path without symbols (e.g. an unchanged file during
    /// an incremental sync).
    pub fn add_file(&mut self, path: &str) {
        self.files.insert(path.to_string());
    }

    /// Register a symbol from outside this parse pass (live-graph symbols
    /// during incremental syncs).
    pub fn add_symbol(&mut self, file: &str, short_name: &str, qualified_name: &str) {
        self.symbol_index.insert(
            (file.to_string(), short_name.to_string()),
            qualified_name.to_string(),
        );
    }

    /// Register an externally known export.
    pub fn add_export(&mut self, short_name: &str, qualified_name: &str) {
        self.exported_index
            .insert(short_name.to_string(), qualified_name.to_string());
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    /// Resolve a callee short name from within `current_file` to a
    /// qualified symbol name. `None` means the call is dropped.
    pub fn resolve_call(&self, current_file: &str, callee: &str) -> Option<String> {
        // 1. Same file.
        if let Some(qname) = self
            .symbol_index
            .get(&(current_file.to_string(), callee.to_string()))
        {
            return Some(qname.clone());
        }

        // 2. Through the file's local imports.
        if let Some(imports) = self.imports_by_file.get(current_file) {
            for import in imports.iter().filter(|i| !i.is_external) {
                if !import_grants(import, callee) {
                    continue;
                }
                let Some(target) = self.resolve_import(current_file, import) else {
                    continue;
                };
                if let Some(qname) = self.symbol_index.get(&(target, callee.to_string())) {
                    return Some(qname.clone());
                }
            }
        }

        // 3. Global exports.
        self.exported_index.get(callee).cloned()
    }

    /// Resolve an import specifier to a file path inside the working tree.
    pub fn resolve_import(&self, from_file: &str, import: &ImportRecord) -> Option<String> {
        let language = self.languages.get(from_file).copied()?;
        for candidate in import_candidates(from_file, &import.source, language) {
            if self.files.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Does this import make `callee` visible in the importing file?
fn import_grants(import: &ImportRecord, callee: &str) -> bool {
    match import.style {
        ImportStyle::Named | ImportStyle::Default => {
            import.imported_symbols.iter().any(|s| s == callee)
        }
        // A namespace import grants every member of the module.
        ImportStyle::Namespace => true,
        ImportStyle::SideEffect => false,
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        dir.to_string()
    } else {
        format!("{dir}/{rest}")
    }
}

/// Normalize `a/b/../c` and `./` segments.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Candidate file paths for an import specifier, tried in order against the
/// known-file set. Language-specific, best-effort.
fn import_candidates(from_file: &str, specifier: &str, language: Language) -> Vec<String> {
    let dir = parent_dir(from_file);
    let mut bases = Vec::new();

    match language {
        Language::TypeScript | Language::JavaScript => {
            if let Some(rooted) = specifier.strip_prefix('/') {
                bases.push(clean_path(rooted));
            } else if specifier.starts_with('.') {
                bases.push(clean_path(&join(dir, specifier)));
            }
        }
        Language::Python => {
            let dots = specifier.chars().take_while(|c| *c == '.').count();
            if dots > 0 {
                // `.m` is sibling, `..m` is one package up, and so on.
                let mut base_dir = dir.to_string();
                for _ in 1..dots {
                    base_dir = parent_dir(&base_dir).to_string();
                }
                let rest = specifier[dots..].replace('.', "/");
                bases.push(clean_path(&join(&base_dir, &rest)));
            } else {
                let rest = specifier.replace('.', "/");
                bases.push(clean_path(&join(dir, &rest)));
                bases.push(clean_path(&rest));
            }
        }
        Language::Rust => {
            if let Some(rest) = specifier.strip_prefix("crate::") {
                let rest = rest.replace("::", "/");
                bases.push(format!("src/{rest}"));
                bases.push(rest);
            } else if let Some(rest) = specifier.strip_prefix("self::") {
                bases.push(clean_path(&join(dir, &rest.replace("::", "/"))));
            } else if let Some(rest) = specifier.strip_prefix("super::") {
                let parent = parent_dir(dir);
                bases.push(clean_path(&join(parent, &rest.replace("::", "/"))));
            }
        }
        Language::Go => {
            if specifier.starts_with("./") || specifier.starts_with("../") {
                bases.push(clean_path(&join(dir, specifier)));
            }
        }
        // Java locals would need a package → directory mapping; deferred.
        Language::Java => {}
    }

    let mut candidates = Vec::new();
    for base in bases {
        if base.is_empty() {
            continue;
        }
        for suffix in language.import_suffixes() {
            let candidate = format!("{base}{suffix}");
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::{CallSite, SymbolKind, SymbolRecord, Visibility};

    fn symbol(file: &str, name: &str) -> SymbolRecord {
        SymbolRecord {
            qualified_name: SymbolRecord::qualify(file, None, name),
            name: name.to_string(),
            kind: SymbolKind::Function,
            file: file.to_string(),
            start_line: 1,
            end_line: 2,
            signature: None,
            docstring: None,
            return_type: None,
            parameters: Vec::new(),
            visibility: Visibility::Public,
            is_async: false,
            is_static: false,
            complexity: 1,
            calls: Vec::new(),
        }
    }

    fn parsed(
        path: &str,
        symbols: Vec<SymbolRecord>,
        imports: Vec<ImportRecord>,
        exports: Vec<String>,
    ) -> ParsedFile {
        ParsedFile {
            path: path.to_string(),
            language: Some(Language::TypeScript),
            content: String::new(),
            symbols,
            imports,
            exports,
            chunks: Vec::new(),
        }
    }

    #[test]
    fn same_file_resolution_wins() {
        let mut index = ResolutionIndex::new();
        index.add_parsed_file(&parsed("src/a.ts", vec![symbol("src/a.ts", "foo")], vec![], vec![]));
        assert_eq!(
            index.resolve_call("src/a.ts", "foo").as_deref(),
            Some("src/a.ts:foo")
        );
    }

    #[test]
    fn cross_file_resolution_through_import_with_extension_fallback() {
        let mut index = ResolutionIndex::new();
        index.add_parsed_file(&parsed(
            "src/a.ts",
            vec![symbol("src/a.ts", "foo")],
            vec![],
            vec![],
        ));
        index.add_parsed_file(&parsed(
            "src/b.ts",
            vec![symbol("src/b.ts", "bar")],
            vec![ImportRecord {
                source: "./a".into(),
                imported_symbols: vec!["foo".into()],
                style: ImportStyle::Named,
                is_external: false,
                line: 1,
            }],
            vec![],
        ));
        assert_eq!(
            index.resolve_call("src/b.ts", "foo").as_deref(),
            Some("src/a.ts:foo")
        );
    }

    #[test]
    fn exported_lookup_is_last_resort() {
        let mut index = ResolutionIndex::new();
        index.add_parsed_file(&parsed(
            "src/util.ts",
            vec![symbol("src/util.ts", "helper")],
            vec![],
            vec!["helper".into()],
        ));
        assert_eq!(
            index.resolve_call("src/other.ts", "helper").as_deref(),
            Some("src/util.ts:helper")
        );
    }

    #[test]
    fn unresolved_calls_are_dropped() {
        let index = ResolutionIndex::new();
        assert_eq!(index.resolve_call("src/a.ts", "nothing"), None);
    }

    #[test]
    fn same_short_name_without_exports_needs_the_import() {
        // Two `helper`s in different files, neither exported: only the
        // importing file resolves, and to the imported one.
        let mut index = ResolutionIndex::new();
        index.add_parsed_file(&parsed(
            "src/x.ts",
            vec![symbol("src/x.ts", "helper")],
            vec![],
            vec![],
        ));
        index.add_parsed_file(&parsed(
            "src/y.ts",
            vec![symbol("src/y.ts", "helper")],
            vec![],
            vec![],
        ));
        let mut caller = parsed(
            "src/z.ts",
            vec![symbol("src/z.ts", "main")],
            vec![ImportRecord {
                source: "./x".into(),
                imported_symbols: vec!["helper".into()],
                style: ImportStyle::Named,
                is_external: false,
                line: 1,
            }],
            vec![],
        );
        caller.language = Some(Language::TypeScript);
        index.add_parsed_file(&caller);

        assert_eq!(
            index.resolve_call("src/z.ts", "helper").as_deref(),
            Some("src/x.ts:helper")
        );
        // No import, no export: dropped.
        assert_eq!(index.resolve_call("src/w.ts", "helper"), None);
    }

    #[test]
    fn python_relative_import_candidates() {
        let candidates = import_candidates("pkg/sub/mod.py", "..core", Language::Python);
        assert!(candidates.contains(&"pkg/core.py".to_string()));
        assert!(candidates.contains(&"pkg/core/__init__.py".to_string()));
    }

    #[test]
    fn rust_crate_import_candidates() {
        let candidates = import_candidates("src/main.rs", "crate::graph::writer", Language::Rust);
        assert!(candidates.contains(&"src/graph/writer.rs".to_string()));
        assert!(candidates.contains(&"src/graph/writer/mod.rs".to_string()));
    }

    #[test]
    fn calls_embedded_in_symbols_survive_indexing() {
        let mut sym = symbol("src/a.ts", "foo");
        sym.calls.push(CallSite {
            callee: "bar".into(),
            line: 3,
            is_conditional: true,
        });
        let mut index = ResolutionIndex::new();
        index.add_parsed_file(&parsed("src/a.ts", vec![sym], vec![], vec![]));
        assert!(index.contains_file("src/a.ts"));
    }
}
