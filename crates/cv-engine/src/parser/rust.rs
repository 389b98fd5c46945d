//! Rust parser backed by tree-sitter.
//!
//! Complexity counts these branching constructs: `if_expression`,
//! `match_arm`, `while_expression`, `for_expression`.

use tree_sitter::{Node, Parser};

use cv_core::{
    CallSite, Error, ImportRecord, ImportStyle, Language, Parameter, ParsedFile, Result,
    SymbolKind, SymbolRecord, Visibility,
};

use super::{
    chunks_from_symbols, count_branches, end_line, has_conditional_ancestor, node_text,
    signature_text, start_line, LanguageParser,
};

const BRANCH_KINDS: &[&str] = &[
    "if_expression",
    "match_arm",
    "while_expression",
    "for_expression",
];

const CONDITIONAL_ANCESTORS: &[&str] = &["if_expression", "match_expression"];

pub struct RustParser;

impl RustParser {
    pub fn new() -> Self {
        Self
    }

    fn create_parser() -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .map_err(|e| Error::Parse {
                file: String::new(),
                message: format!("failed to load Rust grammar: {e}"),
            })?;
        Ok(parser)
    }

    fn parse_tree(path: &str, source: &str) -> Result<tree_sitter::Tree> {
        Self::create_parser()?
            .parse(source, None)
            .ok_or_else(|| Error::Parse {
                file: path.to_string(),
                message: "tree-sitter parse returned no tree".into(),
            })
    }

    /// `pub` is public, `pub(crate)`/`pub(super)`/`pub(in …)` are protected,
    /// no modifier is private.
    fn node_visibility(node: &Node, source: &str) -> Visibility {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "visibility_modifier" {
                let text = node_text(&child, source);
                if text == "pub" {
                    return Visibility::Public;
                }
                return Visibility::Protected;
            }
        }
        Visibility::Private
    }

    /// Collect preceding `///` doc comments.
    fn doc_comments(node: &Node, source: &str) -> Option<String> {
        let mut comments = Vec::new();
        let mut sibling = node.prev_sibling();

        while let Some(prev) = sibling {
            if prev.kind() != "line_comment" {
                break;
            }
            let text = node_text(&prev, source).trim();
            let Some(content) = text.strip_prefix("///") else {
                break;
            };
            comments.push(content.trim_start().to_string());
            sibling = prev.prev_sibling();
        }

        if comments.is_empty() {
            None
        } else {
            comments.reverse();
            Some(comments.join("\n"))
        }
    }

    fn map_symbol_kind(kind: &str) -> Option<SymbolKind> {
        match kind {
            "function_item" => Some(SymbolKind::Function),
            "struct_item" => Some(SymbolKind::Struct),
            "enum_item" => Some(SymbolKind::Enum),
            "trait_item" => Some(SymbolKind::Trait),
            "type_item" => Some(SymbolKind::Type),
            "const_item" | "static_item" => Some(SymbolKind::Variable),
            _ => None,
        }
    }

    fn is_async(node: &Node, source: &str) -> bool {
        let mut cursor = node.walk();
        let result = node.children(&mut cursor).any(|c| {
            c.kind() == "function_modifiers" && node_text(&c, source).contains("async")
                || c.kind() == "async"
        });
        result
    }

    fn parameters(node: &Node, source: &str) -> (Vec<Parameter>, bool) {
        let Some(params) = node.child_by_field_name("parameters") else {
            return (Vec::new(), false);
        };
        let mut out = Vec::new();
        let mut has_receiver = false;
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            match child.kind() {
                "self_parameter" => has_receiver = true,
                "parameter" => {
                    let name = child
                        .child_by_field_name("pattern")
                        .map(|p| node_text(&p, source).to_string())
                        .unwrap_or_default();
                    if name.is_empty() {
                        continue;
                    }
                    let type_hint = child
                        .child_by_field_name("type")
                        .map(|t| node_text(&t, source).to_string());
                    out.push(Parameter { name, type_hint });
                }
                _ => {}
            }
        }
        (out, has_receiver)
    }

    fn return_type(node: &Node, source: &str) -> Option<String> {
        node.child_by_field_name("return_type")
            .map(|t| node_text(&t, source).to_string())
    }

    fn calls_in(symbol_node: &Node, source: &str) -> Vec<CallSite> {
        let Some(body) = symbol_node.child_by_field_name("body") else {
            return Vec::new();
        };
        let mut calls = Vec::new();
        Self::walk_calls(&body, symbol_node, source, &mut calls);
        calls
    }

    fn walk_calls(node: &Node, symbol_node: &Node, source: &str, calls: &mut Vec<CallSite>) {
        if node.kind() == "call_expression" {
            if let Some(func) = node.child_by_field_name("function") {
                // Identifier, the final segment of a scoped name, or the
                // method name of a `recv.method(…)` call.
                let callee = match func.kind() {
                    "identifier" => node_text(&func, source).to_string(),
                    "scoped_identifier" => func
                        .child_by_field_name("name")
                        .map(|n| node_text(&n, source).to_string())
                        .unwrap_or_default(),
                    "field_expression" => func
                        .child_by_field_name("field")
                        .map(|f| node_text(&f, source).to_string())
                        .unwrap_or_default(),
                    _ => String::new(),
                };
                if !callee.is_empty() {
                    calls.push(CallSite {
                        callee,
                        line: start_line(node),
                        is_conditional: has_conditional_ancestor(
                            node,
                            symbol_node,
                            CONDITIONAL_ANCESTORS,
                        ),
                    });
                }
            }
        }

        if node.id() != symbol_node.id() && node.kind() == "function_item" {
            return;
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            Self::walk_calls(&child, symbol_node, source, calls);
        }
    }

    fn function_symbol(
        node: &Node,
        source: &str,
        path: &str,
        owner: Option<&str>,
    ) -> Option<SymbolRecord> {
        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(&n, source).to_string())?;
        let (parameters, has_receiver) = Self::parameters(node, source);
        let kind = if owner.is_some() {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        Some(SymbolRecord {
            qualified_name: SymbolRecord::qualify(path, owner, &name),
            name,
            kind,
            file: path.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            signature: signature_text(node, source),
            docstring: Self::doc_comments(node, source),
            return_type: Self::return_type(node, source),
            parameters,
            visibility: Self::node_visibility(node, source),
            is_async: Self::is_async(node, source),
            is_static: owner.is_some() && !has_receiver,
            complexity: 1 + count_branches(node, BRANCH_KINDS),
            calls: Self::calls_in(node, source),
        })
    }

    fn plain_symbol(
        node: &Node,
        source: &str,
        path: &str,
        kind: SymbolKind,
    ) -> Option<SymbolRecord> {
        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(&n, source).to_string())?;
        Some(SymbolRecord {
            qualified_name: SymbolRecord::qualify(path, None, &name),
            name,
            kind,
            file: path.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            signature: signature_text(node, source),
            docstring: Self::doc_comments(node, source),
            return_type: None,
            parameters: Vec::new(),
            visibility: Self::node_visibility(node, source),
            is_async: false,
            is_static: false,
            complexity: 1 + count_branches(node, BRANCH_KINDS),
            calls: Vec::new(),
        })
    }

    /// Type name an impl block attaches its methods to, generics stripped.
    fn impl_owner(node: &Node, source: &str) -> Option<String> {
        let ty = node.child_by_field_name("type")?;
        let text = node_text(&ty, source);
        Some(text.split('<').next().unwrap_or(text).trim().to_string())
    }

    fn collect_impl_members(
        node: &Node,
        source: &str,
        path: &str,
        symbols: &mut Vec<SymbolRecord>,
    ) {
        let Some(owner) = Self::impl_owner(node, source) else {
            return;
        };
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            if member.kind() == "function_item" {
                if let Some(sym) = Self::function_symbol(&member, source, path, Some(&owner)) {
                    symbols.push(sym);
                }
            }
        }
    }

    fn collect_trait_members(
        node: &Node,
        trait_name: &str,
        source: &str,
        path: &str,
        symbols: &mut Vec<SymbolRecord>,
    ) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            if matches!(member.kind(), "function_item" | "function_signature_item") {
                if let Some(sym) = Self::function_symbol(&member, source, path, Some(trait_name)) {
                    symbols.push(sym);
                }
            }
        }
    }

    // ── Imports ──

    fn is_local_path(path: &str) -> bool {
        path == "crate"
            || path == "self"
            || path == "super"
            || path.starts_with("crate::")
            || path.starts_with("self::")
            || path.starts_with("super::")
    }

    /// Leaf bound names of a use tree.
    fn leaf_names(node: &Node, source: &str, names: &mut Vec<String>) {
        match node.kind() {
            "identifier" => names.push(node_text(node, source).to_string()),
            "scoped_identifier" => {
                if let Some(name) = node.child_by_field_name("name") {
                    names.push(node_text(&name, source).to_string());
                }
            }
            "use_as_clause" => {
                if let Some(alias) = node.child_by_field_name("alias") {
                    names.push(node_text(&alias, source).to_string());
                }
            }
            "use_list" | "scoped_use_list" => {
                let inner = node.child_by_field_name("list").unwrap_or(*node);
                let mut cursor = inner.walk();
                for child in inner.named_children(&mut cursor) {
                    Self::leaf_names(&child, source, names);
                }
            }
            _ => {}
        }
    }

    /// One import record per `use` declaration.
    fn collect_import(node: &Node, source: &str) -> Option<ImportRecord> {
        let arg = node.child_by_field_name("argument")?;
        let line = start_line(node);

        let (module, imported, style) = match arg.kind() {
            "use_wildcard" => {
                let module = arg
                    .named_child(0)
                    .map(|p| node_text(&p, source).to_string())
                    .unwrap_or_default();
                (module, Vec::new(), ImportStyle::Namespace)
            }
            "scoped_use_list" => {
                let module = arg
                    .child_by_field_name("path")
                    .map(|p| node_text(&p, source).to_string())
                    .unwrap_or_default();
                let mut names = Vec::new();
                Self::leaf_names(&arg, source, &mut names);
                (module, names, ImportStyle::Named)
            }
            "scoped_identifier" => {
                let module = arg
                    .child_by_field_name("path")
                    .map(|p| node_text(&p, source).to_string())
                    .unwrap_or_default();
                let mut names = Vec::new();
                Self::leaf_names(&arg, source, &mut names);
                (module, names, ImportStyle::Named)
            }
            "use_as_clause" => {
                let module = arg
                    .child_by_field_name("path")
                    .map(|p| {
                        let text = node_text(&p, source);
                        text.rsplit_once("::")
                            .map(|(head, _)| head.to_string())
                            .unwrap_or_else(|| text.to_string())
                    })
                    .unwrap_or_default();
                let mut names = Vec::new();
                Self::leaf_names(&arg, source, &mut names);
                (module, names, ImportStyle::Named)
            }
            "identifier" => {
                let text = node_text(&arg, source).to_string();
                (text.clone(), vec![text], ImportStyle::Named)
            }
            _ => return None,
        };

        let full = if module.is_empty() {
            node_text(&arg, source).to_string()
        } else {
            module.clone()
        };
        Some(ImportRecord {
            is_external: !Self::is_local_path(&full),
            source: module,
            imported_symbols: imported,
            style,
            line,
        })
    }
}

impl Default for RustParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for RustParser {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn extensions(&self) -> &[&str] {
        &["rs"]
    }

    fn parse(&self, path: &str, source: &str) -> Result<ParsedFile> {
        if source.is_empty() {
            return Ok(ParsedFile {
                path: path.to_string(),
                language: Some(Language::Rust),
                ..Default::default()
            });
        }

        let tree = Self::parse_tree(path, source)?;
        let root = tree.root_node();

        let mut symbols = Vec::new();
        let mut imports = Vec::new();

        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            match node.kind() {
                "use_declaration" => {
                    if let Some(import) = Self::collect_import(&node, source) {
                        imports.push(import);
                    }
                }
                "function_item" => {
                    if let Some(sym) = Self::function_symbol(&node, source, path, None) {
                        symbols.push(sym);
                    }
                }
                "impl_item" => Self::collect_impl_members(&node, source, path, &mut symbols),
                "trait_item" => {
                    if let Some(sym) = Self::plain_symbol(&node, source, path, SymbolKind::Trait) {
                        let trait_name = sym.name.clone();
                        symbols.push(sym);
                        Self::collect_trait_members(&node, &trait_name, source, path, &mut symbols);
                    }
                }
                other => {
                    if let Some(kind) = Self::map_symbol_kind(other) {
                        if let Some(sym) = Self::plain_symbol(&node, source, path, kind) {
                            symbols.push(sym);
                        }
                    }
                }
            }
        }

        // `pub` is the export convention.
        let exports = symbols
            .iter()
            .filter(|s| s.visibility == Visibility::Public)
            .map(|s| s.name.clone())
            .collect();

        let chunks = chunks_from_symbols(path, source, &symbols);
        Ok(ParsedFile {
            path: path.to_string(),
            language: Some(Language::Rust),
            content: source.to_string(),
            symbols,
            imports,
            exports,
            chunks,
        })
    }
}
