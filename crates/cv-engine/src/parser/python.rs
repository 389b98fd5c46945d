//! Python parser backed by tree-sitter.
//!
//! Complexity counts these branching constructs: `if_statement`,
//! `elif_clause`, `for_statement`, `while_statement`, `except_clause`,
//! `case_clause`, `conditional_expression`.

use tree_sitter::{Node, Parser};

use cv_core::{
    CallSite, Error, ImportRecord, ImportStyle, Language, Parameter, ParsedFile, Result,
    SymbolKind, SymbolRecord, Visibility,
};

use super::{
    chunks_from_symbols, count_branches, end_line, has_conditional_ancestor, leading_comments,
    node_text, start_line, LanguageParser,
};

const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "case_clause",
    "conditional_expression",
];

const CONDITIONAL_ANCESTORS: &[&str] = &[
    "if_statement",
    "try_statement",
    "except_clause",
    "conditional_expression",
    "match_statement",
    "case_clause",
];

pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }

    fn create_parser() -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| Error::Parse {
                file: String::new(),
                message: format!("failed to load Python grammar: {e}"),
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

    /// The `def`/`class` line is the signature; Python has no `{` to cut at.
    fn signature(node: &Node, source: &str) -> Option<String> {
        let first_line = node_text(node, source).lines().next()?;
        let header = first_line.trim().trim_end_matches(':').trim_end();
        if header.is_empty() {
            None
        } else {
            Some(header.to_string())
        }
    }

    /// `__x` is private, `_x` is protected, dunders and everything else are
    /// public.
    fn name_visibility(name: &str) -> Visibility {
        if name.starts_with("__") && name.ends_with("__") {
            Visibility::Public
        } else if name.starts_with("__") {
            Visibility::Private
        } else if name.starts_with('_') {
            Visibility::Protected
        } else {
            Visibility::Public
        }
    }

    /// The first statement of the body, when it is a string expression.
    fn extract_docstring(node: &Node, source: &str) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let first = body.child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let expr = first.child(0)?;
        if expr.kind() != "string" {
            return None;
        }
        let raw = node_text(&expr, source);
        let content = raw
            .strip_prefix("\"\"\"")
            .and_then(|s| s.strip_suffix("\"\"\""))
            .or_else(|| raw.strip_prefix("'''").and_then(|s| s.strip_suffix("'''")))
            .unwrap_or(raw);
        let trimmed = content.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    fn docstring(node: &Node, source: &str) -> Option<String> {
        Self::extract_docstring(node, source)
            .or_else(|| leading_comments(node, source, "comment", &["# ", "#"]))
    }

    fn decorators(node: &Node, source: &str) -> Vec<String> {
        let Some(parent) = node.parent() else {
            return Vec::new();
        };
        if parent.kind() != "decorated_definition" {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut cursor = parent.walk();
        for child in parent.children(&mut cursor) {
            if child.kind() == "decorator" {
                out.push(node_text(&child, source).trim_start_matches('@').to_string());
            }
        }
        out
    }

    fn is_async(node: &Node) -> bool {
        let mut cursor = node.walk();
        let result = node.children(&mut cursor).any(|c| c.kind() == "async");
        result
    }

    fn parameters(node: &Node, source: &str) -> Vec<Parameter> {
        let Some(params) = node.child_by_field_name("parameters") else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            let (name, type_hint) = match child.kind() {
                "identifier" => (node_text(&child, source).to_string(), None),
                "typed_parameter" => {
                    let name = child
                        .named_child(0)
                        .map(|n| node_text(&n, source).to_string())
                        .unwrap_or_default();
                    let hint = child
                        .child_by_field_name("type")
                        .map(|t| node_text(&t, source).to_string());
                    (name, hint)
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| node_text(&n, source).to_string())
                        .unwrap_or_default();
                    let hint = child
                        .child_by_field_name("type")
                        .map(|t| node_text(&t, source).to_string());
                    (name, hint)
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    (node_text(&child, source).to_string(), None)
                }
                _ => continue,
            };
            if name.is_empty() || name == "self" || name == "cls" {
                continue;
            }
            out.push(Parameter { name, type_hint });
        }
        out
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
        if node.kind() == "call" {
            if let Some(func) = node.child_by_field_name("function") {
                let callee = match func.kind() {
                    "identifier" => node_text(&func, source).to_string(),
                    "attribute" => func
                        .child_by_field_name("attribute")
                        .map(|a| node_text(&a, source).to_string())
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

        if node.id() != symbol_node.id()
            && matches!(node.kind(), "function_definition" | "class_definition")
        {
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
        let decorators = Self::decorators(node, source);
        let kind = if owner.is_some() {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        Some(SymbolRecord {
            qualified_name: SymbolRecord::qualify(path, owner, &name),
            visibility: Self::name_visibility(&name),
            name,
            kind,
            file: path.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            signature: Self::signature(node, source),
            docstring: Self::docstring(node, source),
            return_type: Self::return_type(node, source),
            parameters: Self::parameters(node, source),
            is_async: Self::is_async(node),
            is_static: decorators
                .iter()
                .any(|d| d == "staticmethod" || d == "classmethod"),
            complexity: 1 + count_branches(node, BRANCH_KINDS),
            calls: Self::calls_in(node, source),
        })
    }

    fn class_symbol(node: &Node, source: &str, path: &str) -> Option<SymbolRecord> {
        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(&n, source).to_string())?;
        Some(SymbolRecord {
            qualified_name: SymbolRecord::qualify(path, None, &name),
            visibility: Self::name_visibility(&name),
            name,
            kind: SymbolKind::Class,
            file: path.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            signature: Self::signature(node, source),
            docstring: Self::docstring(node, source),
            return_type: None,
            parameters: Vec::new(),
            is_async: false,
            is_static: false,
            complexity: 1 + count_branches(node, BRANCH_KINDS),
            calls: Vec::new(),
        })
    }

    /// Module-level `NAME = value` assignments become variables.
    fn assignment_symbol(node: &Node, source: &str, path: &str) -> Option<SymbolRecord> {
        if node.kind() != "expression_statement" {
            return None;
        }
        let assignment = node.child(0)?;
        if assignment.kind() != "assignment" {
            return None;
        }
        let left = assignment.child_by_field_name("left")?;
        if left.kind() != "identifier" {
            return None;
        }
        let name = node_text(&left, source).to_string();
        if name.is_empty() || name == "__all__" {
            return None;
        }
        Some(SymbolRecord {
            qualified_name: SymbolRecord::qualify(path, None, &name),
            visibility: Self::name_visibility(&name),
            name,
            kind: SymbolKind::Variable,
            file: path.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            signature: Self::signature(node, source),
            docstring: None,
            return_type: None,
            parameters: Vec::new(),
            is_async: false,
            is_static: false,
            complexity: 1,
            calls: Vec::new(),
        })
    }

    fn collect_class_members(
        class_node: &Node,
        class_name: &str,
        source: &str,
        path: &str,
        symbols: &mut Vec<SymbolRecord>,
    ) {
        let Some(body) = class_node.child_by_field_name("body") else {
            return;
        };
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            let def = match member.kind() {
                "function_definition" => member,
                "decorated_definition" => match member.child_by_field_name("definition") {
                    Some(def) if def.kind() == "function_definition" => def,
                    _ => continue,
                },
                _ => continue,
            };
            if let Some(sym) = Self::function_symbol(&def, source, path, Some(class_name)) {
                symbols.push(sym);
            }
        }
    }

    fn collect_import(node: &Node, source: &str, imports: &mut Vec<ImportRecord>) {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    let module = match child.kind() {
                        "dotted_name" => node_text(&child, source).to_string(),
                        "aliased_import" => child
                            .child_by_field_name("name")
                            .map(|n| node_text(&n, source).to_string())
                            .unwrap_or_default(),
                        _ => continue,
                    };
                    if module.is_empty() {
                        continue;
                    }
                    imports.push(ImportRecord {
                        is_external: !module.starts_with('.'),
                        source: module,
                        imported_symbols: Vec::new(),
                        style: ImportStyle::Namespace,
                        line: start_line(node),
                    });
                }
            }
            "import_from_statement" => {
                let Some(module_node) = node.child_by_field_name("module_name") else {
                    return;
                };
                let module = node_text(&module_node, source).to_string();

                let mut imported = Vec::new();
                let mut style = ImportStyle::Named;
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    if child.id() == module_node.id() {
                        continue;
                    }
                    match child.kind() {
                        "dotted_name" => imported.push(node_text(&child, source).to_string()),
                        "aliased_import" => {
                            // `from m import a as b` binds `b`.
                            if let Some(alias) = child.child_by_field_name("alias") {
                                imported.push(node_text(&alias, source).to_string());
                            }
                        }
                        "wildcard_import" => {
                            style = ImportStyle::Namespace;
                            imported.clear();
                        }
                        _ => {}
                    }
                }

                imports.push(ImportRecord {
                    is_external: !module.starts_with('.'),
                    source: module,
                    imported_symbols: imported,
                    style,
                    line: start_line(node),
                });
            }
            _ => {}
        }
    }

    /// `__all__ = ["a", "b"]`, when present, is the export list.
    fn collect_exports(root: &Node, source: &str) -> Vec<String> {
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            if node.kind() != "expression_statement" {
                continue;
            }
            let Some(assignment) = node.child(0).filter(|c| c.kind() == "assignment") else {
                continue;
            };
            let Some(left) = assignment.child_by_field_name("left") else {
                continue;
            };
            if node_text(&left, source) != "__all__" {
                continue;
            }
            let Some(right) = assignment.child_by_field_name("right") else {
                continue;
            };
            let mut names = Vec::new();
            let mut list_cursor = right.walk();
            for item in right.named_children(&mut list_cursor) {
                if item.kind() == "string" {
                    let name = node_text(&item, source).trim_matches(['"', '\'']).to_string();
                    if !name.is_empty() {
                        names.push(name);
                    }
                }
            }
            return names;
        }
        Vec::new()
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for PythonParser {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extensions(&self) -> &[&str] {
        &["py", "pyw", "pyi"]
    }

    fn parse(&self, path: &str, source: &str) -> Result<ParsedFile> {
        if source.is_empty() {
            return Ok(ParsedFile {
                path: path.to_string(),
                language: Some(Language::Python),
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
                "function_definition" => {
                    if let Some(sym) = Self::function_symbol(&node, source, path, None) {
                        symbols.push(sym);
                    }
                }
                "class_definition" => {
                    if let Some(sym) = Self::class_symbol(&node, source, path) {
                        let class_name = sym.name.clone();
                        symbols.push(sym);
                        Self::collect_class_members(&node, &class_name, source, path, &mut symbols);
                    }
                }
                "decorated_definition" => {
                    let Some(def) = node.child_by_field_name("definition") else {
                        continue;
                    };
                    match def.kind() {
                        "function_definition" => {
                            if let Some(sym) = Self::function_symbol(&def, source, path, None) {
                                symbols.push(sym);
                            }
                        }
                        "class_definition" => {
                            if let Some(sym) = Self::class_symbol(&def, source, path) {
                                let class_name = sym.name.clone();
                                symbols.push(sym);
                                Self::collect_class_members(
                                    &def,
                                    &class_name,
                                    source,
                                    path,
                                    &mut symbols,
                                );
                            }
                        }
                        _ => {}
                    }
                }
                "import_statement" | "import_from_statement" => {
                    Self::collect_import(&node, source, &mut imports);
                }
                "expression_statement" => {
                    if let Some(sym) = Self::assignment_symbol(&node, source, path) {
                        symbols.push(sym);
                    }
                }
                _ => {}
            }
        }

        let exports = Self::collect_exports(&root, source);
        let chunks = chunks_from_symbols(path, source, &symbols);
        Ok(ParsedFile {
            path: path.to_string(),
            language: Some(Language::Python),
            content: source.to_string(),
            symbols,
            imports,
            exports,
            chunks,
        })
    }
}
