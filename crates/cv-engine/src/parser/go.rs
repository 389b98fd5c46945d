//! Go parser backed by tree-sitter.
//!
//! Complexity counts these branching constructs: `if_statement`,
//! `for_statement`, `expression_case`, `type_case`, `communication_case`.

use tree_sitter::{Node, Parser};

use cv_core::{
    CallSite, Error, ImportRecord, ImportStyle, Language, Parameter, ParsedFile, Result,
    SymbolKind, SymbolRecord, Visibility,
};

use super::{
    chunks_from_symbols, count_branches, end_line, has_conditional_ancestor, leading_comments,
    node_text, signature_text, start_line, LanguageParser,
};

const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "expression_case",
    "type_case",
    "communication_case",
];

const CONDITIONAL_ANCESTORS: &[&str] = &[
    "if_statement",
    "expression_switch_statement",
    "type_switch_statement",
    "select_statement",
];

pub struct GoParser;

impl GoParser {
    pub fn new() -> Self {
        Self
    }

    fn create_parser() -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| Error::Parse {
                file: String::new(),
                message: format!("failed to load Go grammar: {e}"),
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

    /// Go visibility is by case: exported identifiers start uppercase.
    fn name_visibility(name: &str) -> Visibility {
        if name.chars().next().is_some_and(|c| c.is_uppercase()) {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    fn docstring(node: &Node, source: &str) -> Option<String> {
        leading_comments(node, source, "comment", &["// ", "//"])
    }

    fn parameters(node: &Node, source: &str) -> Vec<Parameter> {
        let Some(params) = node.child_by_field_name("parameters") else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            if child.kind() != "parameter_declaration" && child.kind() != "variadic_parameter_declaration"
            {
                continue;
            }
            let type_hint = child
                .child_by_field_name("type")
                .map(|t| node_text(&t, source).to_string());
            // `a, b string` declares two names for one type.
            let mut name_cursor = child.walk();
            let mut found_name = false;
            for part in child.named_children(&mut name_cursor) {
                if part.kind() == "identifier" {
                    found_name = true;
                    out.push(Parameter {
                        name: node_text(&part, source).to_string(),
                        type_hint: type_hint.clone(),
                    });
                }
            }
            if !found_name {
                if let Some(hint) = type_hint {
                    // Anonymous parameter (type only).
                    out.push(Parameter {
                        name: "_".to_string(),
                        type_hint: Some(hint),
                    });
                }
            }
        }
        out
    }

    fn return_type(node: &Node, source: &str) -> Option<String> {
        node.child_by_field_name("result")
            .map(|t| node_text(&t, source).to_string())
    }

    /// Receiver type, pointer and generics stripped: `(s *Server)` → `Server`.
    fn receiver_owner(node: &Node, source: &str) -> Option<String> {
        let receiver = node.child_by_field_name("receiver")?;
        let mut cursor = receiver.walk();
        for child in receiver.named_children(&mut cursor) {
            if child.kind() == "parameter_declaration" {
                if let Some(ty) = child.child_by_field_name("type") {
                    let text = node_text(&ty, source)
                        .trim_start_matches('*')
                        .trim()
                        .to_string();
                    let base = text.split('[').next().unwrap_or(&text).to_string();
                    return Some(base);
                }
            }
        }
        None
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
                let callee = match func.kind() {
                    "identifier" => node_text(&func, source).to_string(),
                    "selector_expression" => func
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

        // Calls inside closures still belong to the enclosing function, so
        // descend through func_literal nodes unconditionally.
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
            signature: signature_text(node, source),
            docstring: Self::docstring(node, source),
            return_type: Self::return_type(node, source),
            parameters: Self::parameters(node, source),
            is_async: false,
            is_static: false,
            complexity: 1 + count_branches(node, BRANCH_KINDS),
            calls: Self::calls_in(node, source),
        })
    }

    fn type_symbols(node: &Node, source: &str, path: &str, symbols: &mut Vec<SymbolRecord>) {
        let mut cursor = node.walk();
        for spec in node.named_children(&mut cursor) {
            if spec.kind() != "type_spec" {
                continue;
            }
            let Some(name_node) = spec.child_by_field_name("name") else {
                continue;
            };
            let name = node_text(&name_node, source).to_string();
            let ty = spec.child_by_field_name("type");
            let kind = match ty.map(|t| t.kind()) {
                Some("struct_type") => SymbolKind::Struct,
                Some("interface_type") => SymbolKind::Interface,
                _ => SymbolKind::Type,
            };
            symbols.push(SymbolRecord {
                qualified_name: SymbolRecord::qualify(path, None, &name),
                visibility: Self::name_visibility(&name),
                name: name.clone(),
                kind,
                file: path.to_string(),
                start_line: start_line(&spec),
                end_line: end_line(&spec),
                signature: signature_text(&spec, source),
                docstring: Self::docstring(node, source),
                return_type: None,
                parameters: Vec::new(),
                is_async: false,
                is_static: false,
                complexity: 1,
                calls: Vec::new(),
            });

            // Interface method specs become members of the interface.
            if kind == SymbolKind::Interface {
                if let Some(body) = ty {
                    let mut body_cursor = body.walk();
                    for member in body.named_children(&mut body_cursor) {
                        if member.kind() != "method_elem" {
                            continue;
                        }
                        let Some(method_name) = member.child_by_field_name("name") else {
                            continue;
                        };
                        let method = node_text(&method_name, source).to_string();
                        symbols.push(SymbolRecord {
                            qualified_name: SymbolRecord::qualify(path, Some(&name), &method),
                            visibility: Self::name_visibility(&method),
                            name: method,
                            kind: SymbolKind::Method,
                            file: path.to_string(),
                            start_line: start_line(&member),
                            end_line: end_line(&member),
                            signature: signature_text(&member, source),
                            docstring: None,
                            return_type: member
                                .child_by_field_name("result")
                                .map(|r| node_text(&r, source).to_string()),
                            parameters: Self::parameters(&member, source),
                            is_async: false,
                            is_static: false,
                            complexity: 1,
                            calls: Vec::new(),
                        });
                    }
                }
            }
        }
    }

    fn value_symbols(node: &Node, source: &str, path: &str, symbols: &mut Vec<SymbolRecord>) {
        let mut cursor = node.walk();
        for spec in node.named_children(&mut cursor) {
            if spec.kind() != "const_spec" && spec.kind() != "var_spec" {
                continue;
            }
            let mut spec_cursor = spec.walk();
            for part in spec.named_children(&mut spec_cursor) {
                if part.kind() != "identifier" {
                    continue;
                }
                let name = node_text(&part, source).to_string();
                if name == "_" {
                    continue;
                }
                symbols.push(SymbolRecord {
                    qualified_name: SymbolRecord::qualify(path, None, &name),
                    visibility: Self::name_visibility(&name),
                    name,
                    kind: SymbolKind::Variable,
                    file: path.to_string(),
                    start_line: start_line(&spec),
                    end_line: end_line(&spec),
                    signature: signature_text(&spec, source),
                    docstring: None,
                    return_type: None,
                    parameters: Vec::new(),
                    is_async: false,
                    is_static: false,
                    complexity: 1,
                    calls: Vec::new(),
                });
            }
        }
    }

    fn collect_imports(node: &Node, source: &str, imports: &mut Vec<ImportRecord>) {
        let mut specs = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_spec" => specs.push(child),
                "import_spec_list" => {
                    let mut list_cursor = child.walk();
                    for spec in child.named_children(&mut list_cursor) {
                        if spec.kind() == "import_spec" {
                            specs.push(spec);
                        }
                    }
                }
                _ => {}
            }
        }

        for spec in specs {
            let Some(path_node) = spec.child_by_field_name("path") else {
                continue;
            };
            let import_path = node_text(&path_node, source).trim_matches('"').to_string();
            let alias = spec
                .child_by_field_name("name")
                .map(|n| node_text(&n, source).to_string());

            let style = match alias.as_deref() {
                Some("_") => ImportStyle::SideEffect,
                _ => ImportStyle::Namespace,
            };
            // Module-path imports resolve through go.mod, which the engine
            // does not read; only explicitly relative paths count as local.
            let is_external = !import_path.starts_with("./") && !import_path.starts_with("../");

            imports.push(ImportRecord {
                source: import_path,
                imported_symbols: Vec::new(),
                style,
                is_external,
                line: start_line(&spec),
            });
        }
    }
}

impl Default for GoParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for GoParser {
    fn language(&self) -> Language {
        Language::Go
    }

    fn extensions(&self) -> &[&str] {
        &["go"]
    }

    fn parse(&self, path: &str, source: &str) -> Result<ParsedFile> {
        if source.is_empty() {
            return Ok(ParsedFile {
                path: path.to_string(),
                language: Some(Language::Go),
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
                "function_declaration" => {
                    if let Some(sym) = Self::function_symbol(&node, source, path, None) {
                        symbols.push(sym);
                    }
                }
                "method_declaration" => {
                    let owner = Self::receiver_owner(&node, source);
                    if let Some(sym) =
                        Self::function_symbol(&node, source, path, owner.as_deref())
                    {
                        symbols.push(sym);
                    }
                }
                "type_declaration" => Self::type_symbols(&node, source, path, &mut symbols),
                "const_declaration" | "var_declaration" => {
                    Self::value_symbols(&node, source, path, &mut symbols)
                }
                "import_declaration" => Self::collect_imports(&node, source, &mut imports),
                _ => {}
            }
        }

        // Exported-by-case is the export convention.
        let exports = symbols
            .iter()
            .filter(|s| s.visibility == Visibility::Public)
            .map(|s| s.name.clone())
            .collect();

        let chunks = chunks_from_symbols(path, source, &symbols);
        Ok(ParsedFile {
            path: path.to_string(),
            language: Some(Language::Go),
            content: source.to_string(),
            symbols,
            imports,
            exports,
            chunks,
        })
    }
}
