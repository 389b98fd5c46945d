//! TypeScript / JavaScript parser backed by tree-sitter.
//!
//! Complexity counts these branching constructs: `if_statement`,
//! `ternary_expression`, `switch_case`, `for_statement`, `for_in_statement`,
//! `while_statement`, `do_statement`, `catch_clause`.

use tree_sitter::{Node, Parser};

use cv_core::{
    CallSite, Error, ImportRecord, ImportStyle, Language, Parameter, ParsedFile, Result,
    SymbolKind, SymbolRecord, Visibility,
};

use super::{
    chunks_from_symbols, clean_block_comment, count_branches, end_line, has_conditional_ancestor,
    node_text, signature_text, start_line, LanguageParser,
};

const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "ternary_expression",
    "switch_case",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "catch_clause",
];

const CONDITIONAL_ANCESTORS: &[&str] = &[
    "if_statement",
    "ternary_expression",
    "switch_statement",
    "try_statement",
    "catch_clause",
];

pub struct TypeScriptParser;

impl TypeScriptParser {
    pub fn new() -> Self {
        Self
    }

    fn create_parser(path: &str) -> Result<Parser> {
        let mut parser = Parser::new();
        // The TSX grammar is a superset that also covers plain JS/JSX; the
        // stricter TS grammar rejects JSX in `.ts` files as the compiler does.
        let language = if path.ends_with(".ts") || path.ends_with(".mts") || path.ends_with(".cts")
        {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT
        } else {
            tree_sitter_typescript::LANGUAGE_TSX
        };
        parser.set_language(&language.into()).map_err(|e| Error::Parse {
            file: path.to_string(),
            message: format!("failed to load TypeScript grammar: {e}"),
        })?;
        Ok(parser)
    }

    fn parse_tree(path: &str, source: &str) -> Result<tree_sitter::Tree> {
        Self::create_parser(path)?
            .parse(source, None)
            .ok_or_else(|| Error::Parse {
                file: path.to_string(),
                message: "tree-sitter parse returned no tree".into(),
            })
    }

    fn has_keyword(node: &Node, keyword: &str) -> bool {
        let mut cursor = node.walk();
        let result = node.children(&mut cursor).any(|c| c.kind() == keyword);
        result
    }

    fn doc_comment(node: &Node, source: &str) -> Option<String> {
        // An export_statement wraps the declaration; the doc comment sits
        // before the wrapper.
        let anchor = match node.parent() {
            Some(parent) if parent.kind() == "export_statement" => parent,
            _ => *node,
        };
        let prev = anchor.prev_sibling()?;
        if prev.kind() != "comment" {
            return None;
        }
        let text = node_text(&prev, source);
        if text.starts_with("/**") {
            clean_block_comment(text)
        } else {
            None
        }
    }

    fn member_visibility(node: &Node, source: &str) -> Visibility {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "accessibility_modifier" {
                return match node_text(&child, source) {
                    "private" => Visibility::Private,
                    "protected" => Visibility::Protected,
                    _ => Visibility::Public,
                };
            }
        }
        Visibility::Public
    }

    fn parameters(node: &Node, source: &str) -> Vec<Parameter> {
        let Some(params) = node.child_by_field_name("parameters") else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            match child.kind() {
                "required_parameter" | "optional_parameter" => {
                    let name = child
                        .child_by_field_name("pattern")
                        .map(|p| node_text(&p, source).to_string())
                        .unwrap_or_default();
                    if name.is_empty() || name == "this" {
                        continue;
                    }
                    let type_hint = child
                        .child_by_field_name("type")
                        .map(|t| node_text(&t, source).trim_start_matches(':').trim().to_string());
                    out.push(Parameter { name, type_hint });
                }
                "identifier" => out.push(Parameter {
                    name: node_text(&child, source).to_string(),
                    type_hint: None,
                }),
                _ => {}
            }
        }
        out
    }

    fn return_type(node: &Node, source: &str) -> Option<String> {
        node.child_by_field_name("return_type")
            .map(|t| node_text(&t, source).trim_start_matches(':').trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Extract call sites from a function-like node's body.
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
                    "member_expression" => func
                        .child_by_field_name("property")
                        .map(|p| node_text(&p, source).to_string())
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

        // Nested function declarations keep their own call lists.
        if node.id() != symbol_node.id()
            && matches!(
                node.kind(),
                "function_declaration" | "method_definition" | "class_declaration"
            )
        {
            return;
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            Self::walk_calls(&child, symbol_node, source, calls);
        }
    }

    fn symbol(
        node: &Node,
        source: &str,
        path: &str,
        owner: Option<&str>,
        name: String,
        kind: SymbolKind,
        visibility: Visibility,
        with_calls: bool,
    ) -> SymbolRecord {
        SymbolRecord {
            qualified_name: SymbolRecord::qualify(path, owner, &name),
            name,
            kind,
            file: path.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            signature: signature_text(node, source),
            docstring: Self::doc_comment(node, source),
            return_type: Self::return_type(node, source),
            parameters: Self::parameters(node, source),
            visibility,
            is_async: Self::has_keyword(node, "async"),
            is_static: Self::has_keyword(node, "static"),
            complexity: 1 + count_branches(node, BRANCH_KINDS),
            calls: if with_calls {
                Self::calls_in(node, source)
            } else {
                Vec::new()
            },
        }
    }

    fn collect_declaration(
        node: &Node,
        source: &str,
        path: &str,
        exported: bool,
        symbols: &mut Vec<SymbolRecord>,
        exports: &mut Vec<String>,
    ) {
        let mut push_export = |name: &str| {
            if exported && !name.is_empty() {
                exports.push(name.to_string());
            }
        };

        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(&name_node, source).to_string();
                    push_export(&name);
                    symbols.push(Self::symbol(
                        node,
                        source,
                        path,
                        None,
                        name,
                        SymbolKind::Function,
                        Visibility::Public,
                        true,
                    ));
                }
            }
            "class_declaration" | "abstract_class_declaration" => {
                let Some(name_node) = node.child_by_field_name("name") else {
                    return;
                };
                let class_name = node_text(&name_node, source).to_string();
                push_export(&class_name);
                symbols.push(Self::symbol(
                    node,
                    source,
                    path,
                    None,
                    class_name.clone(),
                    SymbolKind::Class,
                    Visibility::Public,
                    false,
                ));

                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for member in body.named_children(&mut cursor) {
                        match member.kind() {
                            "method_definition" => {
                                if let Some(name_node) = member.child_by_field_name("name") {
                                    let name = node_text(&name_node, source).to_string();
                                    let visibility = Self::member_visibility(&member, source);
                                    symbols.push(Self::symbol(
                                        &member,
                                        source,
                                        path,
                                        Some(&class_name),
                                        name,
                                        SymbolKind::Method,
                                        visibility,
                                        true,
                                    ));
                                }
                            }
                            "public_field_definition" => {
                                if let Some(name_node) = member.child_by_field_name("name") {
                                    let name = node_text(&name_node, source).to_string();
                                    let visibility = Self::member_visibility(&member, source);
                                    symbols.push(Self::symbol(
                                        &member,
                                        source,
                                        path,
                                        Some(&class_name),
                                        name,
                                        SymbolKind::Property,
                                        visibility,
                                        false,
                                    ));
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            "interface_declaration" => {
                let Some(name_node) = node.child_by_field_name("name") else {
                    return;
                };
                let iface_name = node_text(&name_node, source).to_string();
                push_export(&iface_name);
                symbols.push(Self::symbol(
                    node,
                    source,
                    path,
                    None,
                    iface_name.clone(),
                    SymbolKind::Interface,
                    Visibility::Public,
                    false,
                ));

                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for member in body.named_children(&mut cursor) {
                        let kind = match member.kind() {
                            "method_signature" => SymbolKind::Method,
                            "property_signature" => SymbolKind::Property,
                            _ => continue,
                        };
                        if let Some(name_node) = member.child_by_field_name("name") {
                            let name = node_text(&name_node, source).to_string();
                            symbols.push(Self::symbol(
                                &member,
                                source,
                                path,
                                Some(&iface_name),
                                name,
                                kind,
                                Visibility::Public,
                                false,
                            ));
                        }
                    }
                }
            }
            "type_alias_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(&name_node, source).to_string();
                    push_export(&name);
                    symbols.push(Self::symbol(
                        node,
                        source,
                        path,
                        None,
                        name,
                        SymbolKind::Type,
                        Visibility::Public,
                        false,
                    ));
                }
            }
            "enum_declaration" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(&name_node, source).to_string();
                    push_export(&name);
                    symbols.push(Self::symbol(
                        node,
                        source,
                        path,
                        None,
                        name,
                        SymbolKind::Enum,
                        Visibility::Public,
                        false,
                    ));
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = node.walk();
                for declarator in node.named_children(&mut cursor) {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    let Some(name_node) = declarator.child_by_field_name("name") else {
                        continue;
                    };
                    if name_node.kind() != "identifier" {
                        continue;
                    }
                    let name = node_text(&name_node, source).to_string();
                    push_export(&name);

                    let value = declarator.child_by_field_name("value");
                    let is_function = value.is_some_and(|v| {
                        matches!(v.kind(), "arrow_function" | "function_expression" | "function")
                    });
                    if let Some(value) = value.filter(|_| is_function) {
                        let mut sym = Self::symbol(
                            &value,
                            source,
                            path,
                            None,
                            name,
                            SymbolKind::Function,
                            Visibility::Public,
                            true,
                        );
                        // Span and header of the whole declaration read better
                        // than the bare arrow expression.
                        sym.start_line = start_line(node);
                        sym.end_line = end_line(node);
                        sym.signature = signature_text(node, source);
                        sym.qualified_name = SymbolRecord::qualify(path, None, &sym.name);
                        symbols.push(sym);
                    } else {
                        symbols.push(Self::symbol(
                            node,
                            source,
                            path,
                            None,
                            name,
                            SymbolKind::Variable,
                            Visibility::Public,
                            false,
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_import(node: &Node, source: &str) -> Option<ImportRecord> {
        let source_node = node.child_by_field_name("source")?;
        let specifier = node_text(&source_node, source)
            .trim_matches(['"', '\''])
            .to_string();

        let mut imported = Vec::new();
        let mut style = ImportStyle::SideEffect;

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "import_clause" {
                continue;
            }
            let mut clause_cursor = child.walk();
            for clause in child.named_children(&mut clause_cursor) {
                match clause.kind() {
                    "identifier" => {
                        imported.push(node_text(&clause, source).to_string());
                        if style == ImportStyle::SideEffect {
                            style = ImportStyle::Default;
                        }
                    }
                    "named_imports" => {
                        style = ImportStyle::Named;
                        let mut spec_cursor = clause.walk();
                        for spec in clause.named_children(&mut spec_cursor) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            // `import { a as b }` binds `b` locally.
                            let bound = spec
                                .child_by_field_name("alias")
                                .or_else(|| spec.child_by_field_name("name"));
                            if let Some(bound) = bound {
                                imported.push(node_text(&bound, source).to_string());
                            }
                        }
                    }
                    "namespace_import" => {
                        style = ImportStyle::Namespace;
                        imported.clear();
                    }
                    _ => {}
                }
            }
        }

        let is_external = !(specifier.starts_with('.') || specifier.starts_with('/'));
        Some(ImportRecord {
            source: specifier,
            imported_symbols: imported,
            style,
            is_external,
            line: start_line(node),
        })
    }

    fn collect_export_clause(node: &Node, source: &str, exports: &mut Vec<String>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "export_clause" {
                continue;
            }
            let mut spec_cursor = child.walk();
            for spec in child.named_children(&mut spec_cursor) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                let exported = spec
                    .child_by_field_name("alias")
                    .or_else(|| spec.child_by_field_name("name"));
                if let Some(exported) = exported {
                    exports.push(node_text(&exported, source).to_string());
                }
            }
        }
    }
}

impl Default for TypeScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for TypeScriptParser {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn extensions(&self) -> &[&str] {
        &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"]
    }

    fn parse(&self, path: &str, source: &str) -> Result<ParsedFile> {
        let language = super::detect_language(path).unwrap_or(Language::TypeScript);
        if source.is_empty() {
            return Ok(ParsedFile {
                path: path.to_string(),
                language: Some(language),
                content: String::new(),
                ..Default::default()
            });
        }

        let tree = Self::parse_tree(path, source)?;
        let root = tree.root_node();

        let mut symbols = Vec::new();
        let mut imports = Vec::new();
        let mut exports = Vec::new();

        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            match node.kind() {
                "import_statement" => {
                    if let Some(import) = Self::collect_import(&node, source) {
                        imports.push(import);
                    }
                }
                "export_statement" => {
                    if let Some(declaration) = node.child_by_field_name("declaration") {
                        Self::collect_declaration(
                            &declaration,
                            source,
                            path,
                            true,
                            &mut symbols,
                            &mut exports,
                        );
                    } else {
                        Self::collect_export_clause(&node, source, &mut exports);
                    }
                }
                _ => Self::collect_declaration(
                    &node,
                    source,
                    path,
                    false,
                    &mut symbols,
                    &mut exports,
                ),
            }
        }

        let chunks = chunks_from_symbols(path, source, &symbols);
        Ok(ParsedFile {
            path: path.to_string(),
            language: Some(language),
            content: source.to_string(),
            symbols,
            imports,
            exports,
            chunks,
        })
    }
}
