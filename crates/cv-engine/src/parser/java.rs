//! Java parser backed by tree-sitter.
//!
//! Complexity counts these branching constructs: `if_statement`,
//! `for_statement`, `enhanced_for_statement`, `while_statement`,
//! `do_statement`, `catch_clause`, `ternary_expression`, `switch_label`.

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
    "for_statement",
    "enhanced_for_statement",
    "while_statement",
    "do_statement",
    "catch_clause",
    "ternary_expression",
    "switch_label",
];

const CONDITIONAL_ANCESTORS: &[&str] = &[
    "if_statement",
    "switch_expression",
    "try_statement",
    "try_with_resources_statement",
    "catch_clause",
    "ternary_expression",
];

pub struct JavaParser;

impl JavaParser {
    pub fn new() -> Self {
        Self
    }

    fn create_parser() -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| Error::Parse {
                file: String::new(),
                message: format!("failed to load Java grammar: {e}"),
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

    fn modifiers(node: &Node, source: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "modifiers" {
                for word in node_text(&child, source).split_whitespace() {
                    out.push(word.to_string());
                }
            }
        }
        out
    }

    /// Explicit `public`/`protected`/`private`; package-private defaults to
    /// public in the common taxonomy.
    fn visibility(modifiers: &[String]) -> Visibility {
        if modifiers.iter().any(|m| m == "private") {
            Visibility::Private
        } else if modifiers.iter().any(|m| m == "protected") {
            Visibility::Protected
        } else {
            Visibility::Public
        }
    }

    fn docstring(node: &Node, source: &str) -> Option<String> {
        let prev = node.prev_sibling()?;
        if prev.kind() != "block_comment" {
            return None;
        }
        let text = node_text(&prev, source);
        if text.starts_with("/**") {
            clean_block_comment(text)
        } else {
            None
        }
    }

    fn parameters(node: &Node, source: &str) -> Vec<Parameter> {
        let Some(params) = node.child_by_field_name("parameters") else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = params.walk();
        for child in params.named_children(&mut cursor) {
            if child.kind() != "formal_parameter" && child.kind() != "spread_parameter" {
                continue;
            }
            let name = child
                .child_by_field_name("name")
                .map(|n| node_text(&n, source).to_string())
                .unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            let type_hint = child
                .child_by_field_name("type")
                .map(|t| node_text(&t, source).to_string());
            out.push(Parameter { name, type_hint });
        }
        out
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
        let callee = match node.kind() {
            "method_invocation" => node
                .child_by_field_name("name")
                .map(|n| node_text(&n, source).to_string()),
            "object_creation_expression" => node
                .child_by_field_name("type")
                .map(|t| {
                    let text = node_text(&t, source);
                    text.split('<').next().unwrap_or(text).to_string()
                }),
            _ => None,
        };
        if let Some(callee) = callee.filter(|c| !c.is_empty()) {
            calls.push(CallSite {
                callee,
                line: start_line(node),
                is_conditional: has_conditional_ancestor(node, symbol_node, CONDITIONAL_ANCESTORS),
            });
        }

        if node.id() != symbol_node.id()
            && matches!(node.kind(), "method_declaration" | "class_declaration")
        {
            return;
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            Self::walk_calls(&child, symbol_node, source, calls);
        }
    }

    fn member_symbol(
        member: &Node,
        owner: &str,
        source: &str,
        path: &str,
    ) -> Option<SymbolRecord> {
        let modifiers = Self::modifiers(member, source);
        match member.kind() {
            "method_declaration" | "constructor_declaration" => {
                let name = member
                    .child_by_field_name("name")
                    .map(|n| node_text(&n, source).to_string())?;
                Some(SymbolRecord {
                    qualified_name: SymbolRecord::qualify(path, Some(owner), &name),
                    name,
                    kind: SymbolKind::Method,
                    file: path.to_string(),
                    start_line: start_line(member),
                    end_line: end_line(member),
                    signature: signature_text(member, source),
                    docstring: Self::docstring(member, source),
                    return_type: member
                        .child_by_field_name("type")
                        .map(|t| node_text(&t, source).to_string()),
                    parameters: Self::parameters(member, source),
                    visibility: Self::visibility(&modifiers),
                    is_async: false,
                    is_static: modifiers.iter().any(|m| m == "static"),
                    complexity: 1 + count_branches(member, BRANCH_KINDS),
                    calls: Self::calls_in(member, source),
                })
            }
            "field_declaration" => {
                let declarator = {
                    let mut cursor = member.walk();
                    let found = member
                        .named_children(&mut cursor)
                        .find(|c| c.kind() == "variable_declarator");
                    found
                }?;
                let name = declarator
                    .child_by_field_name("name")
                    .map(|n| node_text(&n, source).to_string())?;
                Some(SymbolRecord {
                    qualified_name: SymbolRecord::qualify(path, Some(owner), &name),
                    name,
                    kind: SymbolKind::Property,
                    file: path.to_string(),
                    start_line: start_line(member),
                    end_line: end_line(member),
                    signature: signature_text(member, source),
                    docstring: None,
                    return_type: None,
                    parameters: Vec::new(),
                    visibility: Self::visibility(&modifiers),
                    is_async: false,
                    is_static: modifiers.iter().any(|m| m == "static"),
                    complexity: 1,
                    calls: Vec::new(),
                })
            }
            _ => None,
        }
    }

    fn type_symbol(
        node: &Node,
        source: &str,
        path: &str,
        kind: SymbolKind,
        symbols: &mut Vec<SymbolRecord>,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(&name_node, source).to_string();
        let modifiers = Self::modifiers(node, source);
        symbols.push(SymbolRecord {
            qualified_name: SymbolRecord::qualify(path, None, &name),
            name: name.clone(),
            kind,
            file: path.to_string(),
            start_line: start_line(node),
            end_line: end_line(node),
            signature: signature_text(node, source),
            docstring: Self::docstring(node, source),
            return_type: None,
            parameters: Vec::new(),
            visibility: Self::visibility(&modifiers),
            is_async: false,
            is_static: modifiers.iter().any(|m| m == "static"),
            complexity: 1 + count_branches(node, BRANCH_KINDS),
            calls: Vec::new(),
        });

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                // Enum members sit one level down.
                if member.kind() == "enum_body_declarations" {
                    let mut inner_cursor = member.walk();
                    for inner in member.named_children(&mut inner_cursor) {
                        if let Some(sym) = Self::member_symbol(&inner, &name, source, path) {
                            symbols.push(sym);
                        }
                    }
                    continue;
                }
                if let Some(sym) = Self::member_symbol(&member, &name, source, path) {
                    symbols.push(sym);
                }
            }
        }
    }

    fn collect_import(node: &Node, source: &str) -> Option<ImportRecord> {
        let mut cursor = node.walk();
        let scoped = node
            .named_children(&mut cursor)
            .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))?;
        let mut module = node_text(&scoped, source).to_string();

        // `import a.b.*` parses the asterisk outside the scoped identifier.
        let wildcard = node_text(node, source).contains(".*");
        let (imported, style) = if wildcard {
            (Vec::new(), ImportStyle::Namespace)
        } else {
            let leaf = module.rsplit('.').next().unwrap_or(&module).to_string();
            module = module
                .rsplit_once('.')
                .map(|(head, _)| head.to_string())
                .unwrap_or_else(|| module.clone());
            (vec![leaf], ImportStyle::Named)
        };

        // Only the standard-library namespaces are confidently external;
        // anything else is best-guessed as project-local.
        let is_external = module.starts_with("java.") || module.starts_with("javax.");

        Some(ImportRecord {
            source: module,
            imported_symbols: imported,
            style,
            is_external,
            line: start_line(node),
        })
    }
}

impl Default for JavaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for JavaParser {
    fn language(&self) -> Language {
        Language::Java
    }

    fn extensions(&self) -> &[&str] {
        &["java"]
    }

    fn parse(&self, path: &str, source: &str) -> Result<ParsedFile> {
        if source.is_empty() {
            return Ok(ParsedFile {
                path: path.to_string(),
                language: Some(Language::Java),
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
                "class_declaration" => {
                    Self::type_symbol(&node, source, path, SymbolKind::Class, &mut symbols)
                }
                "interface_declaration" => {
                    Self::type_symbol(&node, source, path, SymbolKind::Interface, &mut symbols)
                }
                "enum_declaration" => {
                    Self::type_symbol(&node, source, path, SymbolKind::Enum, &mut symbols)
                }
                "import_declaration" => {
                    if let Some(import) = Self::collect_import(&node, source) {
                        imports.push(import);
                    }
                }
                _ => {}
            }
        }

        // Top-level `public` types are the export convention.
        let exports = symbols
            .iter()
            .filter(|s| {
                s.visibility == Visibility::Public
                    && matches!(
                        s.kind,
                        SymbolKind::Class | SymbolKind::Interface | SymbolKind::Enum
                    )
            })
            .map(|s| s.name.clone())
            .collect();

        let chunks = chunks_from_symbols(path, source, &symbols);
        Ok(ParsedFile {
            path: path.to_string(),
            language: Some(Language::Java),
            content: source.to_string(),
            symbols,
            imports,
            exports,
            chunks,
        })
    }
}
