use cv_core::{ImportStyle, SymbolKind, Visibility};
use cv_engine::parser::ParserRegistry;

#[test]
fn test_extract_rust_functions() {
    let registry = ParserRegistry::new();
    let source = r#"
pub fn authenticate_user(req: &Request) -> Result<User, AuthError> {
    let token = req.header("Authorization");
    validate_token(token)
}

fn validate_token(token: &str) -> Result<User, AuthError> {
    todo!()
}
"#;
    let parsed = registry.parse_file("auth.rs", source, None).unwrap();
    assert_eq!(parsed.symbols.len(), 2);

    let auth_fn = parsed
        .symbols
        .iter()
        .find(|s| s.name == "authenticate_user")
        .unwrap();
    assert_eq!(auth_fn.kind, SymbolKind::Function);
    assert_eq!(auth_fn.visibility, Visibility::Public);
    assert_eq!(auth_fn.qualified_name, "auth.rs:authenticate_user");
    assert_eq!(auth_fn.parameters.len(), 1);
    assert_eq!(auth_fn.parameters[0].name, "req");
    assert_eq!(auth_fn.return_type.as_deref(), Some("Result<User, AuthError>"));

    let validate_fn = parsed
        .symbols
        .iter()
        .find(|s| s.name == "validate_token")
        .unwrap();
    assert_eq!(validate_fn.visibility, Visibility::Private);
}

#[test]
fn test_impl_methods_are_owner_qualified() {
    let registry = ParserRegistry::new();
    let source = r#"
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    pub async fn refresh(&mut self) -> bool {
        true
    }
}
"#;
    let parsed = registry.parse_file("session.rs", source, None).unwrap();
    let names: Vec<&str> = parsed
        .symbols
        .iter()
        .map(|s| s.qualified_name.as_str())
        .collect();
    assert!(names.contains(&"session.rs:Session"), "got {names:?}");
    assert!(names.contains(&"session.rs:Session.new"), "got {names:?}");
    assert!(names.contains(&"session.rs:Session.refresh"), "got {names:?}");

    let new_fn = parsed
        .symbols
        .iter()
        .find(|s| s.qualified_name == "session.rs:Session.new")
        .unwrap();
    assert_eq!(new_fn.kind, SymbolKind::Method);
    // No receiver means an associated function.
    assert!(new_fn.is_static);

    let refresh = parsed
        .symbols
        .iter()
        .find(|s| s.qualified_name == "session.rs:Session.refresh")
        .unwrap();
    assert!(refresh.is_async);
    assert!(!refresh.is_static);
}

#[test]
fn test_visibility_mapping() {
    let registry = ParserRegistry::new();
    let source = r#"
pub fn exported() {}
pub(crate) fn internal() {}
fn hidden() {}
"#;
    let parsed = registry.parse_file("vis.rs", source, None).unwrap();
    let vis = |name: &str| {
        parsed
            .symbols
            .iter()
            .find(|s| s.name == name)
            .unwrap()
            .visibility
    };
    assert_eq!(vis("exported"), Visibility::Public);
    assert_eq!(vis("internal"), Visibility::Protected);
    assert_eq!(vis("hidden"), Visibility::Private);

    // `pub` is the export convention.
    assert!(parsed.exports.contains(&"exported".to_string()));
    assert!(!parsed.exports.contains(&"hidden".to_string()));
}

#[test]
fn test_extract_rust_calls_and_conditionality() {
    let registry = ParserRegistry::new();
    let source = r#"
fn main() {
    let user = authenticate_user();
    if user.valid {
        refresh_session();
    }
}
"#;
    let parsed = registry.parse_file("main.rs", source, None).unwrap();
    let main_fn = parsed.symbols.iter().find(|s| s.name == "main").unwrap();

    let auth_call = main_fn
        .calls
        .iter()
        .find(|c| c.callee == "authenticate_user")
        .unwrap();
    assert!(!auth_call.is_conditional);
    assert_eq!(auth_call.line, 3);

    let refresh_call = main_fn
        .calls
        .iter()
        .find(|c| c.callee == "refresh_session")
        .unwrap();
    assert!(refresh_call.is_conditional);
}

#[test]
fn test_extract_rust_imports() {
    let registry = ParserRegistry::new();
    let source = r#"
use std::collections::HashMap;
use crate::auth::{login, logout};
use super::util::*;
"#;
    let parsed = registry.parse_file("lib.rs", source, None).unwrap();
    assert_eq!(parsed.imports.len(), 3);

    let std_import = parsed
        .imports
        .iter()
        .find(|i| i.source.contains("std"))
        .unwrap();
    assert!(std_import.is_external);
    assert_eq!(std_import.imported_symbols, vec!["HashMap".to_string()]);

    let crate_import = parsed
        .imports
        .iter()
        .find(|i| i.source.starts_with("crate"))
        .unwrap();
    assert!(!crate_import.is_external);
    assert_eq!(crate_import.style, ImportStyle::Named);
    assert_eq!(
        crate_import.imported_symbols,
        vec!["login".to_string(), "logout".to_string()]
    );

    let wildcard = parsed
        .imports
        .iter()
        .find(|i| i.style == ImportStyle::Namespace)
        .unwrap();
    assert!(!wildcard.is_external);
    assert!(wildcard.imported_symbols.is_empty());
}

#[test]
fn test_doc_comments_and_complexity() {
    let registry = ParserRegistry::new();
    let source = r#"
/// Retries the request with backoff.
/// Gives up after three attempts.
pub fn retry(n: u32) -> bool {
    for attempt in 0..n {
        if attempt > 1 {
            return true;
        }
    }
    false
}
"#;
    let parsed = registry.parse_file("retry.rs", source, None).unwrap();
    let retry = parsed.symbols.iter().find(|s| s.name == "retry").unwrap();
    assert_eq!(
        retry.docstring.as_deref(),
        Some("Retries the request with backoff.\nGives up after three attempts.")
    );
    // 1 + for + if
    assert_eq!(retry.complexity, 3);
    assert!(retry
        .signature
        .as_deref()
        .unwrap()
        .starts_with("pub fn retry(n: u32) -> bool"));
}

#[test]
fn test_chunks_one_per_symbol() {
    let registry = ParserRegistry::new();
    let source = "pub fn one() {}\n\npub fn two() {}\n";
    let parsed = registry.parse_file("chunks.rs", source, None).unwrap();
    assert_eq!(parsed.chunks.len(), 2);
    let first = &parsed.chunks[0];
    assert_eq!(first.file, "chunks.rs");
    assert_eq!(first.id(), format!("chunks.rs:{}:{}", first.start_line, first.end_line));
    assert!(first.text.contains("fn one"));
}
