use cv_core::{ImportStyle, Language, SymbolKind, Visibility};
use cv_engine::parser::ParserRegistry;

#[test]
fn test_extract_ts_functions_and_classes() {
    let registry = ParserRegistry::new();
    let source = r#"
export function authenticateUser(req: Request): Promise<User> {
    return validateToken(req.token);
}

export class AuthService {
    private secret: string;

    constructor(secret: string) {
        this.secret = secret;
    }

    async validate(token: string): Promise<boolean> {
        return true;
    }
}

export interface User {
    id: number;
    touch(): void;
}

export type AuthResult = User | null;

export enum Role {
    Admin,
    Member,
}

const MAX_RETRIES = 3;
"#;
    let parsed = registry.parse_file("auth.ts", source, None).unwrap();
    assert_eq!(parsed.language, Some(Language::TypeScript));

    let find = |qname: &str| {
        parsed
            .symbols
            .iter()
            .find(|s| s.qualified_name == qname)
            .unwrap_or_else(|| panic!("missing {qname}"))
    };

    let auth = find("auth.ts:authenticateUser");
    assert_eq!(auth.kind, SymbolKind::Function);
    assert_eq!(auth.return_type.as_deref(), Some("Promise<User>"));
    assert_eq!(auth.parameters.len(), 1);
    assert_eq!(auth.parameters[0].type_hint.as_deref(), Some("Request"));

    assert_eq!(find("auth.ts:AuthService").kind, SymbolKind::Class);
    let secret = find("auth.ts:AuthService.secret");
    assert_eq!(secret.kind, SymbolKind::Property);
    assert_eq!(secret.visibility, Visibility::Private);

    let validate = find("auth.ts:AuthService.validate");
    assert_eq!(validate.kind, SymbolKind::Method);
    assert!(validate.is_async);

    assert_eq!(find("auth.ts:User").kind, SymbolKind::Interface);
    assert_eq!(find("auth.ts:User.touch").kind, SymbolKind::Method);
    assert_eq!(find("auth.ts:AuthResult").kind, SymbolKind::Type);
    assert_eq!(find("auth.ts:Role").kind, SymbolKind::Enum);
    assert_eq!(find("auth.ts:MAX_RETRIES").kind, SymbolKind::Variable);

    for name in ["authenticateUser", "AuthService", "User", "AuthResult", "Role"] {
        assert!(parsed.exports.contains(&name.to_string()), "missing export {name}");
    }
    assert!(!parsed.exports.contains(&"MAX_RETRIES".to_string()));
}

#[test]
fn test_arrow_function_consts_are_functions() {
    let registry = ParserRegistry::new();
    let source = r#"
export const fetchUser = async (id: number) => {
    return get(`/users/${id}`);
};
const helper = 42;
"#;
    let parsed = registry.parse_file("api.ts", source, None).unwrap();

    let fetch = parsed.symbols.iter().find(|s| s.name == "fetchUser").unwrap();
    assert_eq!(fetch.kind, SymbolKind::Function);
    assert!(fetch.is_async);

    let helper = parsed.symbols.iter().find(|s| s.name == "helper").unwrap();
    assert_eq!(helper.kind, SymbolKind::Variable);
}

#[test]
fn test_ts_import_styles() {
    let registry = ParserRegistry::new();
    let source = r#"
import express from "express";
import { login, logout as bye } from "./auth";
import * as util from "./util";
import "./side-effects";
"#;
    let parsed = registry.parse_file("app.ts", source, None).unwrap();
    assert_eq!(parsed.imports.len(), 4);

    let default = &parsed.imports[0];
    assert_eq!(default.style, ImportStyle::Default);
    assert!(default.is_external);
    assert_eq!(default.imported_symbols, vec!["express".to_string()]);

    let named = &parsed.imports[1];
    assert_eq!(named.style, ImportStyle::Named);
    assert!(!named.is_external);
    // Aliased bindings use the local name.
    assert_eq!(
        named.imported_symbols,
        vec!["login".to_string(), "bye".to_string()]
    );

    let namespace = &parsed.imports[2];
    assert_eq!(namespace.style, ImportStyle::Namespace);
    assert!(namespace.imported_symbols.is_empty());

    let side_effect = &parsed.imports[3];
    assert_eq!(side_effect.style, ImportStyle::SideEffect);
}

#[test]
fn test_ts_calls_inside_branches() {
    let registry = ParserRegistry::new();
    let source = r#"
function handler(req: Request) {
    const parsed = parse(req);
    if (parsed.ok) {
        accept(parsed);
    }
    try {
        persist(parsed);
    } catch (e) {
        reject(e);
    }
}
"#;
    let parsed = registry.parse_file("handler.ts", source, None).unwrap();
    let handler = parsed.symbols.iter().find(|s| s.name == "handler").unwrap();

    let call = |name: &str| handler.calls.iter().find(|c| c.callee == name).unwrap();
    assert!(!call("parse").is_conditional);
    assert!(call("accept").is_conditional);
    assert!(call("persist").is_conditional);
    assert!(call("reject").is_conditional);
}

#[test]
fn test_method_calls_use_property_name() {
    let registry = ParserRegistry::new();
    let source = r#"
function run() {
    client.connect();
    doWork();
}
"#;
    let parsed = registry.parse_file("run.ts", source, None).unwrap();
    let run = parsed.symbols.iter().find(|s| s.name == "run").unwrap();
    let names: Vec<&str> = run.calls.iter().map(|c| c.callee.as_str()).collect();
    assert!(names.contains(&"connect"), "got {names:?}");
    assert!(names.contains(&"doWork"), "got {names:?}");
}

#[test]
fn test_plain_javascript_parses() {
    let registry = ParserRegistry::new();
    let source = r#"
function add(a, b) {
    return a + b;
}
module.exports = { add };
"#;
    let parsed = registry.parse_file("math.js", source, None).unwrap();
    assert_eq!(parsed.language, Some(Language::JavaScript));
    assert!(parsed.symbols.iter().any(|s| s.name == "add"));
}

#[test]
fn test_jsdoc_becomes_docstring() {
    let registry = ParserRegistry::new();
    let source = r#"
/**
 * Greets a user by name.
 */
export function greet(name: string): string {
    return `hello ${name}`;
}
"#;
    let parsed = registry.parse_file("greet.ts", source, None).unwrap();
    let greet = parsed.symbols.iter().find(|s| s.name == "greet").unwrap();
    assert_eq!(greet.docstring.as_deref(), Some("Greets a user by name."));
}
