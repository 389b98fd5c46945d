use cv_core::{ImportStyle, SymbolKind, Visibility};
use cv_engine::parser::ParserRegistry;

#[test]
fn test_extract_go_functions_and_methods() {
    let registry = ParserRegistry::new();
    let source = r#"
package server

// Serve starts the listener and blocks.
func Serve(addr string) error {
    return listen(addr)
}

func listen(addr string) error {
    return nil
}

type Server struct {
    Addr string
}

func (s *Server) Start() error {
    return Serve(s.Addr)
}
"#;
    let parsed = registry.parse_file("server.go", source, None).unwrap();

    let find = |qname: &str| {
        parsed
            .symbols
            .iter()
            .find(|s| s.qualified_name == qname)
            .unwrap_or_else(|| panic!("missing {qname}"))
    };

    let serve = find("server.go:Serve");
    assert_eq!(serve.kind, SymbolKind::Function);
    assert_eq!(serve.visibility, Visibility::Public);
    assert_eq!(
        serve.docstring.as_deref(),
        Some("Serve starts the listener and blocks.")
    );
    assert_eq!(serve.return_type.as_deref(), Some("error"));

    assert_eq!(find("server.go:listen").visibility, Visibility::Private);
    assert_eq!(find("server.go:Server").kind, SymbolKind::Struct);

    // Receiver methods qualify under the receiver's type.
    let start = find("server.go:Server.Start");
    assert_eq!(start.kind, SymbolKind::Method);

    let start_calls: Vec<&str> = start.calls.iter().map(|c| c.callee.as_str()).collect();
    assert!(start_calls.contains(&"Serve"), "got {start_calls:?}");

    // Case-based export convention.
    assert!(parsed.exports.contains(&"Serve".to_string()));
    assert!(parsed.exports.contains(&"Server".to_string()));
    assert!(!parsed.exports.contains(&"listen".to_string()));
}

#[test]
fn test_go_interfaces_and_values() {
    let registry = ParserRegistry::new();
    let source = r#"
package store

const DefaultLimit = 100

var retries = 3

type Store interface {
    Get(key string) ([]byte, error)
    Put(key string, value []byte) error
}
"#;
    let parsed = registry.parse_file("store.go", source, None).unwrap();

    let find = |qname: &str| {
        parsed
            .symbols
            .iter()
            .find(|s| s.qualified_name == qname)
            .unwrap_or_else(|| panic!("missing {qname}"))
    };

    assert_eq!(find("store.go:DefaultLimit").kind, SymbolKind::Variable);
    assert_eq!(find("store.go:retries").visibility, Visibility::Private);
    assert_eq!(find("store.go:Store").kind, SymbolKind::Interface);
    assert_eq!(find("store.go:Store.Get").kind, SymbolKind::Method);
    assert_eq!(find("store.go:Store.Put").kind, SymbolKind::Method);
}

#[test]
fn test_go_imports() {
    let registry = ParserRegistry::new();
    let source = r#"
package main

import (
    "fmt"
    _ "net/http/pprof"
)
"#;
    let parsed = registry.parse_file("main.go", source, None).unwrap();
    assert_eq!(parsed.imports.len(), 2);

    let fmt_import = parsed.imports.iter().find(|i| i.source == "fmt").unwrap();
    assert_eq!(fmt_import.style, ImportStyle::Namespace);
    assert!(fmt_import.is_external);

    let pprof = parsed
        .imports
        .iter()
        .find(|i| i.source == "net/http/pprof")
        .unwrap();
    assert_eq!(pprof.style, ImportStyle::SideEffect);
}

#[test]
fn test_go_conditional_calls_and_complexity() {
    let registry = ParserRegistry::new();
    let source = r#"
package main

func run(jobs []Job) {
    setup()
    for _, job := range jobs {
        if job.Ready() {
            execute(job)
        }
    }
}
"#;
    let parsed = registry.parse_file("run.go", source, None).unwrap();
    let run = parsed.symbols.iter().find(|s| s.name == "run").unwrap();

    let setup = run.calls.iter().find(|c| c.callee == "setup").unwrap();
    assert!(!setup.is_conditional);
    let execute = run.calls.iter().find(|c| c.callee == "execute").unwrap();
    assert!(execute.is_conditional);
    // 1 + for + if
    assert_eq!(run.complexity, 3);
}
