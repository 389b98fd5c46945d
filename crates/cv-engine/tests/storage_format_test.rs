//! On-disk format stability: field names are part of the format contract.

use cv_core::{FileRecord, Parameter, SymbolKind, SymbolRecord, Visibility};
use cv_engine::storage::{
    jsonl, CallEdgeMeta, EdgeLine, ImportEdgeMeta, NodeLine, StoreLayout, VectorLine,
};

fn sample_file() -> NodeLine<FileRecord> {
    NodeLine {
        id: "src/a.ts".into(),
        kind: "file".into(),
        data: FileRecord {
            path: "src/a.ts".into(),
            language: "typescript".into(),
            size: 120,
            hash: "0123abcd".into(),
            last_modified: "2026-08-01T10:00:00.000Z".into(),
            loc: 12,
            complexity: 4,
        },
    }
}

#[test]
fn node_line_field_names_are_stable() {
    let json = serde_json::to_value(sample_file()).unwrap();
    for key in ["id", "type", "path", "language", "size", "hash", "lastModified", "loc", "complexity"] {
        assert!(json.get(key).is_some(), "missing key {key} in {json}");
    }
    assert_eq!(json["type"], "file");
}

#[test]
fn symbol_line_field_names_are_stable() {
    let line = NodeLine {
        id: "src/a.ts:foo".into(),
        kind: "symbol".into(),
        data: SymbolRecord {
            qualified_name: "src/a.ts:foo".into(),
            name: "foo".into(),
            kind: SymbolKind::Function,
            file: "src/a.ts".into(),
            start_line: 1,
            end_line: 3,
            signature: Some("export function foo()".into()),
            docstring: None,
            return_type: None,
            parameters: vec![Parameter {
                name: "x".into(),
                type_hint: Some("number".into()),
            }],
            visibility: Visibility::Public,
            is_async: false,
            is_static: false,
            complexity: 1,
            calls: Vec::new(),
        },
    };
    let json = serde_json::to_value(&line).unwrap();
    assert_eq!(json["qualifiedName"], "src/a.ts:foo");
    assert_eq!(json["startLine"], 1);
    assert_eq!(json["visibility"], "public");
    assert_eq!(json["kind"], "function");
    assert_eq!(json["parameters"][0]["type"], "number");
    // Omitted optionals stay omitted, not null.
    assert!(json.get("docstring").is_none());
}

#[test]
fn edge_line_shapes() {
    let import = EdgeLine {
        source: "src/b.ts".into(),
        target: "src/a.ts".into(),
        kind: "IMPORTS".into(),
        metadata: Some(ImportEdgeMeta {
            symbols: vec!["foo".into()],
            style: "named".into(),
            line: 1,
        }),
    };
    let json = serde_json::to_value(&import).unwrap();
    assert_eq!(json["type"], "IMPORTS");
    assert_eq!(json["metadata"]["symbols"][0], "foo");

    let call = EdgeLine {
        source: "src/b.ts:bar".into(),
        target: "src/a.ts:foo".into(),
        kind: "CALLS".into(),
        metadata: Some(CallEdgeMeta {
            line: 2,
            count: 1,
            is_conditional: false,
        }),
    };
    let json = serde_json::to_value(&call).unwrap();
    assert_eq!(json["metadata"]["isConditional"], false);

    // Readers tolerate unknown metadata fields.
    let evolved: EdgeLine<CallEdgeMeta> = serde_json::from_str(
        r#"{"source":"a","target":"b","type":"CALLS",
            "metadata":{"line":2,"count":1,"isConditional":true,"weight":0.5}}"#,
    )
    .unwrap();
    assert!(evolved.metadata.unwrap().is_conditional);
}

#[test]
fn vector_line_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(dir.path());
    layout.ensure_skeleton().unwrap();

    let lines = vec![VectorLine {
        id: "src/a.ts:1:3".into(),
        text: "export function foo() {}".into(),
        embedding: vec![0.25, -0.5, 0.125],
        metadata: serde_json::json!({
            "file": "src/a.ts",
            "startLine": 1,
            "endLine": 3,
            "language": "typescript",
            "repoId": "abc123def456",
        }),
    }];
    jsonl::write_shard(&layout.vector_shard("code_chunks"), &lines).unwrap();

    let loaded: Vec<VectorLine> = jsonl::read_shard(&layout.vector_shard("code_chunks")).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "src/a.ts:1:3");
    assert_eq!(loaded[0].embedding, vec![0.25, -0.5, 0.125]);
    assert_eq!(loaded[0].metadata["repoId"], "abc123def456");
}

#[test]
fn every_line_is_newline_terminated_json() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(dir.path());
    layout.ensure_skeleton().unwrap();

    let lines: Vec<NodeLine<FileRecord>> = vec![sample_file(), sample_file()];
    let path = layout.node_shard("files");
    jsonl::write_shard(&path, &lines).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.ends_with('\n'), "no trailing garbage allowed");
    for line in raw.lines() {
        serde_json::from_str::<serde_json::Value>(line).expect("line parses as JSON");
    }
}
