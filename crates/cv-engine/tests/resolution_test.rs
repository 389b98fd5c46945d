//! Cross-file call resolution over real parser output.

use cv_engine::graph::ResolutionIndex;
use cv_engine::parser::ParserRegistry;

#[test]
fn cross_file_call_resolves_through_import() {
    let registry = ParserRegistry::new();

    let a = registry
        .parse_file("src/a.ts", "export function foo() {}\n", None)
        .unwrap();
    let b = registry
        .parse_file(
            "src/b.ts",
            "import { foo } from './a';\nfunction bar() { foo() }\n",
            None,
        )
        .unwrap();

    let mut index = ResolutionIndex::new();
    index.add_parsed_file(&a);
    index.add_parsed_file(&b);

    // The import resolves through the `.ts` extension fallback.
    let bar = b.symbols.iter().find(|s| s.name == "bar").unwrap();
    assert_eq!(bar.qualified_name, "src/b.ts:bar");
    let call = bar.calls.iter().find(|c| c.callee == "foo").unwrap();
    assert_eq!(call.line, 2);

    assert_eq!(
        index.resolve_call("src/b.ts", "foo").as_deref(),
        Some("src/a.ts:foo")
    );
}

#[test]
fn unknown_identifier_is_silently_dropped() {
    let registry = ParserRegistry::new();
    let a = registry
        .parse_file("src/a.ts", "function solo() { phantom() }\n", None)
        .unwrap();

    let mut index = ResolutionIndex::new();
    index.add_parsed_file(&a);

    assert_eq!(index.resolve_call("src/a.ts", "phantom"), None);
}

#[test]
fn python_relative_import_resolution() {
    let registry = ParserRegistry::new();

    let core = registry
        .parse_file("pkg/core.py", "def boot():\n    pass\n", None)
        .unwrap();
    let app = registry
        .parse_file(
            "pkg/sub/app.py",
            "from ..core import boot\n\ndef main():\n    boot()\n",
            None,
        )
        .unwrap();

    let mut index = ResolutionIndex::new();
    index.add_parsed_file(&core);
    index.add_parsed_file(&app);

    assert_eq!(
        index.resolve_call("pkg/sub/app.py", "boot").as_deref(),
        Some("pkg/core.py:boot")
    );
}

#[test]
fn incremental_style_resolution_against_external_symbols() {
    // A change in file A resolves calls whose targets live in unchanged
    // file B, known only through the pre-built index.
    let registry = ParserRegistry::new();
    let changed = registry
        .parse_file(
            "src/b.ts",
            "import { foo } from './a';\nfunction baz() { foo() }\n",
            None,
        )
        .unwrap();

    let mut index = ResolutionIndex::new();
    // Unchanged file B's contribution, as rebuilt from the live graph.
    index.add_file("src/a.ts");
    index.add_symbol("src/a.ts", "foo", "src/a.ts:foo");
    index.add_parsed_file(&changed);

    assert_eq!(
        index.resolve_call("src/b.ts", "foo").as_deref(),
        Some("src/a.ts:foo")
    );
}
