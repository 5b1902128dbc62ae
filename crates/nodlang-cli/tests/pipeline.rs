//! End-to-end scenarios through the public pipeline: text in, values out.

use nodlang::{Pipeline, PipelineConfig, PipelineError};
use nodlang_compiler::code::Qword;
use nodlang_compiler::error::CompileError;
use nodlang_core::variant::Variant;
use nodlang_parser::ParserConfig;
use nodlang_vm::{VmConfig, VmError};

fn pipeline() -> Pipeline {
    Pipeline::new(PipelineConfig::default()).unwrap()
}

fn run(source: &str) -> Pipeline {
    let mut p = pipeline();
    p.parse(source).unwrap_or_else(|err| panic!("{source:?}: {err}"));
    p.run().unwrap_or_else(|err| panic!("{source:?}: {err}"));
    p
}

fn count(p: &Pipeline, label: &str) -> usize {
    let graph = p.graph();
    graph
        .node_ids()
        .filter(|id| graph.node(*id).is_some_and(|n| n.kind().label() == label))
        .count()
}

#[test]
fn double_addition() {
    let p = run("double a = 10.4;\ndouble b = 5.2;\ndouble c = a + b;\n");
    assert_eq!(count(&p, "variable"), 3);
    assert_eq!(count(&p, "operator"), 1);

    let Some(Variant::Double(c)) = p.variable("c").cloned() else {
        panic!("c is not a double");
    };
    assert!((c - 15.6).abs() < 1e-9);
    assert!(matches!(p.vm().get_last_result(), Qword::Double(v) if (v - 15.6).abs() < 1e-9));
}

#[test]
fn if_else_picks_the_larger() {
    let p = run("int a = 2;\nint b = 5;\nint c;\nif (a > b) { c = a; } else { c = b; }\n");
    assert_eq!(p.variable("c"), Some(&Variant::Int(5)));
}

#[test]
fn narrowing_initializer_is_a_parse_error() {
    let mut p = pipeline();
    let err = p.parse("int i = 15.5;").unwrap_err();
    let PipelineError::Parse { diagnostic } = &err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert_eq!(diagnostic.offset, 8);
    assert!(diagnostic.message.contains("narrowing"));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn unterminated_string_keeps_the_previous_program() {
    let mut p = pipeline();
    p.parse("int keep = 1;").unwrap();
    let before = (p.graph().node_count(), p.graph().edge_count(), p.serialize());

    let err = p.parse("string s = \"never closed").unwrap_err();
    let PipelineError::Parse { diagnostic } = &err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert_eq!(diagnostic.offset, 11);
    assert_eq!(
        (p.graph().node_count(), p.graph().edge_count(), p.serialize()),
        before
    );
}

#[test]
fn undeclared_read_fails_to_compile() {
    let mut p = pipeline();
    p.parse("int a = 1; a + b;").unwrap();
    let err = p.run().unwrap_err();
    assert!(
        matches!(&err, PipelineError::Compile { source: CompileError::UndeclaredVariable { name, .. } } if name == "b"),
        "{err:?}"
    );
    assert_eq!(err.exit_code(), 2);
    assert!(!p.vm().is_loaded());
}

#[test]
fn strict_parsing_rejects_the_same_program() {
    let config = PipelineConfig {
        parser: ParserConfig { strict: true },
        ..PipelineConfig::default()
    };
    let mut p = Pipeline::new(config).unwrap();
    let err = p.parse("int a = 1; a + b;").unwrap_err();
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn runtime_fault_is_reported() {
    let mut p = pipeline();
    p.parse("int zero = 0; 10 / zero;").unwrap();
    let err = p.run().unwrap_err();
    assert!(matches!(err, PipelineError::Runtime { source: VmError::Eval { .. } }), "{err:?}");
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn repeated_runs_agree() {
    let mut p = pipeline();
    p.parse("int n = 10; int f = 1; while (n > 1) { f *= n; n -= 1; } f;").unwrap();
    let first = p.run().unwrap();
    for _ in 0..3 {
        assert_eq!(p.run().unwrap(), first);
    }
    assert_eq!(first, Qword::Int(3_628_800));
}

#[test]
fn debugging_matches_running() {
    let source = "int s = 0; for (int i = 1; i <= 3; i += 1) { s += i * i; } s;";
    let mut p = pipeline();
    p.parse(source).unwrap();
    let expected = p.run().unwrap();

    p.debug().unwrap();
    assert!(p.next_node().is_some());
    let mut steps = 1;
    while p.step().unwrap() {
        steps += 1;
    }
    assert_eq!(p.vm().get_last_result(), expected);
    assert_eq!(expected, Qword::Int(14));
    assert!(steps > p.compile().unwrap().len());
}

#[test]
fn trace_follows_the_config() {
    let config = PipelineConfig {
        vm: VmConfig {
            trace_enabled: true,
            ..VmConfig::default()
        },
        ..PipelineConfig::default()
    };
    let mut p = Pipeline::new(config).unwrap();
    p.parse("1 + 1;").unwrap();
    p.run().unwrap();
    let trace = p.trace().unwrap();
    assert_eq!(trace.len(), p.compile().unwrap().len());
}

#[test]
fn string_results_resolve_through_memory() {
    let p = run("string greeting = \"hello, \" + \"world\";");
    assert_eq!(p.last_value(), Some(Variant::String("hello, world".into())));
}

#[test]
fn formatting_round_trips() {
    let source = "int  x = 1 ;\n// note\nif (x == 1) {\n    x = 2;\n}\n";
    let mut p = pipeline();
    p.parse(source).unwrap();
    assert_eq!(p.serialize(), source);
}

#[test]
fn errors_serialize_with_their_stage() {
    let mut p = pipeline();
    let err = p.parse("int i = 1.5;").unwrap_err();
    insta::assert_json_snapshot!(err, @r#"
    {
      "stage": "parse",
      "diagnostic": {
        "offset": 8,
        "line": 1,
        "column": 9,
        "message": "narrowing conversion from `double` to `int`"
      }
    }
    "#);
}
