mod common;

use cbl_core::ast::{Kind, Node, build};
use cbl_core::symbols::{ExprType, Scope, Symbol, UsageKind};
use cbl_core::{CompileErrorKind, CompileOptions, Compiler, FractionPolicy, Value};
use pretty_assertions::assert_eq;

use common::*;

fn single(program: Node) -> Node {
    build::module("M", vec![program])
}

fn working(fields: Vec<Node>) -> Node {
    program(
        "P",
        false,
        fields,
        vec![],
        build::procedure(&[], &[], vec![]),
    )
}

fn undefined(name: &str) -> CompileErrorKind {
    CompileErrorKind::Undefined {
        name: name.to_string(),
    }
}

/// `TAKE` accepts one COMP-4 and returns one COMP-2.
fn take_program() -> Node {
    program(
        "TAKE",
        false,
        vec![],
        vec![
            field("N", UsageKind::Comp4, vec![build::pic("9(3)")]),
            field("R", UsageKind::Comp2, vec![]),
        ],
        build::procedure(&["N"], &["R"], vec![]),
    )
}

fn caller(working: Vec<Node>, statements: Vec<Node>) -> Node {
    program(
        "MAIN",
        true,
        working,
        vec![],
        build::procedure(&[], &[], statements),
    )
}

#[test]
fn test_field_redefinition_points_at_first_declaration() {
    let mut first = field("X", UsageKind::Display, vec![]);
    first.children[1] = build::identifier("X").at(4, 12);
    let mut second = field("X", UsageKind::Comp2, vec![]);
    second.children[1] = build::identifier("X").at(5, 12);

    let err = compile_error(compile(single(working(vec![first, second]))));
    assert_eq!(err.kind, CompileErrorKind::Redefinition { name: "X".into() });
    assert_eq!(err.location.line(), 5);
    let related = err.related.unwrap();
    assert_eq!(related.file, "main.cbl");
    assert_eq!(related.location.line(), 4);
}

#[test]
fn test_redefinition_across_sections() {
    let tree = single(program(
        "P",
        false,
        vec![field("X", UsageKind::Display, vec![])],
        vec![field("X", UsageKind::Display, vec![])],
        build::procedure(&[], &[], vec![]),
    ));
    assert_eq!(
        error_kind(compile(tree)),
        CompileErrorKind::Redefinition { name: "X".into() }
    );
}

#[test]
fn test_program_redefinition_in_chunk() {
    let tree = build::module(
        "M",
        vec![
            working(vec![]),
            working(vec![]),
        ],
    );
    assert_eq!(
        error_kind(compile(tree)),
        CompileErrorKind::Redefinition { name: "P".into() }
    );
}

#[test]
fn test_exported_program_redefined_in_another_chunk() {
    let exported = || {
        build::module(
            "M",
            vec![program(
                "P",
                true,
                vec![],
                vec![],
                build::procedure(&[], &[], vec![]),
            )],
        )
    };
    let mut compiler = compiler(vec![("a.cbl", exported()), ("b.cbl", exported())]);
    compiler.compile_source(b"", "a.cbl", None).unwrap();

    let err = compile_error(compiler.compile_source(b"", "b.cbl", None));
    assert_eq!(err.kind, CompileErrorKind::Redefinition { name: "P".into() });
    assert_eq!(err.file, "b.cbl");
    assert_eq!(err.related.unwrap().file, "a.cbl");
}

#[test]
fn test_recompiling_a_file_replaces_its_exports() {
    let exported = build::module(
        "M",
        vec![program(
            "P",
            true,
            vec![],
            vec![],
            build::procedure(&[], &[], vec![]),
        )],
    );
    let mut compiler = compiler(vec![("main.cbl", exported)]);
    compiler.compile_source(b"", "main.cbl", None).unwrap();
    compiler.compile_source(b"", "main.cbl", None).unwrap();

    let globals = compiler.global_scope();
    let (module, symbol) = globals.modules().find(|(_, m)| m.name == "M").unwrap();
    let latest = *symbol.chunks.last().unwrap();
    let program = globals.resolve_module_program(module, "P").unwrap();
    assert_eq!(globals.program(program).chunk, latest);
}

#[test]
fn test_unexported_programs_may_share_names_across_chunks() {
    let local = || single(working(vec![]));
    let mut compiler = compiler(vec![("a.cbl", local()), ("b.cbl", local())]);
    compiler.compile_source(b"", "a.cbl", None).unwrap();
    compiler.compile_source(b"", "b.cbl", None).unwrap();

    let (module, symbol) = compiler
        .global_scope()
        .modules()
        .find(|(_, m)| m.name == "M")
        .unwrap();
    assert_eq!(symbol.chunks.len(), 2);
    assert_eq!(
        compiler.global_scope().resolve_module_program(module, "P"),
        None
    );
}

#[test]
fn test_field_clause_validation() {
    let cases: Vec<(Node, CompileErrorKind)> = vec![
        (
            build::field(88, "X", vec![]),
            CompileErrorKind::BadLevel { level: 88 },
        ),
        (
            field("X", UsageKind::Comp4, vec![build::pic("9S9")]),
            CompileErrorKind::BadSignPicture { name: "X".into() },
        ),
        (
            field("X", UsageKind::Comp4, vec![build::pic("9V9V9")]),
            CompileErrorKind::ManyVirtualDecimalPoint { name: "X".into() },
        ),
        (
            field("X", UsageKind::Comp4, vec![build::pic("9(19)")]),
            CompileErrorKind::ExceedComp4Precision {
                name: "X".into(),
                digits: 19,
            },
        ),
        (
            field("X", UsageKind::Comp4, vec![build::pic("X(3)9A")]),
            CompileErrorKind::IncompatibleComp4Picture { name: "X".into() },
        ),
        (
            field("X", UsageKind::Comp4, vec![build::pic("X(5)")]),
            CompileErrorKind::IncompatibleComp4Picture { name: "X".into() },
        ),
        (
            field("X", UsageKind::Comp2, vec![build::pic("9(3)")]),
            CompileErrorKind::PictureNotAllowed {
                name: "X".into(),
                usage: UsageKind::Comp2,
            },
        ),
        (
            field("X", UsageKind::Comp2, vec![build::string("a")]),
            CompileErrorKind::BadDefaultValue {
                name: "X".into(),
                reason: "expected a number".into(),
            },
        ),
        (
            field("X", UsageKind::Comp2, vec![build::number("1.2.3")]),
            CompileErrorKind::BadNumericLiteral {
                literal: "1.2.3".into(),
            },
        ),
        (
            field("X", UsageKind::Display, vec![build::number("1")]),
            CompileErrorKind::BadDefaultValue {
                name: "X".into(),
                reason: "expected a string".into(),
            },
        ),
        (
            field(
                "X",
                UsageKind::Comp4,
                vec![build::pic("9(3)"), build::number("-1")],
            ),
            CompileErrorKind::BadDefaultValue {
                name: "X".into(),
                reason: "negative value for an unsigned picture".into(),
            },
        ),
        (
            field(
                "X",
                UsageKind::Comp4,
                vec![build::pic("9(2)"), build::number("123")],
            ),
            CompileErrorKind::BadDefaultValue {
                name: "X".into(),
                reason: "value does not fit the declared precision".into(),
            },
        ),
        (
            field("X", UsageKind::Any, vec![]),
            CompileErrorKind::AnyOutsideLinkage { name: "X".into() },
        ),
    ];

    for (declaration, expected) in cases {
        let found = error_kind(compile(single(working(vec![declaration]))));
        assert_eq!(found, expected);
    }
}

#[test]
fn test_excess_fraction_policy() {
    let tree = || {
        single(working(vec![field(
            "X",
            UsageKind::Comp4,
            vec![build::pic("9V9"), build::number("1.25")],
        )]))
    };

    let module = compile(tree()).unwrap();
    assert_eq!(
        module.prototypes[0].fields,
        vec![Value::Comp4 {
            precision: 2,
            scale: 1,
            digits: "12".into(),
        }]
    );

    let options = CompileOptions {
        fraction_policy: FractionPolicy::Reject,
        ..options()
    };
    let mut strict = Compiler::new(options, Box::new(FixtureParser::new(vec![("main.cbl", tree())])));
    assert!(matches!(
        error_kind(strict.compile_source(b"", "main.cbl", None)),
        CompileErrorKind::BadDefaultValue { .. }
    ));
}

#[test]
fn test_parameter_declaration_rules() {
    let with_linkage = |working_fields: Vec<Node>, linkage: Vec<Node>, usings: &[&str]| {
        single(program(
            "P",
            false,
            working_fields,
            linkage,
            build::procedure(usings, &[], vec![]),
        ))
    };

    assert_eq!(
        error_kind(compile(with_linkage(vec![], vec![], &["NOPE"]))),
        undefined("NOPE")
    );
    assert_eq!(
        error_kind(compile(with_linkage(
            vec![field("W", UsageKind::Display, vec![])],
            vec![],
            &["W"],
        ))),
        CompileErrorKind::NotInLinkageSection { name: "W".into() }
    );
    assert_eq!(
        error_kind(compile(with_linkage(
            vec![],
            vec![field("L", UsageKind::Display, vec![build::string("d")])],
            &["L"],
        ))),
        CompileErrorKind::UsingWithDefaultValue { name: "L".into() }
    );
    assert_eq!(
        error_kind(compile(with_linkage(
            vec![],
            vec![field("L", UsageKind::Display, vec![])],
            &["L", "L"],
        ))),
        CompileErrorKind::Redefinition { name: "L".into() }
    );
}

#[test]
fn test_end_marker() {
    let with_marker = |marker: &str| {
        single(build::program(
            "P",
            vec![
                build::procedure(&[], &[], vec![]),
                build::end_program(marker),
            ],
        ))
    };

    assert!(compile(with_marker("P")).is_ok());
    assert_eq!(
        error_kind(compile(with_marker("Q"))),
        CompileErrorKind::EndMarkerMismatch {
            expected: "P".into(),
            found: "Q".into(),
        }
    );
}

#[test]
fn test_undefined_callees() {
    let call = |statement: Node| single(caller(vec![], vec![statement]));

    assert_eq!(
        error_kind(compile(call(build::call("NOPE", None, vec![], &[])))),
        undefined("NOPE")
    );
    assert_eq!(
        error_kind(compile(call(build::call("P", Some("NOMOD"), vec![], &[])))),
        undefined("NOMOD")
    );
    assert_eq!(
        error_kind(compile_with_system(call(build::call(
            "NOPE",
            Some("SYSTEM"),
            vec![],
            &[],
        )))),
        undefined("NOPE")
    );
}

#[test]
fn test_unexported_program_is_not_callable_from_another_module() {
    let lib = build::module(
        "LIB",
        vec![program(
            "HIDDEN",
            false,
            vec![],
            vec![],
            build::procedure(&[], &[], vec![]),
        )],
    );
    let main = build::module(
        "APP",
        vec![caller(vec![], vec![build::call("HIDDEN", Some("LIB"), vec![], &[])])],
    );
    let mut compiler = compiler(vec![("lib.cbl", lib), ("main.cbl", main)]);
    compiler.compile_source(b"", "lib.cbl", None).unwrap();
    assert_eq!(
        error_kind(compiler.compile_source(b"", "main.cbl", None)),
        undefined("HIDDEN")
    );
}

#[test]
fn test_unqualified_call_stays_in_chunk() {
    let lib = build::module(
        "M",
        vec![program(
            "SHARED",
            true,
            vec![],
            vec![],
            build::procedure(&[], &[], vec![]),
        )],
    );
    let main = build::module(
        "M",
        vec![caller(vec![], vec![build::call("SHARED", None, vec![], &[])])],
    );
    let mut compiler = compiler(vec![("lib.cbl", lib), ("main.cbl", main)]);
    compiler.compile_source(b"", "lib.cbl", None).unwrap();
    assert_eq!(
        error_kind(compiler.compile_source(b"", "main.cbl", None)),
        undefined("SHARED")
    );

    let qualified = build::module(
        "M",
        vec![caller(vec![], vec![build::call("SHARED", Some("M"), vec![], &[])])],
    );
    let mut compiler = compiler_with_lib(qualified);
    assert!(compiler.compile_source(b"", "main.cbl", None).is_ok());
}

fn compiler_with_lib(main: Node) -> Compiler {
    let lib = build::module(
        "M",
        vec![program(
            "SHARED",
            true,
            vec![],
            vec![],
            build::procedure(&[], &[], vec![]),
        )],
    );
    let mut compiler = compiler(vec![("lib.cbl", lib), ("main.cbl", main)]);
    compiler.compile_source(b"", "lib.cbl", None).unwrap();
    compiler
}

#[test]
fn test_undefined_argument_field() {
    let tree = build::module(
        "M",
        vec![
            take_program(),
            caller(
                vec![],
                vec![build::call("TAKE", None, vec![build::by_ref("GHOST")], &[])],
            ),
        ],
    );
    assert_eq!(error_kind(compile(tree)), undefined("GHOST"));
}

#[test]
fn test_mutable_argument_aliasing() {
    let two_numbers = program(
        "PAIR",
        false,
        vec![],
        vec![
            field("A", UsageKind::Comp2, vec![]),
            field("B", UsageKind::Comp2, vec![]),
        ],
        build::procedure(&["A", "B"], &[], vec![]),
    );
    let tree = |usings: Vec<Node>| {
        build::module(
            "M",
            vec![
                two_numbers.clone(),
                caller(
                    vec![field("X", UsageKind::Comp2, vec![])],
                    vec![build::call("PAIR", None, usings, &[])],
                ),
            ],
        )
    };

    assert_eq!(
        error_kind(compile(tree(vec![build::by_ref("X"), build::by_ref("X")]))),
        CompileErrorKind::MutableArgumentRedefinition { name: "X".into() }
    );
    assert!(compile(tree(vec![build::by_ref("X"), build::by_content("X")])).is_ok());
    assert!(compile(tree(vec![build::by_content("X"), build::by_content("X")])).is_ok());
}

#[test]
fn test_returning_aliases_a_using() {
    let tree = build::module(
        "M",
        vec![
            program(
                "ECHO",
                false,
                vec![],
                vec![
                    field("A", UsageKind::Comp2, vec![]),
                    field("R", UsageKind::Comp2, vec![]),
                ],
                build::procedure(&["A"], &["R"], vec![]),
            ),
            caller(
                vec![field("X", UsageKind::Comp2, vec![])],
                vec![build::call("ECHO", None, vec![build::by_ref("X")], &["X"])],
            ),
        ],
    );
    assert_eq!(
        error_kind(compile(tree)),
        CompileErrorKind::MutableArgumentRedefinition { name: "X".into() }
    );
}

#[test]
fn test_argument_type_mismatch_points_at_parameter() {
    let mut take = take_program();
    // Pin the parameter's declaration so the related location is checkable.
    let data = take
        .children
        .iter_mut()
        .find(|c| c.is(Kind::DataDivision))
        .unwrap();
    let parameter = &mut data.children[0].children[0];
    parameter.children[1] = build::identifier("N").at(7, 20);

    let tree = build::module(
        "M",
        vec![
            take,
            caller(
                vec![field("S", UsageKind::Display, vec![])],
                vec![build::call(
                    "TAKE",
                    None,
                    vec![build::by_ref("S").at(12, 30)],
                    &[],
                )],
            ),
        ],
    );
    let err = compile_error(compile(tree));
    assert_eq!(
        err.kind,
        CompileErrorKind::ArgumentTypeMismatch {
            position: 1,
            expected: UsageKind::Comp4,
            found: ExprType::Usage(UsageKind::Display),
        }
    );
    assert_eq!(err.location.line(), 12);
    let related = err.related.unwrap();
    assert_eq!(related.file, "main.cbl");
    assert_eq!(related.location.line(), 7);
}

#[test]
fn test_numeric_literal_fits_numeric_parameters_only() {
    let tree = |callee: Node, literal: Node| {
        build::module(
            "M",
            vec![
                callee,
                caller(vec![], vec![build::call("CALLEE", None, vec![literal], &[])]),
            ],
        )
    };
    let callee = |usage: UsageKind| {
        program(
            "CALLEE",
            false,
            vec![],
            vec![field("A", usage, vec![])],
            build::procedure(&["A"], &[], vec![]),
        )
    };

    assert!(compile(tree(callee(UsageKind::Comp2), build::number("1"))).is_ok());
    assert!(compile(tree(callee(UsageKind::Comp4), build::number("1"))).is_ok());
    assert!(compile(tree(callee(UsageKind::Any), build::number("1"))).is_ok());
    assert_eq!(
        error_kind(compile(tree(callee(UsageKind::Display), build::number("1")))),
        CompileErrorKind::ArgumentTypeMismatch {
            position: 1,
            expected: UsageKind::Display,
            found: ExprType::NumericLiteral,
        }
    );
    assert_eq!(
        error_kind(compile(tree(callee(UsageKind::Comp2), build::string("1")))),
        CompileErrorKind::ArgumentTypeMismatch {
            position: 1,
            expected: UsageKind::Comp2,
            found: ExprType::Usage(UsageKind::Display),
        }
    );
}

#[test]
fn test_argument_and_returning_counts() {
    let tree = |statement: Node| {
        build::module(
            "M",
            vec![
                take_program(),
                caller(
                    vec![
                        field("N", UsageKind::Comp4, vec![]),
                        field("A", UsageKind::Comp2, vec![]),
                        field("B", UsageKind::Comp2, vec![]),
                    ],
                    vec![statement],
                ),
            ],
        )
    };

    assert_eq!(
        error_kind(compile(tree(build::call("TAKE", None, vec![], &[])))),
        CompileErrorKind::UsingCountMismatch {
            program: "TAKE".into(),
            expected: 1,
            found: 0,
        }
    );
    assert_eq!(
        error_kind(compile(tree(build::call(
            "TAKE",
            None,
            vec![build::by_ref("N")],
            &["A", "B"],
        )))),
        CompileErrorKind::ReturningCountMismatch {
            program: "TAKE".into(),
            expected: 1,
            found: 2,
        }
    );
    // Fewer returnings than declared is fine.
    assert!(compile(tree(build::call("TAKE", None, vec![build::by_ref("N")], &[]))).is_ok());
}

#[test]
fn test_returning_type_mismatch() {
    let tree = build::module(
        "M",
        vec![
            take_program(),
            caller(
                vec![
                    field("N", UsageKind::Comp4, vec![]),
                    field("S", UsageKind::Display, vec![]),
                ],
                vec![build::call("TAKE", None, vec![build::by_ref("N")], &["S"])],
            ),
        ],
    );
    assert_eq!(
        error_kind(compile(tree)),
        CompileErrorKind::ReturningTypeMismatch {
            position: 1,
            expected: UsageKind::Comp2,
            found: UsageKind::Display,
        }
    );
}

#[test]
fn test_statement_in_argument_list_is_rejected() {
    let tree = build::module(
        "M",
        vec![
            take_program(),
            caller(vec![], vec![build::call("TAKE", None, vec![build::goback()], &[])]),
        ],
    );
    let err = compile_error(compile(tree));
    assert_eq!(
        err.kind,
        CompileErrorKind::UnexpectedArgument {
            kind: "GobackStatement".into(),
        }
    );
    assert_eq!(err.code(), "CBL0023");
}

#[test]
fn test_expression_of_program_without_returnings() {
    let tree = build::module(
        "M",
        vec![
            program(
                "NOTHING",
                false,
                vec![],
                vec![],
                build::procedure(&[], &[], vec![]),
            ),
            caller(vec![], vec![build::display(vec![build::call_expr("NOTHING", None, vec![])])]),
        ],
    );
    assert_eq!(
        error_kind(compile_with_system(tree)),
        CompileErrorKind::ExpressionReturnsNothing {
            program: "NOTHING".into(),
        }
    );
}

#[test]
fn test_display_without_system_module() {
    let tree = single(caller(vec![], vec![build::display(vec![build::string("hi")])]));
    assert_eq!(error_kind(compile(tree)), undefined("SYSTEM"));
}

#[test]
fn test_resolve_declare_types_every_field() {
    let mut compiler = compiler(vec![(
        "main.cbl",
        single(working(vec![
            field("A", UsageKind::Comp2, vec![]),
            field("B", UsageKind::Display, vec![]),
        ])),
    )]);
    compiler.compile_source(b"", "main.cbl", None).unwrap();

    let globals = compiler.global_scope();
    let (module, _) = globals.modules().find(|(_, m)| m.name == "M").unwrap();
    let chunk = globals.module(module).chunks[0];
    let program = globals.chunk(chunk).programs[0];
    let types: Vec<_> = globals
        .program(program)
        .fields
        .iter()
        .map(|&f| globals.field(f).ty)
        .collect();
    assert_eq!(types, vec![Some(UsageKind::Comp2), Some(UsageKind::Display)]);
    assert!(matches!(
        globals.resolve_member("COMP-4"),
        Some(Symbol::Usage(UsageKind::Comp4))
    ));
}
