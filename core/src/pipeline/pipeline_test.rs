use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use super::*;
use crate::ast::{Kind, build};
use crate::passes::{
    BYTECODE_GENERATION, CHECK_PROCEDURE_TYPE, DEFINE_DECLARE, DISPLAY_STATEMENT, END_MARKER,
    RESOLVE_DECLARE, RESOLVE_EXPRESSION_TYPE, RESOLVE_PROCEDURE_SYMBOL, REVERSE_CALL_USINGS,
    STATIC_TYPING,
};

struct NoParser;

impl SourceParser for NoParser {
    fn parse(&self, _: &[u8], _: &str, _: bool) -> Result<Node, ParseError> {
        Err(ParseError {
            message: "no parser".to_string(),
            location: Location::default(),
        })
    }
}

fn options() -> CompileOptions {
    CompileOptions {
        system_declarations: None,
        ..CompileOptions::default()
    }
}

fn names(passes: &[CompilerPass], order: &[usize]) -> Vec<&'static str> {
    order.iter().map(|&i| passes[i].name).collect()
}

#[test]
fn test_schedule_keeps_registration_order_of_independent_passes() {
    let passes = vec![
        CompilerPass::new("a"),
        CompilerPass::new("b"),
        CompilerPass::new("c"),
    ];
    let order = schedule(&passes).unwrap();
    assert_eq!(names(&passes, &order), vec!["a", "b", "c"]);
}

#[test]
fn test_schedule_runs_dependencies_first() {
    let passes = vec![
        CompilerPass::new("late").after("middle"),
        CompilerPass::new("middle").after("early"),
        CompilerPass::new("early"),
    ];
    let order = schedule(&passes).unwrap();
    assert_eq!(names(&passes, &order), vec!["early", "middle", "late"]);
}

#[test]
fn test_schedule_reversed_dependency_slots_in_front_of_anchor() {
    let passes = vec![
        CompilerPass::new("parse"),
        CompilerPass::new("anchor").after("parse"),
        CompilerPass::new("emit").after("anchor"),
        CompilerPass::new("check").after("parse").before("anchor"),
    ];
    let order = schedule(&passes).unwrap();
    assert_eq!(
        names(&passes, &order),
        vec!["parse", "check", "anchor", "emit"]
    );
}

#[test]
fn test_schedule_unresolved_dependency() {
    let passes = vec![CompilerPass::new("a").after("missing")];
    assert_eq!(
        schedule(&passes).unwrap_err(),
        PassDependencyError::Unresolved {
            pass: "a",
            dependency: "missing",
        }
    );
}

#[test]
fn test_schedule_unresolved_reversed_dependency() {
    let passes = vec![CompilerPass::new("a").before("missing")];
    let err = schedule(&passes).unwrap_err();
    assert_eq!(
        err,
        PassDependencyError::UnresolvedReversed {
            pass: "a",
            dependency: "missing",
        }
    );
    assert_eq!(err.to_string(), "unresolved reversed-dependency: a -> missing");
}

#[test]
fn test_schedule_duplicate_pass() {
    let passes = vec![CompilerPass::new("a"), CompilerPass::new("a")];
    assert_eq!(
        schedule(&passes).unwrap_err(),
        PassDependencyError::DuplicatePass { name: "a" }
    );
}

#[test]
fn test_schedule_cycle_reports_path() {
    let passes = vec![
        CompilerPass::new("a").after("c"),
        CompilerPass::new("b").after("a"),
        CompilerPass::new("c").after("b"),
    ];
    let err = schedule(&passes).unwrap_err();
    assert_eq!(
        err,
        PassDependencyError::Cycle {
            path: vec!["a", "c", "b", "a"],
        }
    );
    assert_eq!(err.to_string(), "cyclic dependency: a -> c -> b -> a");
}

#[test]
fn test_schedule_cycle_through_reversed_dependency() {
    let passes = vec![
        CompilerPass::new("a").after("b"),
        CompilerPass::new("b").before("a").after("a"),
    ];
    assert!(matches!(
        schedule(&passes),
        Err(PassDependencyError::Cycle { .. })
    ));
}

#[test]
fn test_core_pass_order() {
    crate::test_utils::init_test_logging();
    let mut compiler = Compiler::new(options(), Box::new(NoParser));
    assert_eq!(
        compiler.pass_order().unwrap(),
        vec![
            DEFINE_DECLARE,
            END_MARKER,
            RESOLVE_DECLARE,
            DISPLAY_STATEMENT,
            RESOLVE_PROCEDURE_SYMBOL,
            RESOLVE_EXPRESSION_TYPE,
            CHECK_PROCEDURE_TYPE,
            STATIC_TYPING,
            REVERSE_CALL_USINGS,
            BYTECODE_GENERATION,
        ]
    );
}

struct LintComponent;

impl CompilerComponent for LintComponent {
    fn passes(&self) -> Vec<CompilerPass> {
        vec![
            CompilerPass::new("lint")
                .after(CHECK_PROCEDURE_TYPE)
                .before(STATIC_TYPING),
        ]
    }
}

#[test]
fn test_add_component_recomputes_order() {
    let mut compiler = Compiler::new(options(), Box::new(NoParser));
    let before = compiler.pass_order().unwrap();
    assert!(!before.contains(&"lint"));

    compiler.add_component(&LintComponent);
    let after = compiler.pass_order().unwrap();
    let position = |name| after.iter().position(|&p| p == name).unwrap();
    assert!(position(CHECK_PROCEDURE_TYPE) < position("lint"));
    assert!(position("lint") < position(STATIC_TYPING));
    assert_eq!(after.len(), before.len() + 1);
}

struct BrokenComponent;

impl CompilerComponent for BrokenComponent {
    fn passes(&self) -> Vec<CompilerPass> {
        vec![CompilerPass::new("broken").after("no-such-pass")]
    }
}

#[test]
fn test_compile_reports_bad_dependencies_before_parsing() {
    let mut compiler = Compiler::new(options(), Box::new(NoParser));
    compiler.add_component(&BrokenComponent);
    let err = compiler.compile_source(b"", "a.cbl", None).unwrap_err();
    assert!(matches!(
        err,
        Error::PassDependency(PassDependencyError::Unresolved {
            pass: "broken",
            dependency: "no-such-pass",
        })
    ));
}

#[test]
fn test_parse_error_becomes_compile_error() {
    let mut compiler = Compiler::new(options(), Box::new(NoParser));
    let err = compiler.compile_source(b"", "a.cbl", None).unwrap_err();
    let err = err.as_compile_error().unwrap();
    assert_eq!(err.file, "a.cbl");
    assert_eq!(err.kind.to_string(), "no parser");
}

/// Records which node kinds it entered and left.
struct Recorder {
    log: Rc<RefCell<Vec<String>>>,
    tag: &'static str,
}

impl Visitor<PassContext, Error> for Recorder {
    fn enter(&mut self, node: &Node, _cx: &mut PassContext) -> Result<(), Error> {
        if node.is(Kind::Program) {
            self.log.borrow_mut().push(format!("{} enter", self.tag));
        }
        Ok(())
    }

    fn leave(&mut self, node: &Node, _cx: &mut PassContext) -> Result<(), Error> {
        if node.is(Kind::Program) {
            self.log.borrow_mut().push(format!("{} leave", self.tag));
        }
        Ok(())
    }

    fn cleanup(&mut self, _cx: &mut PassContext) -> Result<(), Error> {
        self.log.borrow_mut().push(format!("{} cleanup", self.tag));
        Ok(())
    }
}

struct DropGoback;

impl Transformer<PassContext, Error> for DropGoback {
    fn transform(&mut self, node: Node, _cx: &mut PassContext) -> Result<Vec<Node>, Error> {
        if node.is(Kind::GobackStatement) {
            return Ok(Vec::new());
        }
        Ok(vec![node])
    }
}

#[test]
fn test_pass_runs_visitors_then_transformers() {
    crate::test_utils::init_test_logging();
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut pass = CompilerPass::new("record")
        .visitor(Recorder {
            log: log.clone(),
            tag: "first",
        })
        .visitor(Recorder {
            log: log.clone(),
            tag: "second",
        })
        .transformer(DropGoback);

    let root = build::module(
        "M",
        vec![build::program("P", vec![build::procedure(&[], &[], vec![build::goback()])])],
    );
    let mut cx = PassContext::new(GlobalScope::new(), "m.cbl", None, options());
    let root = pass.run(root, &mut cx).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "first enter",
            "first leave",
            "first cleanup",
            "second enter",
            "second leave",
            "second cleanup",
        ]
    );
    assert!(root.first(Kind::GobackStatement).is_none());
    assert!(root.first(Kind::ProcedureDivision).is_some());
}
