//! Shared fixtures: a parser that hands out prebuilt trees by file name.
#![allow(dead_code)]

use std::collections::HashMap;

use cbl_core::ast::{Location, Node, build};
use cbl_core::symbols::UsageKind;
use cbl_core::{
    BytecodeModule, CompileError, CompileErrorKind, CompileOptions, Compiler, Error, ParseError,
    SourceParser,
};

pub const SYSTEM_FILE: &str = "system.d.cbl";

#[derive(Default)]
pub struct FixtureParser {
    trees: HashMap<String, Node>,
}

impl FixtureParser {
    pub fn new(files: Vec<(&str, Node)>) -> Self {
        Self {
            trees: files
                .into_iter()
                .map(|(name, tree)| (name.to_string(), tree))
                .collect(),
        }
    }
}

impl SourceParser for FixtureParser {
    fn parse(
        &self,
        _source: &[u8],
        display_name: &str,
        _free_format: bool,
    ) -> Result<Node, ParseError> {
        self.trees
            .get(display_name)
            .cloned()
            .ok_or_else(|| ParseError {
                message: format!("no fixture named {}", display_name),
                location: Location::default(),
            })
    }
}

/// Options that skip the on-disk system declaration warm-up.
pub fn options() -> CompileOptions {
    CompileOptions {
        system_declarations: None,
        ..CompileOptions::default()
    }
}

pub fn compiler(files: Vec<(&str, Node)>) -> Compiler {
    Compiler::new(options(), Box::new(FixtureParser::new(files)))
}

/// A compiler that already declared the `SYSTEM` module.
pub fn compiler_with_system(mut files: Vec<(&str, Node)>) -> Compiler {
    files.push((SYSTEM_FILE, system_module()));
    let mut compiler = compiler(files);
    compiler
        .declare_source(b"", SYSTEM_FILE)
        .expect("system declarations");
    compiler
}

/// Compile `tree` as `main.cbl` on a fresh compiler.
pub fn compile(tree: Node) -> Result<BytecodeModule, Error> {
    compiler(vec![("main.cbl", tree)]).compile_source(b"", "main.cbl", None)
}

pub fn compile_with_system(tree: Node) -> Result<BytecodeModule, Error> {
    compiler_with_system(vec![("main.cbl", tree)]).compile_source(b"", "main.cbl", None)
}

#[track_caller]
pub fn compile_error(result: Result<BytecodeModule, Error>) -> CompileError {
    match result {
        Ok(module) => panic!("expected a compile error, got {:?}", module),
        Err(Error::Compilation(err)) => err,
        Err(other) => panic!("expected a compile error, got {}", other),
    }
}

#[track_caller]
pub fn error_kind(result: Result<BytecodeModule, Error>) -> CompileErrorKind {
    compile_error(result).kind
}

/// `SYSTEM` exporting `DISPLAY`, which takes one value of any usage.
pub fn system_module() -> Node {
    build::module(
        "SYSTEM",
        vec![build::program(
            "DISPLAY",
            vec![
                build::export(),
                build::data_division(vec![build::linkage(vec![field(
                    "ITEM",
                    UsageKind::Any,
                    vec![],
                )])]),
                build::procedure(&["ITEM"], &[], vec![]),
            ],
        )],
    )
}

/// A level-01 field with a usage clause followed by `clauses`.
pub fn field(name: &str, usage: UsageKind, clauses: Vec<Node>) -> Node {
    let mut all = vec![build::usage(usage)];
    all.extend(clauses);
    build::field(1, name, all)
}

/// A program with the given sections and procedure division.
pub fn program(
    name: &str,
    exported: bool,
    working: Vec<Node>,
    linkage: Vec<Node>,
    procedure: Node,
) -> Node {
    let mut parts = Vec::new();
    if exported {
        parts.push(build::export());
    }
    let mut sections = Vec::new();
    if !working.is_empty() {
        sections.push(build::working_storage(working));
    }
    if !linkage.is_empty() {
        sections.push(build::linkage(linkage));
    }
    if !sections.is_empty() {
        parts.push(build::data_division(sections));
    }
    parts.push(procedure);
    build::program(name, parts)
}
