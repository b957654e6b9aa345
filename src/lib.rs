//! cbl - an ahead-of-time compiler for a COBOL dialect
//!
//! # Overview
//!
//! Source files are turned into a compact stack-machine bytecode module.
//! Compilation runs as a pipeline of passes over a shared syntax tree:
//! declarations are defined and checked, call sites are resolved and typed,
//! and finally bytecode is generated.
//!
//! The grammar is not part of this crate: embedders plug in a
//! [`SourceParser`] that produces the syntax tree.
//!
//! # Quick Start
//!
//! ```ignore
//! use cbl::{Compiler, CompileOptions, render_error};
//!
//! let mut compiler = Compiler::new(CompileOptions::default(), Box::new(MyParser));
//! match compiler.compile("hello.cbl".as_ref(), Some("hello.cbc".as_ref())) {
//!     Ok(module) => println!("{:?}", module),
//!     Err(e) => render_error(&e, &std::fs::read_to_string("hello.cbl").unwrap()),
//! }
//! ```
//!
//! # Extending the Pipeline
//!
//! A [`CompilerComponent`] contributes extra [`CompilerPass`]es. Each pass
//! names the passes it runs after and before, and the compiler orders all
//! registered passes accordingly.

mod error_renderer;

pub use cbl_core::{ast, bytecode, decimal, diagnostics, options, passes, pipeline, symbols};

pub use cbl_core::{
    Assembler, BytecodeModule, CompileError, CompileErrorKind, CompileOptions, Compiler,
    CompilerComponent, CompilerPass, Diagnostic, Error, FractionPolicy, Instruction,
    ModuleAssembler, ParseError, PassContext, PassDependencyError, Prototype, RelatedInfo,
    Severity, SourceParser, Value,
};

pub use error_renderer::{
    render_error, render_error_to, render_error_to_string, render_error_to_string_no_color,
};
