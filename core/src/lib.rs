//! Core of the cbl compiler: syntax tree, symbols, pass pipeline and
//! bytecode generation.
//!
//! Source text is turned into a tree by a [`SourceParser`] supplied by the
//! embedder; everything after that happens here.

pub mod ast;
pub mod bytecode;
pub mod decimal;
pub mod diagnostics;
mod error;
pub mod options;
pub mod passes;
pub mod pipeline;
pub mod symbols;

pub use bytecode::{Assembler, BytecodeModule, Instruction, ModuleAssembler, Prototype, Value};
pub use diagnostics::{CompileError, CompileErrorKind, Diagnostic, RelatedInfo, Severity};
pub use error::Error;
pub use options::{CompileOptions, FractionPolicy};
pub use pipeline::{
    Compiler, CompilerComponent, CompilerPass, ParseError, PassContext, PassDependencyError,
    SourceParser,
};

/// Test utilities for enabling logging in tests
#[cfg(test)]
pub mod test_utils {
    /// Initialize tracing subscriber for tests with DEBUG level
    /// Call this at the start of tests where you want to see logging output
    pub fn init_test_logging() {
        use tracing_subscriber::{EnvFilter, fmt};

        // Try to initialize, ignore error if already initialized
        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}
