//! Top-level error type of the compiler.

use std::path::PathBuf;

use crate::ast::RootReplaced;
use crate::bytecode::AssembleError;
use crate::diagnostics::{CompileError, Diagnostic};
use crate::pipeline::PassDependencyError;

/// Anything that aborts a compilation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The registered passes cannot be ordered.
    #[error(transparent)]
    PassDependency(#[from] PassDependencyError),

    /// A positioned error in a source file.
    #[error(transparent)]
    Compilation(#[from] CompileError),

    /// A transformer replaced the root of the tree.
    #[error(transparent)]
    RootReplaced(#[from] RootReplaced),

    /// The generated module exceeds a limit of the bytecode format.
    #[error("{0}")]
    Assemble(#[from] AssembleError),

    /// The source was compiled but produced no module.
    #[error("{file}: no module was generated")]
    NoModule { file: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("cannot serialize bytecode module: {0}")]
    Serialize(#[from] postcard::Error),
}

impl Error {
    /// The positioned diagnostic, for errors that point into a source file.
    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        match self {
            Error::Compilation(err) => Some(err.to_diagnostic()),
            _ => None,
        }
    }

    pub fn as_compile_error(&self) -> Option<&CompileError> {
        match self {
            Error::Compilation(err) => Some(err),
            _ => None,
        }
    }
}
