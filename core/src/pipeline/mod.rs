//! The pass pipeline: pass descriptors, dependency scheduling and the
//! per-compilation context threaded through every pass.
//!
//! A pass names the passes it must run after (`depends`) and the passes it
//! must run before (`reversed_depends`). The latter lets a component slot a
//! pass in front of an existing anchor without the anchor knowing about it.

mod compiler;

#[cfg(test)]
mod pipeline_test;

use std::path::PathBuf;

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use crate::Error;
use crate::ast::{Location, Node, Transformer, Visitor, transform_tree, walk};
use crate::bytecode::BytecodeModule;
use crate::diagnostics::{CompileError, CompileErrorKind};
use crate::options::CompileOptions;
use crate::passes::Bindings;
use crate::symbols::{ChunkId, GlobalScope, ModuleId};

pub use compiler::{Compiler, ParseError, SourceParser};

pub type PassVisitor = Box<dyn Visitor<PassContext, Error>>;
pub type PassTransformer = Box<dyn Transformer<PassContext, Error>>;

/// State of one compilation, handed to every visitor and transformer.
pub struct PassContext {
    /// Symbols of the compiler instance; persists across compilations.
    pub globals: GlobalScope,
    /// Display name of the source being compiled; also its chunk name.
    pub file: String,
    pub output_path: Option<PathBuf>,
    pub options: CompileOptions,
    /// Resolution results keyed by node id.
    pub bindings: Bindings,
    /// Module and chunk of the current file, set by the declaration pass.
    pub module: Option<ModuleId>,
    pub chunk: Option<ChunkId>,
    /// Finished bytecode, set by code generation.
    pub output: Option<BytecodeModule>,
}

impl PassContext {
    pub fn new(
        globals: GlobalScope,
        file: &str,
        output_path: Option<PathBuf>,
        options: CompileOptions,
    ) -> Self {
        Self {
            globals,
            file: file.to_string(),
            output_path,
            options,
            bindings: Bindings::default(),
            module: None,
            chunk: None,
            output: None,
        }
    }

    /// A positioned error in the current file.
    pub fn error(&self, kind: CompileErrorKind, location: Location) -> Error {
        CompileError::new(kind, self.file.clone(), location).into()
    }

    /// Like [`PassContext::error`], pointing at a second location in this file.
    pub fn error_with_related(
        &self,
        kind: CompileErrorKind,
        location: Location,
        related: Location,
    ) -> Error {
        CompileError::new(kind, self.file.clone(), location)
            .with_related(self.file.clone(), related)
            .into()
    }

    /// The current file's chunk.
    ///
    /// # Panics
    ///
    /// If called before define-declare visited the module node.
    pub fn chunk(&self) -> ChunkId {
        self.chunk
            .expect("chunk of the current file (guaranteed by define-declare)")
    }
}

/// One step of the pipeline.
pub struct CompilerPass {
    pub name: &'static str,
    /// Runs over system declaration files too, not only user sources.
    pub is_declare: bool,
    /// Passes that must run before this one.
    pub depends: Vec<&'static str>,
    /// Passes that must run after this one.
    pub reversed_depends: Vec<&'static str>,
    pub visitors: Vec<PassVisitor>,
    pub transformers: Vec<PassTransformer>,
}

impl CompilerPass {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            is_declare: false,
            depends: Vec::new(),
            reversed_depends: Vec::new(),
            visitors: Vec::new(),
            transformers: Vec::new(),
        }
    }

    pub fn declare(mut self) -> Self {
        self.is_declare = true;
        self
    }

    pub fn after(mut self, pass: &'static str) -> Self {
        self.depends.push(pass);
        self
    }

    pub fn before(mut self, pass: &'static str) -> Self {
        self.reversed_depends.push(pass);
        self
    }

    pub fn visitor(mut self, visitor: impl Visitor<PassContext, Error> + 'static) -> Self {
        self.visitors.push(Box::new(visitor));
        self
    }

    pub fn transformer(
        mut self,
        transformer: impl Transformer<PassContext, Error> + 'static,
    ) -> Self {
        self.transformers.push(Box::new(transformer));
        self
    }

    /// Apply every visitor, then thread the root through every transformer.
    pub fn run(&mut self, mut root: Node, cx: &mut PassContext) -> Result<Node, Error> {
        debug!(pass = self.name, file = %cx.file, "Running pass");
        for visitor in &mut self.visitors {
            walk(visitor.as_mut(), &root, cx)?;
            visitor.cleanup(cx)?;
        }
        for transformer in &mut self.transformers {
            root = transform_tree(transformer.as_mut(), root, cx)?;
            transformer.cleanup(cx)?;
        }
        Ok(root)
    }
}

/// A bundle of passes registered together.
pub trait CompilerComponent {
    fn passes(&self) -> Vec<CompilerPass>;
}

/// Misconfigured pass dependencies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PassDependencyError {
    #[error("unresolved dependency: {pass} -> {dependency}")]
    Unresolved {
        pass: &'static str,
        dependency: &'static str,
    },

    #[error("unresolved reversed-dependency: {pass} -> {dependency}")]
    UnresolvedReversed {
        pass: &'static str,
        dependency: &'static str,
    },

    #[error("pass '{name}' is registered twice")]
    DuplicatePass { name: &'static str },

    #[error("cyclic dependency: {}", path.join(" -> "))]
    Cycle { path: Vec<&'static str> },
}

/// Order `passes` so each runs after its `depends` and before its
/// `reversed_depends`. Returns indices into `passes`.
///
/// Independent passes keep their registration order.
pub fn schedule(passes: &[CompilerPass]) -> Result<Vec<usize>, PassDependencyError> {
    let mut by_name: HashMap<&'static str, usize> = HashMap::new();
    for (index, pass) in passes.iter().enumerate() {
        if by_name.insert(pass.name, index).is_some() {
            return Err(PassDependencyError::DuplicatePass { name: pass.name });
        }
    }

    // predecessors[i]: passes that must run before passes[i]
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); passes.len()];
    for (index, pass) in passes.iter().enumerate() {
        for &dependency in &pass.depends {
            let &before = by_name
                .get(dependency)
                .ok_or(PassDependencyError::Unresolved {
                    pass: pass.name,
                    dependency,
                })?;
            predecessors[index].push(before);
        }
        for &dependency in &pass.reversed_depends {
            let &after = by_name
                .get(dependency)
                .ok_or(PassDependencyError::UnresolvedReversed {
                    pass: pass.name,
                    dependency,
                })?;
            predecessors[after].push(index);
        }
    }

    let mut order = Vec::with_capacity(passes.len());
    let mut visited = HashSet::new();
    let mut in_progress = Vec::new();
    for index in 0..passes.len() {
        visit(
            index,
            passes,
            &predecessors,
            &mut visited,
            &mut in_progress,
            &mut order,
        )?;
    }

    debug!(
        order = ?order.iter().map(|&i| passes[i].name).collect::<Vec<_>>(),
        "Scheduled passes"
    );
    Ok(order)
}

fn visit(
    index: usize,
    passes: &[CompilerPass],
    predecessors: &[Vec<usize>],
    visited: &mut HashSet<usize>,
    in_progress: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), PassDependencyError> {
    if visited.contains(&index) {
        return Ok(());
    }
    if let Some(start) = in_progress.iter().position(|&i| i == index) {
        let mut path: Vec<&'static str> =
            in_progress[start..].iter().map(|&i| passes[i].name).collect();
        path.push(passes[index].name);
        return Err(PassDependencyError::Cycle { path });
    }

    in_progress.push(index);
    for &before in &predecessors[index] {
        visit(before, passes, predecessors, visited, in_progress, order)?;
    }
    in_progress.pop();

    visited.insert(index);
    order.push(index);
    Ok(())
}
