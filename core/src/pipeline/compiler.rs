use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use super::{CompilerComponent, CompilerPass, PassContext, schedule};
use crate::Error;
use crate::ast::{Location, Node};
use crate::bytecode::BytecodeModule;
use crate::diagnostics::{CompileError, CompileErrorKind};
use crate::options::CompileOptions;
use crate::passes::CoreComponent;
use crate::symbols::GlobalScope;

/// Suffix of system declaration files.
const DECLARATION_SUFFIX: &str = ".d.cbl";

/// Malformed source, reported by a [`SourceParser`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub location: Location,
}

/// Turns source bytes into a syntax tree rooted at a `Module` node.
pub trait SourceParser {
    fn parse(&self, source: &[u8], display_name: &str, free_format: bool)
    -> Result<Node, ParseError>;
}

/// Drives the pass pipeline over source files.
///
/// One instance owns one [`GlobalScope`]; declarations from every file it
/// compiles, system declarations included, stay visible to later files.
pub struct Compiler {
    options: CompileOptions,
    parser: Box<dyn SourceParser>,
    passes: Vec<CompilerPass>,
    order: Option<Vec<usize>>,
    globals: GlobalScope,
    declarations_loaded: bool,
}

impl Compiler {
    /// A compiler with the core passes registered.
    pub fn new(options: CompileOptions, parser: Box<dyn SourceParser>) -> Self {
        let mut compiler = Self {
            options,
            parser,
            passes: Vec::new(),
            order: None,
            globals: GlobalScope::new(),
            declarations_loaded: false,
        };
        compiler.add_component(&CoreComponent);
        compiler
    }

    /// Register more passes. The pass order is recomputed on next use.
    pub fn add_component(&mut self, component: &dyn CompilerComponent) {
        self.passes.extend(component.passes());
        self.order = None;
    }

    pub fn global_scope(&self) -> &GlobalScope {
        &self.globals
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Names of the registered passes in execution order.
    pub fn pass_order(&mut self) -> Result<Vec<&'static str>, Error> {
        let order = self.ordered()?;
        Ok(order.iter().map(|&i| self.passes[i].name).collect())
    }

    fn ordered(&mut self) -> Result<Vec<usize>, Error> {
        if let Some(order) = &self.order {
            return Ok(order.clone());
        }
        let order = schedule(&self.passes)?;
        self.order = Some(order.clone());
        Ok(order)
    }

    /// Compile the file at `input`, writing bytecode to `output` if given.
    pub fn compile(
        &mut self,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<BytecodeModule, Error> {
        let source = read(input)?;
        self.compile_source(&source, &input.display().to_string(), output)
    }

    /// Compile in-memory source through the full pipeline.
    pub fn compile_source(
        &mut self,
        source: &[u8],
        name: &str,
        output: Option<&Path>,
    ) -> Result<BytecodeModule, Error> {
        let order = self.ordered()?;
        self.load_system_declarations()?;

        let mut cx = self.run(&order, source, name, output.map(Path::to_path_buf), false)?;
        cx.output.take().ok_or_else(|| Error::NoModule {
            file: name.to_string(),
        })
    }

    /// Run only the declaration passes over `source`, making its programs
    /// visible to later compilations.
    pub fn declare_source(&mut self, source: &[u8], name: &str) -> Result<(), Error> {
        let order = self.ordered()?;
        self.run(&order, source, name, None, true)?;
        Ok(())
    }

    fn run(
        &mut self,
        order: &[usize],
        source: &[u8],
        name: &str,
        output_path: Option<PathBuf>,
        declare_only: bool,
    ) -> Result<PassContext, Error> {
        let mut root = self
            .parser
            .parse(source, name, self.options.free_format)
            .map_err(|err| {
                CompileError::new(
                    CompileErrorKind::Parse {
                        message: err.message,
                    },
                    name,
                    err.location,
                )
            })?;

        let globals = std::mem::take(&mut self.globals);
        let mut cx = PassContext::new(globals, name, output_path, self.options.clone());
        let mut result = Ok(());
        for &index in order {
            let pass = &mut self.passes[index];
            if declare_only && !pass.is_declare {
                continue;
            }
            match pass.run(root, &mut cx) {
                Ok(next) => root = next,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }

        // The symbols stay with the compiler even when a pass failed.
        self.globals = std::mem::take(&mut cx.globals);
        result.map(|()| cx)
    }

    /// Declare every system file, once per compiler instance.
    fn load_system_declarations(&mut self) -> Result<(), Error> {
        if self.declarations_loaded {
            return Ok(());
        }
        let Some(root) = self.options.system_declarations.clone() else {
            self.declarations_loaded = true;
            return Ok(());
        };
        let files = find_declarations(&root)?;
        debug!(root = %root.display(), count = files.len(), "Loading system declarations");
        for file in files {
            trace!(file = %file.display(), "Declaring");
            let source = read(&file)?;
            self.declare_source(&source, &file.display().to_string())?;
        }
        self.declarations_loaded = true;
        Ok(())
    }
}

fn read(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// `*.d.cbl` files under `root`, recursively, in path order.
///
/// A missing `root` yields no files.
pub(crate) fn find_declarations(root: &Path) -> Result<Vec<PathBuf>, Error> {
    if !root.is_dir() {
        debug!(root = %root.display(), "No system declaration directory");
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        let is_declaration = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(DECLARATION_SUFFIX));
        if entry.file_type().is_file() && is_declaration {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
