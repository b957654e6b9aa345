use std::path::Path;

use tracing::{debug, trace};

use super::{AssembleError, BytecodeModule, Import, Instruction, Prototype, Value};
use crate::Error;

/// Append-only builder for a bytecode module.
///
/// The code generator drives this; it never looks at the produced layout.
pub trait Assembler {
    /// Start a fresh module, discarding anything assembled so far.
    fn begin_module(&mut self, name: &str);

    /// Open a prototype; instructions and fields go to it until closed.
    fn open_prototype(
        &mut self,
        name: Option<&str>,
        usings: u8,
        returnings: u8,
    ) -> Result<u16, AssembleError>;

    fn close_prototype(&mut self);

    /// Add a working-storage field to the open prototype.
    fn field(&mut self, value: Value) -> Result<u16, AssembleError>;

    /// Append a constant to the module pool. Deduplication is the caller's job.
    fn constant(&mut self, value: Value) -> Result<u16, AssembleError>;

    /// Register a cross-module callable; repeated registrations share an index.
    fn import(&mut self, module: &str, program: &str) -> Result<u16, AssembleError>;

    fn emit(&mut self, instruction: Instruction) -> Result<(), AssembleError>;

    /// Last instruction emitted into the open prototype.
    fn last_instruction(&self) -> Option<Instruction>;

    /// Write the module to `path`.
    fn serialize(&self, path: &Path) -> Result<(), Error>;

    /// Hand over the finished module.
    fn finish(&mut self) -> BytecodeModule;
}

fn index<T>(items: &[T], error: AssembleError) -> Result<u16, AssembleError> {
    u16::try_from(items.len()).map_err(|_| error)
}

/// Reference [`Assembler`] building an in-memory [`BytecodeModule`].
#[derive(Debug, Default)]
pub struct ModuleAssembler {
    name: String,
    constants: Vec<Value>,
    imports: Vec<Import>,
    prototypes: Vec<Prototype>,
    open: Option<usize>,
}

impl ModuleAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&mut self) -> Result<&mut Prototype, AssembleError> {
        let open = self.open.ok_or(AssembleError::NoOpenPrototype)?;
        Ok(&mut self.prototypes[open])
    }

    fn snapshot(&self) -> BytecodeModule {
        BytecodeModule {
            name: self.name.clone(),
            constants: self.constants.clone(),
            imports: self.imports.clone(),
            prototypes: self.prototypes.clone(),
        }
    }
}

impl Assembler for ModuleAssembler {
    fn begin_module(&mut self, name: &str) {
        *self = Self {
            name: name.to_string(),
            ..Self::default()
        };
    }

    fn open_prototype(
        &mut self,
        name: Option<&str>,
        usings: u8,
        returnings: u8,
    ) -> Result<u16, AssembleError> {
        let index = index(&self.prototypes, AssembleError::TooManyPrototypes)?;
        trace!(index, name, usings, returnings, "Opening prototype");
        self.prototypes.push(Prototype {
            name: name.map(str::to_string),
            usings,
            returnings,
            fields: Vec::new(),
            code: Vec::new(),
        });
        self.open = Some(index as usize);
        Ok(index)
    }

    fn close_prototype(&mut self) {
        self.open = None;
    }

    fn field(&mut self, value: Value) -> Result<u16, AssembleError> {
        let proto = self.current()?;
        let index = index(&proto.fields, AssembleError::TooManyFields)?;
        proto.fields.push(value);
        Ok(index)
    }

    fn constant(&mut self, value: Value) -> Result<u16, AssembleError> {
        let index = index(&self.constants, AssembleError::TooManyConstants)?;
        trace!(index, %value, "Allocated constant");
        self.constants.push(value);
        Ok(index)
    }

    fn import(&mut self, module: &str, program: &str) -> Result<u16, AssembleError> {
        if let Some(existing) = self
            .imports
            .iter()
            .position(|i| i.module == module && i.program == program)
        {
            return Ok(existing as u16);
        }
        let index = index(&self.imports, AssembleError::TooManyImports)?;
        self.imports.push(Import {
            module: module.to_string(),
            program: program.to_string(),
        });
        Ok(index)
    }

    fn emit(&mut self, instruction: Instruction) -> Result<(), AssembleError> {
        self.current()?.code.push(instruction);
        Ok(())
    }

    fn last_instruction(&self) -> Option<Instruction> {
        let open = self.open?;
        self.prototypes[open].code.last().copied()
    }

    fn serialize(&self, path: &Path) -> Result<(), Error> {
        let bytes = self.snapshot().to_bytes()?;
        std::fs::write(path, bytes).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), module = %self.name, "Wrote bytecode module");
        Ok(())
    }

    fn finish(&mut self) -> BytecodeModule {
        self.open = None;
        BytecodeModule {
            name: core::mem::take(&mut self.name),
            constants: core::mem::take(&mut self.constants),
            imports: core::mem::take(&mut self.imports),
            prototypes: core::mem::take(&mut self.prototypes),
        }
    }
}
