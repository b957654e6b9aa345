//! Stack-machine bytecode produced by the code generator.
//!
//! # Stack Discipline
//!
//! A prototype's frame starts at the operand stack position where the caller
//! left its arguments. Caller-supplied usings sit *below* the frame and are
//! addressed with negative indices (`-1` is the first using); returnings and
//! other linkage locals are materialized at indices `0, 1, ...` on entry.
//!
//! Stack effect notation: `[..., operand1, operand2] -> [..., result]`
//!
//! The on-disk encoding is postcard over the serde derives below; nothing
//! else depends on it.

mod assembler;


use core::fmt;

use serde::{Deserialize, Serialize};

pub use assembler::{Assembler, ModuleAssembler};

/// A single VM instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Push module constant. Stack: `[...] -> [..., value]`
    Load(u16),
    /// Push working-storage field of the current prototype. Stack: `[...] -> [..., value]`
    LoadField(u16),
    /// Pop into working-storage field. Stack: `[..., value] -> [...]`
    Store(u16),
    /// Push a copy of the frame slot. Stack: `[...] -> [..., value]`
    Push(i16),
    /// Pop into the frame slot. Stack: `[..., value] -> [...]`
    Replace(i16),
    /// Discard the top of the stack. Stack: `[..., value] -> [...]`
    Pop,
    /// Push the imported callable. Stack: `[...] -> [..., callable]`
    Import(u16),
    /// Push a prototype of this module. Stack: `[...] -> [..., callable]`
    Proto(u16),
    /// Call with `usings` arguments on top of the callable.
    ///
    /// Stack: `[..., callable, argN, ..., arg1] -> [..., callable, argN', ..., arg1', ret1, ..., retR]`
    /// Arguments are left in place (possibly modified) for the caller to copy back.
    Call { usings: u8, returnings: u8 },
    /// Return to the caller.
    Return,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Load(i) => write!(f, "LOAD {}", i),
            Instruction::LoadField(i) => write!(f, "LOAD_FIELD {}", i),
            Instruction::Store(i) => write!(f, "STORE {}", i),
            Instruction::Push(i) => write!(f, "PUSH {}", i),
            Instruction::Replace(i) => write!(f, "REPLACE {}", i),
            Instruction::Pop => write!(f, "POP"),
            Instruction::Import(i) => write!(f, "IMPORT {}", i),
            Instruction::Proto(i) => write!(f, "PROTO {}", i),
            Instruction::Call { usings, returnings } => {
                write!(f, "CALL {} {}", usings, returnings)
            }
            Instruction::Return => write!(f, "RETURN"),
        }
    }
}

/// A constant or field initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Comp2(f64),
    /// Fixed-point: `digits / 10^scale`, `digits` with optional leading `-`.
    Comp4 {
        precision: u32,
        scale: u32,
        digits: String,
    },
    Display(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Comp2(v) => write!(f, "COMP-2 {}", v),
            Value::Comp4 {
                precision,
                scale,
                digits,
            } => write!(f, "COMP-4 {}@{}.{}", digits, precision, scale),
            Value::Display(s) => write!(f, "DISPLAY {:?}", s),
        }
    }
}

/// A cross-module reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Import {
    pub module: String,
    pub program: String,
}

/// One callable: a compiled program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    /// Entry point name; `None` for programs not exported from the module.
    pub name: Option<String>,
    pub usings: u8,
    pub returnings: u8,
    /// Working-storage fields with their initial values.
    pub fields: Vec<Value>,
    pub code: Vec<Instruction>,
}

/// A finished compilation unit.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodeModule {
    pub name: String,
    pub constants: Vec<Value>,
    pub imports: Vec<Import>,
    pub prototypes: Vec<Prototype>,
}

impl BytecodeModule {
    /// Exported prototypes, the module's callable entry points.
    pub fn entries(&self) -> impl Iterator<Item = &Prototype> {
        self.prototypes.iter().filter(|p| p.name.is_some())
    }

    pub fn entry(&self, name: &str) -> Option<&Prototype> {
        self.entries().find(|p| p.name.as_deref() == Some(name))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl fmt::Debug for BytecodeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Module {} {{", self.name)?;

        if self.constants.is_empty() {
            writeln!(f, "  constants: []")?;
        } else {
            writeln!(f, "  constants: [")?;
            for (i, constant) in self.constants.iter().enumerate() {
                writeln!(f, "    [{}] = {}", i, constant)?;
            }
            writeln!(f, "  ]")?;
        }

        for (i, import) in self.imports.iter().enumerate() {
            writeln!(f, "  import [{}] = {}.{}", i, import.module, import.program)?;
        }

        for (i, proto) in self.prototypes.iter().enumerate() {
            writeln!(
                f,
                "  proto [{}] {} ({} -> {}) {{",
                i,
                proto.name.as_deref().unwrap_or("<anonymous>"),
                proto.usings,
                proto.returnings
            )?;
            for (j, field) in proto.fields.iter().enumerate() {
                writeln!(f, "    field [{}] = {}", j, field)?;
            }
            for (addr, instr) in proto.code.iter().enumerate() {
                writeln!(f, "    {:4}  {}", addr, instr)?;
            }
            writeln!(f, "  }}")?;
        }

        write!(f, "}}")
    }
}

/// Limits of the module format, hit only by very large programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssembleError {
    /// Too many constants in the pool (limit: 65536)
    TooManyConstants,
    /// Too many working-storage fields in one prototype (limit: 65536)
    TooManyFields,
    /// Too many imports (limit: 65536)
    TooManyImports,
    /// Too many prototypes (limit: 65536)
    TooManyPrototypes,
    /// Too many usings or returnings in one call (limit: 255)
    TooManyArguments,
    /// Too many linkage slots in one frame (limit: 32767)
    TooManySlots,
    /// Instruction or field emitted outside of any prototype
    NoOpenPrototype,
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssembleError::TooManyConstants => write!(f, "Too many constants (limit: 65536)"),
            AssembleError::TooManyFields => {
                write!(f, "Too many working-storage fields (limit: 65536)")
            }
            AssembleError::TooManyImports => write!(f, "Too many imports (limit: 65536)"),
            AssembleError::TooManyPrototypes => write!(f, "Too many programs (limit: 65536)"),
            AssembleError::TooManyArguments => {
                write!(f, "Too many call arguments (limit: 255)")
            }
            AssembleError::TooManySlots => write!(f, "Too many linkage fields (limit: 32767)"),
            AssembleError::NoOpenPrototype => write!(f, "No prototype is open"),
        }
    }
}

impl std::error::Error for AssembleError {}
