//! Symbols and the nested scopes that own them.
//!
//! Scopes nest strictly: the [`GlobalScope`] owns modules, a module owns one
//! chunk per contributing source file, a chunk owns the programs declared in
//! that file, and a program owns its fields in two tables (working-storage
//! and linkage). All of them live in one arena inside [`GlobalScope`] and
//! refer to each other through typed ids, so an enclosing scope is just an id.
//!
//! Tables never check for shadowing on [`Scope::define`]; detecting a
//! redefinition is the job of the pass doing the defining.

mod global;


use core::fmt;

use hashbrown::HashMap;

use crate::ast::{Location, NodeId};
use crate::decimal::{Comp4Field, PictureSegment};

pub use global::{ChunkSymbol, GlobalScope, ModuleSymbol, ProgramSymbol};

/// Storage usage of a field, also used as the static type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageKind {
    /// Double precision float.
    Comp2,
    /// Fixed-point decimal, at most 18 digits.
    Comp4,
    /// Character string.
    Display,
    /// Parameter-only wildcard, compatible with every other usage.
    Any,
}

impl UsageKind {
    pub const ALL: [UsageKind; 4] = [
        UsageKind::Comp2,
        UsageKind::Comp4,
        UsageKind::Display,
        UsageKind::Any,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            UsageKind::Comp2 => "COMP-2",
            UsageKind::Comp4 => "COMP-4",
            UsageKind::Display => "DISPLAY",
            UsageKind::Any => "ANY",
        }
    }

    pub fn from_tag(tag: &str) -> Option<UsageKind> {
        UsageKind::ALL.into_iter().find(|u| u.tag() == tag)
    }

    /// Whether a value of usage `found` can be passed where `self` is declared.
    pub fn accepts(self, found: UsageKind) -> bool {
        self == UsageKind::Any || self == found
    }
}

impl fmt::Display for UsageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Static type of a call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprType {
    Usage(UsageKind),
    /// A number literal; takes the shape of whichever numeric usage receives it.
    NumericLiteral,
}

impl ExprType {
    /// Whether this can be passed to a parameter declared with `param`.
    pub fn fits(self, param: UsageKind) -> bool {
        match self {
            ExprType::Usage(usage) => param.accepts(usage),
            ExprType::NumericLiteral => matches!(
                param,
                UsageKind::Comp2 | UsageKind::Comp4 | UsageKind::Any
            ),
        }
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprType::Usage(usage) => write!(f, "{}", usage),
            ExprType::NumericLiteral => f.write_str("numeric literal"),
        }
    }
}

macro_rules! arena_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u32);

            impl $name {
                pub(crate) fn new(index: usize) -> Self {
                    Self(index as u32)
                }

                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

arena_id! {
    /// Index of a [`ModuleSymbol`] in the [`GlobalScope`] arena.
    ModuleId,
    /// Index of a [`ChunkSymbol`] in the [`GlobalScope`] arena.
    ChunkId,
    /// Index of a [`ProgramSymbol`] in the [`GlobalScope`] arena.
    ProgramId,
    /// Index of a [`FieldSymbol`] in the [`GlobalScope`] arena.
    FieldId,
}

/// A scope, addressed by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeId {
    Global,
    Module(ModuleId),
    Chunk(ChunkId),
    Program(ProgramId),
}

/// Data division section a field was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    WorkingStorage,
    Linkage,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::WorkingStorage => f.write_str("WORKING-STORAGE"),
            Section::Linkage => f.write_str("LINKAGE"),
        }
    }
}

/// A field reference together with the table it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub id: FieldId,
    pub section: Section,
}

/// Anything a name can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Usage(UsageKind),
    Module(ModuleId),
    Chunk(ChunkId),
    Program(ProgramId),
    Field(FieldRef),
}

/// A named table of symbols with a link to the scope around it.
pub trait Scope {
    /// The scope consulted when a name is not found here; `None` at the top.
    fn enclosing_scope(&self) -> Option<ScopeId>;

    /// Insert into this scope's own table, replacing any previous entry.
    fn define(&mut self, name: &str, symbol: Symbol);

    /// Look `name` up in this scope only.
    fn resolve_member(&self, name: &str) -> Option<Symbol>;
}

/// Flat name to symbol map backing every scope.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn define(&mut self, name: &str, symbol: Symbol) {
        self.symbols.insert(name.to_string(), symbol);
    }

    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Default value written in a field's VALUE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Number(String),
    String(String),
}

/// Usage-specific storage details of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldStorage {
    Plain,
    Comp4(Comp4Field),
}

/// A data item declared in a program's data division.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSymbol {
    pub name: String,
    pub section: Section,
    pub level: u32,
    pub usage: UsageKind,
    /// PICTURE clause with adjacent same-character segments merged.
    pub picture: Option<Vec<PictureSegment>>,
    /// Resolved usage type, attached by the resolve-declare pass.
    pub ty: Option<UsageKind>,
    pub node: NodeId,
    pub location: Location,
    pub default: Option<DefaultValue>,
    pub storage: FieldStorage,
}

impl FieldSymbol {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn comp4(&self) -> Option<&Comp4Field> {
        match &self.storage {
            FieldStorage::Comp4(field) => Some(field),
            FieldStorage::Plain => None,
        }
    }

    /// Static type of the field: the resolved type, else its declared usage.
    pub fn usage_type(&self) -> UsageKind {
        self.ty.unwrap_or(self.usage)
    }
}
