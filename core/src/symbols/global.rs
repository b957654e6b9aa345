use tracing::trace;

use super::{
    ChunkId, FieldId, FieldRef, FieldSymbol, ModuleId, ProgramId, Scope, ScopeId, Section,
    Symbol, SymbolTable, UsageKind,
};
use crate::ast::Location;

/// A logical module; several source files may contribute to it.
///
/// Its table holds the chunks and the programs exported by any of them.
#[derive(Debug, Clone)]
pub struct ModuleSymbol {
    pub name: String,
    pub chunks: Vec<ChunkId>,
    table: SymbolTable,
}

impl Scope for ModuleSymbol {
    fn enclosing_scope(&self) -> Option<ScopeId> {
        Some(ScopeId::Global)
    }

    fn define(&mut self, name: &str, symbol: Symbol) {
        self.table.define(name, symbol);
    }

    fn resolve_member(&self, name: &str) -> Option<Symbol> {
        self.table.get(name)
    }
}

/// The programs declared in one source file of a module.
#[derive(Debug, Clone)]
pub struct ChunkSymbol {
    pub name: String,
    pub module: ModuleId,
    pub programs: Vec<ProgramId>,
    table: SymbolTable,
}

impl Scope for ChunkSymbol {
    fn enclosing_scope(&self) -> Option<ScopeId> {
        Some(ScopeId::Module(self.module))
    }

    fn define(&mut self, name: &str, symbol: Symbol) {
        self.table.define(name, symbol);
    }

    fn resolve_member(&self, name: &str) -> Option<Symbol> {
        self.table.get(name)
    }
}

/// A program and its two field tables.
#[derive(Debug, Clone)]
pub struct ProgramSymbol {
    pub name: String,
    pub chunk: ChunkId,
    pub exported: bool,
    pub location: Location,
    /// Fields of both sections, in declaration order.
    pub fields: Vec<FieldId>,
    /// Procedure parameters, in signature order.
    pub usings: Vec<FieldId>,
    /// Procedure results, in signature order.
    pub returnings: Vec<FieldId>,
    working: SymbolTable,
    linkage: SymbolTable,
}

impl ProgramSymbol {
    pub fn new(name: &str, chunk: ChunkId, exported: bool, location: Location) -> Self {
        Self {
            name: name.to_string(),
            chunk,
            exported,
            location,
            fields: Vec::new(),
            usings: Vec::new(),
            returnings: Vec::new(),
            working: SymbolTable::default(),
            linkage: SymbolTable::default(),
        }
    }

    /// The table a section's fields are defined in.
    pub fn section(&self, section: Section) -> &SymbolTable {
        match section {
            Section::WorkingStorage => &self.working,
            Section::Linkage => &self.linkage,
        }
    }

    /// Look up a field by name; working-storage shadows linkage.
    pub fn field(&self, name: &str) -> Option<FieldId> {
        match self.resolve_member(name)? {
            Symbol::Field(field) => Some(field.id),
            _ => None,
        }
    }
}

impl Scope for ProgramSymbol {
    fn enclosing_scope(&self) -> Option<ScopeId> {
        Some(ScopeId::Chunk(self.chunk))
    }

    /// Fields go to the table of their section; anything else to working-storage.
    fn define(&mut self, name: &str, symbol: Symbol) {
        match symbol {
            Symbol::Field(FieldRef {
                section: Section::Linkage,
                ..
            }) => self.linkage.define(name, symbol),
            _ => self.working.define(name, symbol),
        }
    }

    fn resolve_member(&self, name: &str) -> Option<Symbol> {
        self.working.get(name).or_else(|| self.linkage.get(name))
    }
}

/// Root scope and owner of every symbol of a compiler instance.
///
/// Seeded with the built-in usage types; modules are defined in its table.
#[derive(Debug, Clone)]
pub struct GlobalScope {
    table: SymbolTable,
    modules: Vec<ModuleSymbol>,
    chunks: Vec<ChunkSymbol>,
    programs: Vec<ProgramSymbol>,
    fields: Vec<FieldSymbol>,
}

impl Default for GlobalScope {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalScope {
    pub fn new() -> Self {
        let mut table = SymbolTable::default();
        for usage in UsageKind::ALL {
            table.define(usage.tag(), Symbol::Usage(usage));
        }
        Self {
            table,
            modules: Vec::new(),
            chunks: Vec::new(),
            programs: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn module(&self, id: ModuleId) -> &ModuleSymbol {
        &self.modules[id.index()]
    }

    pub fn chunk(&self, id: ChunkId) -> &ChunkSymbol {
        &self.chunks[id.index()]
    }

    pub fn program(&self, id: ProgramId) -> &ProgramSymbol {
        &self.programs[id.index()]
    }

    pub fn program_mut(&mut self, id: ProgramId) -> &mut ProgramSymbol {
        &mut self.programs[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldSymbol {
        &self.fields[id.index()]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut FieldSymbol {
        &mut self.fields[id.index()]
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &ModuleSymbol)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (ModuleId::new(i), m))
    }

    /// The module named `name`, created (empty) on first use.
    pub fn find_or_add_module(&mut self, name: &str) -> ModuleId {
        if let Some(Symbol::Module(id)) = self.table.get(name) {
            return id;
        }
        let id = ModuleId::new(self.modules.len());
        self.modules.push(ModuleSymbol {
            name: name.to_string(),
            chunks: Vec::new(),
            table: SymbolTable::default(),
        });
        self.table.define(name, Symbol::Module(id));
        trace!(module = name, "Defined module");
        id
    }

    /// A fresh chunk for one source file of `module`.
    pub fn add_chunk(&mut self, module: ModuleId, name: &str) -> ChunkId {
        let id = ChunkId::new(self.chunks.len());
        self.chunks.push(ChunkSymbol {
            name: name.to_string(),
            module,
            programs: Vec::new(),
            table: SymbolTable::default(),
        });
        let module = &mut self.modules[module.index()];
        module.chunks.push(id);
        module.define(name, Symbol::Chunk(id));
        id
    }

    /// Define `program` in its chunk, and in its module too when exported.
    pub fn add_program(&mut self, program: ProgramSymbol) -> ProgramId {
        let id = ProgramId::new(self.programs.len());
        let chunk = &mut self.chunks[program.chunk.index()];
        chunk.programs.push(id);
        chunk.define(&program.name, Symbol::Program(id));
        if program.exported {
            let module = chunk.module;
            self.modules[module.index()].define(&program.name, Symbol::Program(id));
        }
        self.programs.push(program);
        id
    }

    /// Define `field` in the matching section table of `program`.
    pub fn add_field(&mut self, program: ProgramId, field: FieldSymbol) -> FieldId {
        let id = FieldId::new(self.fields.len());
        let symbol = Symbol::Field(FieldRef {
            id,
            section: field.section,
        });
        let owner = &mut self.programs[program.index()];
        owner.define(&field.name, symbol);
        owner.fields.push(id);
        self.fields.push(field);
        id
    }

    /// Borrow any scope by id.
    pub fn scope(&self, id: ScopeId) -> &dyn Scope {
        match id {
            ScopeId::Global => self,
            ScopeId::Module(id) => self.module(id),
            ScopeId::Chunk(id) => self.chunk(id),
            ScopeId::Program(id) => self.program(id),
        }
    }

    /// Look `name` up starting at `scope`, then each enclosing scope in turn.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<Symbol> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scope(id);
            if let Some(symbol) = scope.resolve_member(name) {
                return Some(symbol);
            }
            current = scope.enclosing_scope();
        }
        None
    }

    pub fn resolve_module(&self, name: &str) -> Option<ModuleId> {
        match self.table.get(name)? {
            Symbol::Module(id) => Some(id),
            _ => None,
        }
    }

    /// A program visible at module level, i.e. exported by some chunk.
    pub fn resolve_module_program(&self, module: ModuleId, name: &str) -> Option<ProgramId> {
        match self.module(module).resolve_member(name)? {
            Symbol::Program(id) => Some(id),
            _ => None,
        }
    }

    pub fn resolve_chunk_program(&self, chunk: ChunkId, name: &str) -> Option<ProgramId> {
        match self.chunk(chunk).resolve_member(name)? {
            Symbol::Program(id) => Some(id),
            _ => None,
        }
    }
}

impl Scope for GlobalScope {
    fn enclosing_scope(&self) -> Option<ScopeId> {
        None
    }

    fn define(&mut self, name: &str, symbol: Symbol) {
        self.table.define(name, symbol);
    }

    fn resolve_member(&self, name: &str) -> Option<Symbol> {
        self.table.get(name)
    }
}
