//! The core passes and the side table they share.
//!
//! | pass                       | kind        | after                    | before                   |
//! |----------------------------|-------------|--------------------------|--------------------------|
//! | `define-declare`           | declare     |                          |                          |
//! | `end-marker`               | declare     | define-declare           | resolve-declare          |
//! | `resolve-declare`          | declare     | define-declare           |                          |
//! | `display-statement`        | transformer | resolve-declare          | resolve-procedure-symbol |
//! | `resolve-procedure-symbol` |             | resolve-declare          | static-typing            |
//! | `resolve-expression-type`  |             | resolve-procedure-symbol | check-procedure-type     |
//! | `check-procedure-type`     |             | resolve-expression-type  | static-typing            |
//! | `static-typing`            | anchor      |                          |                          |
//! | `reverse-call-usings`      | transformer | static-typing            | bytecode-generation      |
//! | `bytecode-generation`      |             | static-typing            |                          |

mod declare;
mod generate;
mod procedure;
mod typing;

use hashbrown::HashMap;

use crate::ast::NodeId;
use crate::pipeline::{CompilerComponent, CompilerPass};
use crate::symbols::{ExprType, FieldId, ProgramId, UsageKind};

pub use declare::{DefineDeclare, EndMarker, ResolveDeclare};
pub use generate::{BytecodeGenerator, ReverseCallUsings};
pub use procedure::{DisplayStatement, ResolveProcedureSymbol};
pub use typing::{CheckProcedureType, ResolveExpressionType};

pub const DEFINE_DECLARE: &str = "define-declare";
pub const END_MARKER: &str = "end-marker";
pub const RESOLVE_DECLARE: &str = "resolve-declare";
pub const DISPLAY_STATEMENT: &str = "display-statement";
pub const RESOLVE_PROCEDURE_SYMBOL: &str = "resolve-procedure-symbol";
pub const RESOLVE_EXPRESSION_TYPE: &str = "resolve-expression-type";
pub const CHECK_PROCEDURE_TYPE: &str = "check-procedure-type";
pub const STATIC_TYPING: &str = "static-typing";
pub const REVERSE_CALL_USINGS: &str = "reverse-call-usings";
pub const BYTECODE_GENERATION: &str = "bytecode-generation";

/// What the passes learned about individual nodes, keyed by node id.
#[derive(Debug, Default, Clone)]
pub struct Bindings {
    /// Program declaration node to its symbol.
    programs: HashMap<NodeId, ProgramId>,
    /// Field declaration or field reference node to its symbol.
    fields: HashMap<NodeId, FieldId>,
    /// Call node to the called program.
    callees: HashMap<NodeId, ProgramId>,
    /// Call argument node to its static type.
    types: HashMap<NodeId, ExprType>,
    /// Call argument node to the usage the callee declared for it.
    params: HashMap<NodeId, UsageKind>,
}

impl Bindings {
    pub fn bind_program(&mut self, node: NodeId, program: ProgramId) {
        self.programs.insert(node, program);
    }

    pub fn program(&self, node: NodeId) -> Option<ProgramId> {
        self.programs.get(&node).copied()
    }

    pub fn bind_field(&mut self, node: NodeId, field: FieldId) {
        self.fields.insert(node, field);
    }

    pub fn field(&self, node: NodeId) -> Option<FieldId> {
        self.fields.get(&node).copied()
    }

    pub fn bind_callee(&mut self, node: NodeId, program: ProgramId) {
        self.callees.insert(node, program);
    }

    pub fn callee(&self, node: NodeId) -> Option<ProgramId> {
        self.callees.get(&node).copied()
    }

    pub fn set_type(&mut self, node: NodeId, ty: ExprType) {
        self.types.insert(node, ty);
    }

    pub fn type_of(&self, node: NodeId) -> Option<ExprType> {
        self.types.get(&node).copied()
    }

    pub fn set_param(&mut self, node: NodeId, usage: UsageKind) {
        self.params.insert(node, usage);
    }

    pub fn param(&self, node: NodeId) -> Option<UsageKind> {
        self.params.get(&node).copied()
    }
}

/// The passes every compiler runs.
pub struct CoreComponent;

impl CompilerComponent for CoreComponent {
    fn passes(&self) -> Vec<CompilerPass> {
        vec![
            CompilerPass::new(DEFINE_DECLARE)
                .declare()
                .visitor(DefineDeclare::default()),
            CompilerPass::new(END_MARKER)
                .declare()
                .after(DEFINE_DECLARE)
                .before(RESOLVE_DECLARE)
                .transformer(EndMarker),
            CompilerPass::new(RESOLVE_DECLARE)
                .declare()
                .after(DEFINE_DECLARE)
                .visitor(ResolveDeclare),
            CompilerPass::new(DISPLAY_STATEMENT)
                .after(RESOLVE_DECLARE)
                .before(RESOLVE_PROCEDURE_SYMBOL)
                .transformer(DisplayStatement),
            CompilerPass::new(RESOLVE_PROCEDURE_SYMBOL)
                .after(RESOLVE_DECLARE)
                .before(STATIC_TYPING)
                .visitor(ResolveProcedureSymbol::default()),
            CompilerPass::new(RESOLVE_EXPRESSION_TYPE)
                .after(RESOLVE_PROCEDURE_SYMBOL)
                .before(CHECK_PROCEDURE_TYPE)
                .visitor(ResolveExpressionType::default()),
            CompilerPass::new(CHECK_PROCEDURE_TYPE)
                .after(RESOLVE_EXPRESSION_TYPE)
                .before(STATIC_TYPING)
                .visitor(CheckProcedureType),
            CompilerPass::new(STATIC_TYPING),
            CompilerPass::new(REVERSE_CALL_USINGS)
                .after(STATIC_TYPING)
                .before(BYTECODE_GENERATION)
                .transformer(ReverseCallUsings),
            CompilerPass::new(BYTECODE_GENERATION)
                .after(STATIC_TYPING)
                .visitor(BytecodeGenerator::default()),
        ]
    }
}
