//! Procedure passes: DISPLAY lowering and call-site binding.

use hashbrown::HashMap;

use crate::Error;
use crate::ast::{Kind, Location, Node, NodeKind, Transformer, Visitor, build};
use crate::diagnostics::CompileErrorKind;
use crate::pipeline::PassContext;
use crate::symbols::ProgramId;

/// Module and program providing the DISPLAY statement at runtime.
pub const DISPLAY_MODULE: &str = "SYSTEM";
pub const DISPLAY_PROGRAM: &str = "DISPLAY";

/// Rewrites `DISPLAY a b` into one `CALL "DISPLAY" OF "SYSTEM"` per operand,
/// each operand passed by content.
pub struct DisplayStatement;

impl Transformer<PassContext, Error> for DisplayStatement {
    fn transform(&mut self, node: Node, _cx: &mut PassContext) -> Result<Vec<Node>, Error> {
        if !node.is(Kind::DisplayStatement) {
            return Ok(vec![node]);
        }
        let location = node.location;
        let calls = node
            .children
            .into_iter()
            .map(|mut operand| {
                if let NodeKind::CallUsingId { by_content, .. } = &mut operand.kind {
                    *by_content = true;
                }
                let mut call =
                    build::call(DISPLAY_PROGRAM, Some(DISPLAY_MODULE), vec![operand], &[])
                        .located(location);
                // Point the callee name at the statement too.
                if let Some(id) = call.children.first_mut() {
                    id.location = location;
                    for part in &mut id.children {
                        part.location = location;
                    }
                }
                call
            })
            .collect();
        Ok(calls)
    }
}

/// Binds every call to its callee and every argument or returning name to
/// its field, and rejects a field passed twice as a mutable argument.
#[derive(Default)]
pub struct ResolveProcedureSymbol {
    program: Option<ProgramId>,
}

impl Visitor<PassContext, Error> for ResolveProcedureSymbol {
    fn enter(&mut self, node: &Node, cx: &mut PassContext) -> Result<(), Error> {
        match &node.kind {
            NodeKind::Program => self.program = cx.bindings.program(node.id),
            NodeKind::CallStatement | NodeKind::CallExpression => {
                let callee = resolve_callee(node, cx)?;
                cx.bindings.bind_callee(node.id, callee);
                check_mutable_arguments(node, cx)?;
            }
            NodeKind::CallUsingId { name, .. } | NodeKind::CallReturningId(name) => {
                self.bind_field(node, name, cx)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn leave(&mut self, node: &Node, _cx: &mut PassContext) -> Result<(), Error> {
        if node.is(Kind::Program) {
            self.program = None;
        }
        Ok(())
    }
}

impl ResolveProcedureSymbol {
    /// Names in a call resolve within the calling program only.
    fn bind_field(&self, node: &Node, name: &str, cx: &mut PassContext) -> Result<(), Error> {
        let field = self
            .program
            .and_then(|program| cx.globals.program(program).field(name))
            .ok_or_else(|| {
                cx.error(
                    CompileErrorKind::Undefined {
                        name: name.to_string(),
                    },
                    node.location,
                )
            })?;
        cx.bindings.bind_field(node.id, field);
        Ok(())
    }
}

/// The program a call refers to: `P` in the current chunk, or `P OF M`
/// among the programs module `M` exports.
fn resolve_callee(call: &Node, cx: &PassContext) -> Result<ProgramId, Error> {
    let mut module = None;
    let mut program = None;
    if let Some(id) = call.child(Kind::CallId) {
        for part in &id.children {
            match &part.kind {
                NodeKind::CallIdModule(name) => module = Some((name.as_str(), part.location)),
                NodeKind::CallIdProgram(name) => program = Some((name.as_str(), part.location)),
                _ => {}
            }
        }
    }
    let (program, location) = program.unwrap_or(("", call.location));
    let undefined = |name: &str, location: Location| {
        cx.error(
            CompileErrorKind::Undefined {
                name: name.to_string(),
            },
            location,
        )
    };

    match module {
        Some((module, module_location)) => {
            let module_id = cx
                .globals
                .resolve_module(module)
                .ok_or_else(|| undefined(module, module_location))?;
            cx.globals
                .resolve_module_program(module_id, program)
                .ok_or_else(|| undefined(program, location))
        }
        None => cx
            .globals
            .resolve_chunk_program(cx.chunk(), program)
            .ok_or_else(|| undefined(program, location)),
    }
}

/// A name may appear only once among a call's by-reference usings and its
/// returnings; by-content usings are never written back.
fn check_mutable_arguments(call: &Node, cx: &PassContext) -> Result<(), Error> {
    let usings = call
        .children_of(Kind::CallUsings)
        .flat_map(|list| list.children.iter())
        .filter_map(|arg| match &arg.kind {
            NodeKind::CallUsingId {
                name,
                by_content: false,
            } => Some((name.as_str(), arg.location)),
            _ => None,
        });
    let returnings = call
        .children_of(Kind::CallReturnings)
        .flat_map(|list| list.children.iter())
        .filter_map(|ret| match &ret.kind {
            NodeKind::CallReturningId(name) => Some((name.as_str(), ret.location)),
            _ => None,
        });

    let mut seen: HashMap<&str, Location> = HashMap::new();
    for (name, location) in usings.chain(returnings) {
        if let Some(&first) = seen.get(name) {
            return Err(cx.error_with_related(
                CompileErrorKind::MutableArgumentRedefinition {
                    name: name.to_string(),
                },
                location,
                first,
            ));
        }
        seen.insert(name, location);
    }
    Ok(())
}
