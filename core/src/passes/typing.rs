//! Static typing of call sites.

use crate::Error;
use crate::ast::{Kind, Node, NodeKind, Visitor};
use crate::diagnostics::{CompileError, CompileErrorKind};
use crate::pipeline::PassContext;
use crate::symbols::{ExprType, ProgramId};

/// Records the static type of every call argument.
#[derive(Default)]
pub struct ResolveExpressionType;

impl Visitor<PassContext, Error> for ResolveExpressionType {
    fn enter(&mut self, node: &Node, cx: &mut PassContext) -> Result<(), Error> {
        if !node.is(Kind::CallUsings) {
            return Ok(());
        }
        for arg in &node.children {
            let ty = expression_type(arg, cx)?;
            cx.bindings.set_type(arg.id, ty);
        }
        Ok(())
    }
}

fn expression_type(arg: &Node, cx: &PassContext) -> Result<ExprType, Error> {
    let ty = match &arg.kind {
        NodeKind::CallUsingId { .. } => {
            let field = cx
                .bindings
                .field(arg.id)
                .expect("argument field (bound by resolve-procedure-symbol)");
            ExprType::Usage(cx.globals.field(field).usage_type())
        }
        NodeKind::NumberLiteral(_) => ExprType::NumericLiteral,
        NodeKind::StringLiteral(_) => ExprType::Usage(crate::symbols::UsageKind::Display),
        NodeKind::CallExpression => {
            let callee = callee_of(arg, cx);
            let program = cx.globals.program(callee);
            let Some(&first) = program.returnings.first() else {
                return Err(cx.error(
                    CompileErrorKind::ExpressionReturnsNothing {
                        program: program.name.clone(),
                    },
                    arg.location,
                ));
            };
            ExprType::Usage(cx.globals.field(first).usage_type())
        }
        other => {
            return Err(cx.error(
                CompileErrorKind::UnexpectedArgument {
                    kind: format!("{:?}", other.kind()),
                },
                arg.location,
            ));
        }
    };
    Ok(ty)
}

fn callee_of(call: &Node, cx: &PassContext) -> ProgramId {
    cx.bindings
        .callee(call.id)
        .expect("callee (bound by resolve-procedure-symbol)")
}

/// Checks argument and returning counts and types against the callee, and
/// records each argument's declared parameter usage.
pub struct CheckProcedureType;

impl Visitor<PassContext, Error> for CheckProcedureType {
    fn enter(&mut self, node: &Node, cx: &mut PassContext) -> Result<(), Error> {
        if !matches!(node.kind(), Kind::CallStatement | Kind::CallExpression) {
            return Ok(());
        }
        let callee = callee_of(node, cx);
        let program = cx.globals.program(callee);
        let callee_file = cx.globals.chunk(program.chunk).name.clone();
        let location = node
            .first(Kind::CallIdProgram)
            .map_or(node.location, |n| n.location);

        let args: Vec<&Node> = node
            .children_of(Kind::CallUsings)
            .flat_map(|list| list.children.iter())
            .collect();
        if args.len() != program.usings.len() {
            return Err(cx.error(
                CompileErrorKind::UsingCountMismatch {
                    program: program.name.clone(),
                    expected: program.usings.len(),
                    found: args.len(),
                },
                location,
            ));
        }

        let returnings: Vec<&Node> = node
            .children_of(Kind::CallReturnings)
            .flat_map(|list| list.children.iter())
            .collect();
        let requested = if node.is(Kind::CallExpression) {
            1
        } else {
            returnings.len()
        };
        if requested > program.returnings.len() {
            return Err(cx.error(
                CompileErrorKind::ReturningCountMismatch {
                    program: program.name.clone(),
                    expected: program.returnings.len(),
                    found: requested,
                },
                location,
            ));
        }

        let mut params = Vec::with_capacity(args.len());
        for (position, (arg, &param)) in args.iter().zip(&program.usings).enumerate() {
            let param = cx.globals.field(param);
            let expected = param.usage_type();
            let found = cx
                .bindings
                .type_of(arg.id)
                .expect("argument type (set by resolve-expression-type)");
            if !found.fits(expected) {
                return Err(CompileError::new(
                    CompileErrorKind::ArgumentTypeMismatch {
                        position: position + 1,
                        expected,
                        found,
                    },
                    cx.file.clone(),
                    arg.location,
                )
                .with_related(callee_file, param.location)
                .into());
            }
            params.push((arg.id, expected));
        }

        for (position, (ret, &declared)) in returnings.iter().zip(&program.returnings).enumerate() {
            let declared = cx.globals.field(declared);
            let expected = declared.usage_type();
            let field = cx
                .bindings
                .field(ret.id)
                .expect("returning field (bound by resolve-procedure-symbol)");
            let found = cx.globals.field(field).usage_type();
            if !expected.accepts(found) {
                return Err(CompileError::new(
                    CompileErrorKind::ReturningTypeMismatch {
                        position: position + 1,
                        expected,
                        found,
                    },
                    cx.file.clone(),
                    ret.location,
                )
                .with_related(callee_file, declared.location)
                .into());
            }
        }

        for (arg, usage) in params {
            cx.bindings.set_param(arg, usage);
        }
        Ok(())
    }
}
