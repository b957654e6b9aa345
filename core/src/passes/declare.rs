//! Declaration passes: define modules, programs and fields, validate their
//! clauses, and attach resolved usage types.

use tracing::debug;

use crate::Error;
use crate::ast::{Kind, Node, NodeKind, Transformer, Visitor};
use crate::decimal::{
    self, DecodeError, MAX_COMP4_DIGITS, PictureSegment, decode_comp4, merge_segments,
};
use crate::diagnostics::{CompileError, CompileErrorKind};
use crate::pipeline::PassContext;
use crate::symbols::{
    DefaultValue, FieldStorage, FieldSymbol, ProgramId, ProgramSymbol, Scope, Section,
    Symbol, UsageKind,
};

/// Defines the module, chunk, programs and fields of a file, and each
/// program's using/returning lists.
#[derive(Default)]
pub struct DefineDeclare {
    program: Option<ProgramId>,
    section: Option<Section>,
}

impl Visitor<PassContext, Error> for DefineDeclare {
    fn enter(&mut self, node: &Node, cx: &mut PassContext) -> Result<(), Error> {
        match node.kind() {
            Kind::Module => {
                let name = node.identifier().unwrap_or_default();
                let module = cx.globals.find_or_add_module(name);
                let chunk = cx.globals.add_chunk(module, &cx.file);
                debug!(module = name, chunk = %cx.file, "Defined chunk");
                cx.module = Some(module);
                cx.chunk = Some(chunk);
            }
            Kind::Program => self.define_program(node, cx)?,
            Kind::WorkingStorageSection => self.section = Some(Section::WorkingStorage),
            Kind::LinkageSection => self.section = Some(Section::Linkage),
            Kind::Field => self.define_field(node, cx)?,
            Kind::ProcedureUsings => self.define_parameters(node, cx, true)?,
            Kind::ProcedureReturnings => self.define_parameters(node, cx, false)?,
            _ => {}
        }
        Ok(())
    }

    fn leave(&mut self, node: &Node, _cx: &mut PassContext) -> Result<(), Error> {
        if node.is(Kind::Program) {
            self.program = None;
            self.section = None;
        }
        Ok(())
    }
}

impl DefineDeclare {
    fn program(&self) -> ProgramId {
        self.program
            .expect("enclosing program (fields and parameters only occur inside programs)")
    }

    fn define_program(&mut self, node: &Node, cx: &mut PassContext) -> Result<(), Error> {
        let name = node.identifier().unwrap_or_default();
        let location = node.identifier_location();
        let chunk = cx.chunk();

        if let Some(previous) = cx.globals.resolve_chunk_program(chunk, name) {
            let previous = cx.globals.program(previous).location;
            return Err(cx.error_with_related(
                CompileErrorKind::Redefinition {
                    name: name.to_string(),
                },
                location,
                previous,
            ));
        }

        let exported = node.child(Kind::Export).is_some();
        if exported {
            let module = cx.globals.chunk(chunk).module;
            if let Some(previous) = cx.globals.resolve_module_program(module, name) {
                let previous = cx.globals.program(previous);
                let file = cx.globals.chunk(previous.chunk).name.clone();
                // Recompiling a file replaces its own exports.
                if file == cx.file {
                    debug!(program = name, file = %file, "Replacing export");
                } else {
                    return Err(CompileError::new(
                        CompileErrorKind::Redefinition {
                            name: name.to_string(),
                        },
                        cx.file.clone(),
                        location,
                    )
                    .with_related(file, previous.location)
                    .into());
                }
            }
        }

        let id = cx
            .globals
            .add_program(ProgramSymbol::new(name, chunk, exported, location));
        cx.bindings.bind_program(node.id, id);
        debug!(program = name, exported, "Defined program");
        self.program = Some(id);
        self.section = None;
        Ok(())
    }

    fn define_field(&mut self, node: &Node, cx: &mut PassContext) -> Result<(), Error> {
        let program = self.program();
        let section = self.section.unwrap_or(Section::WorkingStorage);
        let name = node.identifier().unwrap_or_default();
        let location = node.identifier_location();

        let level = node.child(Kind::Level);
        if let Some(Node {
            kind: NodeKind::Level(level),
            location,
            ..
        }) = level
        {
            if !(1..=77).contains(level) {
                return Err(cx.error(CompileErrorKind::BadLevel { level: *level }, *location));
            }
        }

        let usage = match node.child(Kind::Usage).map(|n| &n.kind) {
            Some(NodeKind::Usage(usage)) => *usage,
            _ => UsageKind::Display,
        };

        let picture_node = node.child(Kind::Picture);
        let picture = match picture_node.map(|n| &n.kind) {
            Some(NodeKind::Picture(segments)) => Some(merge_segments(segments.clone())),
            _ => None,
        };

        let default_node = node
            .children
            .iter()
            .find(|c| c.is(Kind::NumberLiteral) || c.is(Kind::StringLiteral));
        let default = default_node.and_then(|n| match &n.kind {
            NodeKind::NumberLiteral(text) => Some(DefaultValue::Number(text.clone())),
            NodeKind::StringLiteral(text) => Some(DefaultValue::String(text.clone())),
            _ => None,
        });
        let default_location = default_node.map_or(location, |n| n.location);
        let picture_location = picture_node.map_or(location, |n| n.location);

        let bad_default = |reason: &str| CompileErrorKind::BadDefaultValue {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let mut storage = FieldStorage::Plain;
        match usage {
            UsageKind::Comp2 => {
                if picture.is_some() {
                    return Err(cx.error(
                        CompileErrorKind::PictureNotAllowed {
                            name: name.to_string(),
                            usage,
                        },
                        picture_location,
                    ));
                }
                match &default {
                    Some(DefaultValue::String(_)) => {
                        return Err(cx.error(bad_default("expected a number"), default_location));
                    }
                    Some(DefaultValue::Number(text)) => {
                        if decimal::validate_number(text).is_err() || text.parse::<f64>().is_err()
                        {
                            return Err(cx.error(
                                CompileErrorKind::BadNumericLiteral {
                                    literal: text.clone(),
                                },
                                default_location,
                            ));
                        }
                    }
                    None => {}
                }
            }
            UsageKind::Comp4 => {
                if let Some(segments) = &picture {
                    validate_comp4_picture(name, segments)
                        .map_err(|kind| cx.error(kind, picture_location))?;
                }
                let literal = match &default {
                    Some(DefaultValue::String(_)) => {
                        return Err(cx.error(bad_default("expected a number"), default_location));
                    }
                    Some(DefaultValue::Number(text)) => Some(text.as_str()),
                    None => None,
                };
                let field = decode_comp4(picture.as_deref(), literal, cx.options.fraction_policy)
                    .map_err(|err| {
                        let kind = match err {
                            DecodeError::Malformed => CompileErrorKind::BadNumericLiteral {
                                literal: literal.unwrap_or_default().to_string(),
                            },
                            _ => bad_default(&err.to_string()),
                        };
                        cx.error(kind, default_location)
                    })?;
                storage = FieldStorage::Comp4(field);
            }
            UsageKind::Display => {
                if let Some(DefaultValue::Number(_)) = &default {
                    return Err(cx.error(bad_default("expected a string"), default_location));
                }
            }
            UsageKind::Any => {
                if picture.is_some() {
                    return Err(cx.error(
                        CompileErrorKind::PictureNotAllowed {
                            name: name.to_string(),
                            usage,
                        },
                        picture_location,
                    ));
                }
                if default.is_some() {
                    return Err(cx.error(
                        bad_default("ANY fields cannot have a default"),
                        default_location,
                    ));
                }
                if section == Section::WorkingStorage {
                    return Err(cx.error(
                        CompileErrorKind::AnyOutsideLinkage {
                            name: name.to_string(),
                        },
                        location,
                    ));
                }
            }
        }

        if let Some(Symbol::Field(previous)) = cx.globals.program(program).resolve_member(name) {
            let previous = cx.globals.field(previous.id).location;
            return Err(cx.error_with_related(
                CompileErrorKind::Redefinition {
                    name: name.to_string(),
                },
                location,
                previous,
            ));
        }

        let level = match level.map(|n| &n.kind) {
            Some(NodeKind::Level(level)) => *level,
            _ => 1,
        };
        let id = cx.globals.add_field(
            program,
            FieldSymbol {
                name: name.to_string(),
                section,
                level,
                usage,
                picture,
                ty: None,
                node: node.id,
                location,
                default,
                storage,
            },
        );
        cx.bindings.bind_field(node.id, id);
        Ok(())
    }

    /// Bind `PROCEDURE DIVISION USING/RETURNING` names to linkage fields.
    fn define_parameters(
        &mut self,
        node: &Node,
        cx: &mut PassContext,
        usings: bool,
    ) -> Result<(), Error> {
        let program = self.program();
        for ident in node.children_of(Kind::Identifier) {
            let NodeKind::Identifier(name) = &ident.kind else {
                continue;
            };
            let field = cx
                .globals
                .program(program)
                .field(name)
                .ok_or_else(|| {
                    cx.error(
                        CompileErrorKind::Undefined { name: name.clone() },
                        ident.location,
                    )
                })?;
            let symbol = cx.globals.field(field);

            if symbol.section != Section::Linkage {
                return Err(cx.error(
                    CompileErrorKind::NotInLinkageSection { name: name.clone() },
                    ident.location,
                ));
            }
            if symbol.has_default() {
                return Err(cx.error(
                    CompileErrorKind::UsingWithDefaultValue { name: name.clone() },
                    ident.location,
                ));
            }

            let declared = cx.globals.program(program);
            if declared.usings.contains(&field) || declared.returnings.contains(&field) {
                return Err(cx.error_with_related(
                    CompileErrorKind::Redefinition { name: name.clone() },
                    ident.location,
                    symbol.location,
                ));
            }

            cx.bindings.bind_field(ident.id, field);
            let declared = cx.globals.program_mut(program);
            if usings {
                declared.usings.push(field);
            } else {
                declared.returnings.push(field);
            }
        }
        Ok(())
    }
}

/// Check a `COMP-4` PICTURE: a leading sign only, one `V` at most, one
/// alphanumeric position at most, and no more than 18 digit positions.
fn validate_comp4_picture(name: &str, segments: &[PictureSegment]) -> Result<(), CompileErrorKind> {
    let name = name.to_string();
    if segments.iter().skip(1).any(|s| s.character == 'S') {
        return Err(CompileErrorKind::BadSignPicture { name });
    }
    let size_of = |c: char| -> u32 {
        segments
            .iter()
            .filter(|s| s.character == c)
            .map(|s| s.size)
            .sum()
    };
    if size_of('V') > 1 {
        return Err(CompileErrorKind::ManyVirtualDecimalPoint { name });
    }
    if size_of('X') + size_of('A') > 1 {
        return Err(CompileErrorKind::IncompatibleComp4Picture { name });
    }
    let digits = size_of('9');
    if digits > MAX_COMP4_DIGITS {
        return Err(CompileErrorKind::ExceedComp4Precision { name, digits });
    }
    Ok(())
}

/// Validates `END PROGRAM` markers against their program and drops them.
pub struct EndMarker;

impl Transformer<PassContext, Error> for EndMarker {
    fn transform(&mut self, mut node: Node, cx: &mut PassContext) -> Result<Vec<Node>, Error> {
        if node.is(Kind::Program) {
            let name = node.identifier().unwrap_or_default().to_string();
            for marker in node.children_of(Kind::EndProgram) {
                if let NodeKind::EndProgram(found) = &marker.kind {
                    if *found != name {
                        return Err(cx.error(
                            CompileErrorKind::EndMarkerMismatch {
                                expected: name,
                                found: found.clone(),
                            },
                            marker.location,
                        ));
                    }
                }
            }
            node.children.retain(|c| !c.is(Kind::EndProgram));
        }
        Ok(vec![node])
    }
}

/// Attaches the global usage type to every field.
pub struct ResolveDeclare;

impl Visitor<PassContext, Error> for ResolveDeclare {
    fn enter(&mut self, node: &Node, cx: &mut PassContext) -> Result<(), Error> {
        if !node.is(Kind::Field) {
            return Ok(());
        }
        let Some(field) = cx.bindings.field(node.id) else {
            return Ok(());
        };
        let usage = cx.globals.field(field).usage;
        match cx.globals.resolve_member(usage.tag()) {
            Some(Symbol::Usage(ty)) => {
                cx.globals.field_mut(field).ty = Some(ty);
                Ok(())
            }
            _ => Err(cx.error(
                CompileErrorKind::Undefined {
                    name: usage.tag().to_string(),
                },
                node.location,
            )),
        }
    }
}
