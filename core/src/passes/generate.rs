//! Lowering of the checked tree to stack-machine bytecode.
//!
//! # Calling Convention
//!
//! A call pushes the callable, then its usings so that the first using ends
//! up on top, then issues [`Instruction::Call`]. The callee leaves the
//! (possibly modified) usings in place and pushes its returnings above them.
//! The caller then unwinds top-down: returnings are stored into their target
//! fields, by-reference usings are copied back, everything else is popped,
//! and finally the callable itself is popped.
//!
//! A call expression asks for exactly one returning, which replaces the
//! callable's slot so the result sits where the callable was.

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::Error;
use crate::ast::{Kind, Node, NodeKind, Transformer, Visitor};
use crate::bytecode::{AssembleError, Assembler, Instruction, ModuleAssembler, Value};
use crate::decimal::{self, DecodeError};
use crate::diagnostics::CompileErrorKind;
use crate::pipeline::PassContext;
use crate::symbols::{DefaultValue, FieldId, FieldSymbol, ProgramId, Section, UsageKind};

/// Reverses every argument list so pushing arguments in tree order leaves
/// the first one on top of the stack.
pub struct ReverseCallUsings;

impl Transformer<PassContext, Error> for ReverseCallUsings {
    fn transform(&mut self, mut node: Node, _cx: &mut PassContext) -> Result<Vec<Node>, Error> {
        if node.is(Kind::CallUsings) {
            node.children.reverse();
        }
        Ok(vec![node])
    }
}

/// Pool key: equal kind and value share one pool entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Constant {
    /// Bit pattern of the float.
    Comp2(u64),
    Comp4 {
        precision: u32,
        scale: u32,
        digits: String,
    },
    Display(String),
}

impl Constant {
    fn comp2(value: f64) -> Self {
        Constant::Comp2(value.to_bits())
    }

    fn value(&self) -> Value {
        match self {
            Constant::Comp2(bits) => Value::Comp2(f64::from_bits(*bits)),
            Constant::Comp4 {
                precision,
                scale,
                digits,
            } => Value::Comp4 {
                precision: *precision,
                scale: *scale,
                digits: digits.clone(),
            },
            Constant::Display(text) => Value::Display(text.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct ConstantPool {
    indices: HashMap<Constant, u16>,
}

impl ConstantPool {
    fn intern(
        &mut self,
        asm: &mut dyn Assembler,
        constant: Constant,
    ) -> Result<u16, AssembleError> {
        if let Some(&index) = self.indices.get(&constant) {
            return Ok(index);
        }
        let index = asm.constant(constant.value())?;
        self.indices.insert(constant, index);
        Ok(index)
    }

    fn clear(&mut self) {
        self.indices.clear();
    }
}

/// Where a field lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Working-storage field of the prototype.
    Field(u16),
    /// Operand stack slot relative to the frame; negative for usings.
    Frame(i16),
}

/// The value a field starts out with.
fn initial_value(field: &FieldSymbol) -> Constant {
    match field.usage_type() {
        UsageKind::Comp2 => {
            let value = match &field.default {
                Some(DefaultValue::Number(text)) => text.trim().parse().unwrap_or(0.0),
                _ => 0.0,
            };
            Constant::comp2(value)
        }
        UsageKind::Comp4 => {
            let fixed = field
                .comp4()
                .expect("COMP-4 storage (decoded by define-declare)")
                .initial_value();
            Constant::Comp4 {
                precision: fixed.precision,
                scale: fixed.scale,
                digits: fixed.digits(),
            }
        }
        UsageKind::Display => match &field.default {
            Some(DefaultValue::String(text)) => Constant::Display(text.clone()),
            _ => Constant::Display(String::new()),
        },
        UsageKind::Any => Constant::Display(String::new()),
    }
}

fn frame_index(position: usize) -> Result<i16, AssembleError> {
    i16::try_from(position).map_err(|_| AssembleError::TooManySlots)
}

fn count(len: usize) -> Result<u8, AssembleError> {
    u8::try_from(len).map_err(|_| AssembleError::TooManyArguments)
}

fn bound_field(node: &Node, cx: &PassContext) -> FieldId {
    cx.bindings
        .field(node.id)
        .expect("field reference (bound by resolve-procedure-symbol)")
}

/// Arguments of a call, in their (reversed) push order.
fn arguments(call: &Node) -> Vec<&Node> {
    call.children_of(Kind::CallUsings)
        .flat_map(|list| list.children.iter())
        .collect()
}

/// Emits one prototype per program and hands the finished module to
/// [`PassContext::output`], writing it to the output path when one is set.
pub struct BytecodeGenerator {
    asm: Box<dyn Assembler>,
    pool: ConstantPool,
    /// Prototype index of every program in the current chunk.
    prototypes: HashMap<ProgramId, u16>,
    program: Option<ProgramId>,
    slots: HashMap<FieldId, Slot>,
    /// Occupied frame slots at and above index zero.
    depth: usize,
    /// Frame slot of each callable pushed by an enclosing call.
    calls: Vec<usize>,
    in_procedure: bool,
    started: bool,
}

impl Default for BytecodeGenerator {
    fn default() -> Self {
        Self::new(Box::new(ModuleAssembler::new()))
    }
}

impl BytecodeGenerator {
    pub fn new(asm: Box<dyn Assembler>) -> Self {
        Self {
            asm,
            pool: ConstantPool::default(),
            prototypes: HashMap::new(),
            program: None,
            slots: HashMap::new(),
            depth: 0,
            calls: Vec::new(),
            in_procedure: false,
            started: false,
        }
    }

    fn begin_module(&mut self, node: &Node, cx: &PassContext) -> Result<(), Error> {
        let name = node.identifier().unwrap_or_default();
        self.asm.begin_module(name);
        self.pool.clear();
        self.prototypes.clear();
        self.started = true;

        let chunk = cx.globals.chunk(cx.chunk());
        for (index, &program) in chunk.programs.iter().enumerate() {
            let index = u16::try_from(index).map_err(|_| AssembleError::TooManyPrototypes)?;
            self.prototypes.insert(program, index);
        }
        debug!(module = name, programs = chunk.programs.len(), "Generating module");
        Ok(())
    }

    fn open_program(&mut self, node: &Node, cx: &PassContext) -> Result<(), Error> {
        let id = cx
            .bindings
            .program(node.id)
            .expect("program symbol (bound by define-declare)");
        let program = cx.globals.program(id);
        let name = program.exported.then_some(program.name.as_str());
        let index = self.asm.open_prototype(
            name,
            count(program.usings.len())?,
            count(program.returnings.len())?,
        )?;
        debug_assert_eq!(self.prototypes.get(&id), Some(&index));
        trace!(program = %program.name, index, "Opened prototype");

        self.program = Some(id);
        self.slots.clear();
        self.calls.clear();
        self.depth = 0;
        self.in_procedure = false;

        let mut linkage = HashMap::new();
        for &field in &program.fields {
            let symbol = cx.globals.field(field);
            let value = initial_value(symbol);
            match symbol.section {
                Section::WorkingStorage => {
                    let slot = self.asm.field(value.value())?;
                    self.slots.insert(field, Slot::Field(slot));
                }
                Section::Linkage => {
                    let constant = self.pool.intern(self.asm.as_mut(), value)?;
                    linkage.insert(field, constant);
                }
            }
        }

        for (position, &field) in program.usings.iter().enumerate() {
            self.slots
                .insert(field, Slot::Frame(-frame_index(position + 1)?));
        }

        let locals: Vec<FieldId> = program
            .returnings
            .iter()
            .copied()
            .chain(program.fields.iter().copied().filter(|field| {
                linkage.contains_key(field)
                    && !program.usings.contains(field)
                    && !program.returnings.contains(field)
            }))
            .collect();
        for field in locals {
            self.asm.emit(Instruction::Load(linkage[&field]))?;
            self.slots.insert(field, Slot::Frame(frame_index(self.depth)?));
            self.depth += 1;
        }
        Ok(())
    }

    fn close_program(&mut self) -> Result<(), Error> {
        if self.asm.last_instruction() != Some(Instruction::Return) {
            self.asm.emit(Instruction::Return)?;
        }
        self.asm.close_prototype();
        self.program = None;
        self.in_procedure = false;
        Ok(())
    }

    fn slot(&self, field: FieldId) -> Slot {
        *self
            .slots
            .get(&field)
            .expect("slot of a field of the current program")
    }

    fn push(&mut self, instruction: Instruction) -> Result<(), Error> {
        self.asm.emit(instruction)?;
        self.depth += 1;
        Ok(())
    }

    fn pop(&mut self, instruction: Instruction) -> Result<(), Error> {
        self.asm.emit(instruction)?;
        self.depth -= 1;
        Ok(())
    }

    fn load(&mut self, field: FieldId) -> Result<(), Error> {
        match self.slot(field) {
            Slot::Field(index) => self.push(Instruction::LoadField(index)),
            Slot::Frame(index) => self.push(Instruction::Push(index)),
        }
    }

    fn store(&mut self, field: FieldId) -> Result<(), Error> {
        match self.slot(field) {
            Slot::Field(index) => self.pop(Instruction::Store(index)),
            Slot::Frame(index) => self.pop(Instruction::Replace(index)),
        }
    }

    fn push_constant(&mut self, constant: Constant) -> Result<(), Error> {
        let index = self.pool.intern(self.asm.as_mut(), constant)?;
        self.push(Instruction::Load(index))
    }

    fn push_callable(&mut self, node: &Node, cx: &PassContext) -> Result<(), Error> {
        let callee = cx
            .bindings
            .callee(node.id)
            .expect("callee (bound by resolve-procedure-symbol)");
        let qualified = node
            .child(Kind::CallId)
            .and_then(|id| id.child(Kind::CallIdModule))
            .is_some();
        let instruction = if qualified {
            let program = cx.globals.program(callee);
            let module = cx.globals.chunk(program.chunk).module;
            let module = &cx.globals.module(module).name;
            Instruction::Import(self.asm.import(module, &program.name)?)
        } else {
            Instruction::Proto(
                *self
                    .prototypes
                    .get(&callee)
                    .expect("prototype of a program in the current chunk"),
            )
        };
        self.calls.push(self.depth);
        self.push(instruction)
    }

    /// A numeric literal argument, encoded for the parameter receiving it.
    fn push_number(&mut self, node: &Node, text: &str, cx: &PassContext) -> Result<(), Error> {
        let literal = || text.to_string();
        let constant = match cx.bindings.param(node.id) {
            Some(UsageKind::Comp2) => {
                let value = decimal::validate_number(text)
                    .ok()
                    .and_then(|()| text.trim().parse::<f64>().ok())
                    .ok_or_else(|| {
                        cx.error(
                            CompileErrorKind::BadNumericLiteral { literal: literal() },
                            node.location,
                        )
                    })?;
                Constant::comp2(value)
            }
            _ => {
                let fixed = decimal::decode_literal(text).map_err(|err| {
                    let kind = match err {
                        DecodeError::TooBig => {
                            CompileErrorKind::ExceedLiteralPrecision { literal: literal() }
                        }
                        _ => CompileErrorKind::BadNumericLiteral { literal: literal() },
                    };
                    cx.error(kind, node.location)
                })?;
                Constant::Comp4 {
                    precision: fixed.precision,
                    scale: fixed.scale,
                    digits: fixed.digits(),
                }
            }
        };
        self.push_constant(constant)
    }

    fn call(&mut self, usings: usize, returnings: usize) -> Result<(), Error> {
        self.asm.emit(Instruction::Call {
            usings: count(usings)?,
            returnings: count(returnings)?,
        })?;
        self.depth += returnings;
        Ok(())
    }

    /// Unwind the usings left on the stack, first using first.
    fn copy_back(&mut self, args: &[&Node], cx: &PassContext) -> Result<(), Error> {
        for arg in args.iter().rev() {
            match &arg.kind {
                NodeKind::CallUsingId {
                    by_content: false, ..
                } => self.store(bound_field(arg, cx))?,
                _ => self.pop(Instruction::Pop)?,
            }
        }
        Ok(())
    }

    fn finish_statement(&mut self, node: &Node, cx: &PassContext) -> Result<(), Error> {
        let args = arguments(node);
        let returnings: Vec<&Node> = node
            .children_of(Kind::CallReturnings)
            .flat_map(|list| list.children.iter())
            .collect();
        self.call(args.len(), returnings.len())?;
        for ret in returnings.iter().rev() {
            self.store(bound_field(ret, cx))?;
        }
        self.copy_back(&args, cx)?;
        self.calls.pop();
        self.pop(Instruction::Pop)
    }

    fn finish_expression(&mut self, node: &Node, cx: &PassContext) -> Result<(), Error> {
        let args = arguments(node);
        self.call(args.len(), 1)?;
        let callable = self
            .calls
            .pop()
            .expect("callable pushed when the call was entered");
        self.pop(Instruction::Replace(frame_index(callable)?))?;
        self.copy_back(&args, cx)
    }
}

impl Visitor<PassContext, Error> for BytecodeGenerator {
    fn enter(&mut self, node: &Node, cx: &mut PassContext) -> Result<(), Error> {
        match &node.kind {
            NodeKind::Module => self.begin_module(node, cx),
            NodeKind::Program => self.open_program(node, cx),
            NodeKind::ProcedureDivision => {
                self.in_procedure = true;
                Ok(())
            }
            NodeKind::CallStatement | NodeKind::CallExpression => self.push_callable(node, cx),
            NodeKind::CallUsingId { .. } => self.load(bound_field(node, cx)),
            NodeKind::NumberLiteral(text) if self.in_procedure => {
                self.push_number(node, text, cx)
            }
            NodeKind::StringLiteral(text) if self.in_procedure => {
                self.push_constant(Constant::Display(text.clone()))
            }
            NodeKind::GobackStatement => {
                self.asm.emit(Instruction::Return)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn leave(&mut self, node: &Node, cx: &mut PassContext) -> Result<(), Error> {
        match node.kind() {
            Kind::CallStatement => self.finish_statement(node, cx),
            Kind::CallExpression => self.finish_expression(node, cx),
            Kind::Program => self.close_program(),
            _ => Ok(()),
        }
    }

    fn cleanup(&mut self, cx: &mut PassContext) -> Result<(), Error> {
        if !core::mem::take(&mut self.started) {
            return Ok(());
        }
        if let Some(path) = &cx.output_path {
            self.asm.serialize(path)?;
        }
        let module = self.asm.finish();
        debug!(
            module = %module.name,
            prototypes = module.prototypes.len(),
            constants = module.constants.len(),
            "Generated module"
        );
        cx.output = Some(module);

        self.pool.clear();
        self.prototypes.clear();
        self.slots.clear();
        self.calls.clear();
        self.program = None;
        self.depth = 0;
        Ok(())
    }
}
