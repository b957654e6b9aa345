//! Terse constructors for syntax trees.
//!
//! Used by tree-rewriting passes that graft new nodes, and by tests that
//! build fixtures without going through a parser. Every constructor assigns a
//! fresh [`NodeId`](super::NodeId) and a default location; use [`Node::at`]
//! to pin a node to a source position.

use super::{Location, Node, NodeKind};
use crate::decimal::PictureSegment;
use crate::symbols::UsageKind;

impl Node {
    /// Set this node's location to `line:column` (single-column span).
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.location = Location::on_line(line, column, column + 1);
        self
    }

    /// Set this node's location.
    pub fn located(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

fn node(kind: NodeKind, children: Vec<Node>) -> Node {
    Node::new(kind, Location::default(), children)
}

fn leaf(kind: NodeKind) -> Node {
    Node::leaf(kind, Location::default())
}

pub fn identifier(name: &str) -> Node {
    leaf(NodeKind::Identifier(name.to_string()))
}

pub fn module(name: &str, programs: Vec<Node>) -> Node {
    let mut children = vec![identifier(name)];
    children.extend(programs);
    node(NodeKind::Module, children)
}

/// A program; `parts` follow the identifier (export marker, divisions, end marker).
pub fn program(name: &str, parts: Vec<Node>) -> Node {
    let mut children = vec![identifier(name)];
    children.extend(parts);
    node(NodeKind::Program, children)
}

pub fn export() -> Node {
    leaf(NodeKind::Export)
}

pub fn data_division(sections: Vec<Node>) -> Node {
    node(NodeKind::DataDivision, sections)
}

pub fn working_storage(fields: Vec<Node>) -> Node {
    node(NodeKind::WorkingStorageSection, fields)
}

pub fn linkage(fields: Vec<Node>) -> Node {
    node(NodeKind::LinkageSection, fields)
}

/// A field declaration; `clauses` are picture, usage and value nodes.
pub fn field(level: u32, name: &str, clauses: Vec<Node>) -> Node {
    let mut children = vec![leaf(NodeKind::Level(level)), identifier(name)];
    children.extend(clauses);
    node(NodeKind::Field, children)
}

/// A picture clause from its textual form, e.g. `S9(5)V99`.
///
/// # Panics
///
/// If `text` has a malformed repeat count. Use [`picture`] with segments
/// from [`PictureSegment::expand`] to handle that case.
pub fn pic(text: &str) -> Node {
    let segments = PictureSegment::expand(text)
        .unwrap_or_else(|err| panic!("picture {:?}: {}", text, err));
    leaf(NodeKind::Picture(segments))
}

pub fn picture(segments: Vec<PictureSegment>) -> Node {
    leaf(NodeKind::Picture(segments))
}

pub fn usage(kind: UsageKind) -> Node {
    leaf(NodeKind::Usage(kind))
}

pub fn number(text: &str) -> Node {
    leaf(NodeKind::NumberLiteral(text.to_string()))
}

pub fn string(text: &str) -> Node {
    leaf(NodeKind::StringLiteral(text.to_string()))
}

/// A procedure division with its parameter lists and statements.
pub fn procedure(usings: &[&str], returnings: &[&str], statements: Vec<Node>) -> Node {
    let mut children = Vec::new();
    if !usings.is_empty() {
        children.push(node(
            NodeKind::ProcedureUsings,
            usings.iter().map(|n| identifier(n)).collect(),
        ));
    }
    if !returnings.is_empty() {
        children.push(node(
            NodeKind::ProcedureReturnings,
            returnings.iter().map(|n| identifier(n)).collect(),
        ));
    }
    children.extend(statements);
    node(NodeKind::ProcedureDivision, children)
}

pub fn call_id(program: &str, module: Option<&str>) -> Node {
    let mut children = Vec::new();
    if let Some(module) = module {
        children.push(leaf(NodeKind::CallIdModule(module.to_string())));
    }
    children.push(leaf(NodeKind::CallIdProgram(program.to_string())));
    node(NodeKind::CallId, children)
}

/// `CALL program [OF module] USING ... RETURNING ...`.
pub fn call(program: &str, module: Option<&str>, usings: Vec<Node>, returnings: &[&str]) -> Node {
    let mut children = vec![call_id(program, module)];
    if !usings.is_empty() {
        children.push(node(NodeKind::CallUsings, usings));
    }
    if !returnings.is_empty() {
        children.push(node(
            NodeKind::CallReturnings,
            returnings
                .iter()
                .map(|n| leaf(NodeKind::CallReturningId(n.to_string())))
                .collect(),
        ));
    }
    node(NodeKind::CallStatement, children)
}

/// A call used as a value (as an argument of another call).
pub fn call_expr(program: &str, module: Option<&str>, usings: Vec<Node>) -> Node {
    let mut children = vec![call_id(program, module)];
    if !usings.is_empty() {
        children.push(node(NodeKind::CallUsings, usings));
    }
    node(NodeKind::CallExpression, children)
}

pub fn by_ref(name: &str) -> Node {
    leaf(NodeKind::CallUsingId {
        name: name.to_string(),
        by_content: false,
    })
}

pub fn by_content(name: &str) -> Node {
    leaf(NodeKind::CallUsingId {
        name: name.to_string(),
        by_content: true,
    })
}

pub fn display(operands: Vec<Node>) -> Node {
    node(NodeKind::DisplayStatement, operands)
}

pub fn goback() -> Node {
    leaf(NodeKind::GobackStatement)
}

pub fn end_program(name: &str) -> Node {
    leaf(NodeKind::EndProgram(name.to_string()))
}
