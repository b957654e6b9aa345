//! Abstract syntax tree shared by every compiler pass.
//!
//! The tree is produced by the parser collaborator and then walked by the
//! passes of the pipeline. Nodes own their children; the root is a
//! [`Kind::Module`] node. Information resolved by later passes (callees,
//! field bindings, expression types) is never stored on the nodes themselves:
//! it lives in the [`Bindings`](crate::passes::Bindings) side table keyed by
//! [`NodeId`].

pub mod build;
mod location;


use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::decimal::PictureSegment;
use crate::symbols::UsageKind;

pub use location::{Location, Position};

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a node, stable across transformer passes that move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Allocate a fresh, process-unique id.
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Discriminant of a node, used for queries and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Module,
    Program,
    Export,
    Identifier,
    DataDivision,
    WorkingStorageSection,
    LinkageSection,
    Field,
    Level,
    Picture,
    Usage,
    NumberLiteral,
    StringLiteral,
    ProcedureDivision,
    ProcedureUsings,
    ProcedureReturnings,
    CallStatement,
    CallExpression,
    CallId,
    CallIdModule,
    CallIdProgram,
    CallUsings,
    CallUsingId,
    CallReturnings,
    CallReturningId,
    DisplayStatement,
    GobackStatement,
    EndProgram,
}

/// Node payload. Structural nodes carry nothing; leaves carry their text.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Children: `Identifier`, then `Program`*.
    Module,
    /// Children: `Identifier`, `Export`?, `DataDivision`?, `ProcedureDivision`, `EndProgram`?.
    Program,
    Export,
    Identifier(String),
    /// Children: `WorkingStorageSection`?, `LinkageSection`?.
    DataDivision,
    /// Children: `Field`*.
    WorkingStorageSection,
    /// Children: `Field`*.
    LinkageSection,
    /// Children: `Level`, `Identifier`, `Picture`?, `Usage`?, literal?.
    Field,
    Level(u32),
    Picture(Vec<PictureSegment>),
    Usage(UsageKind),
    /// Numeric literal text as written, e.g. `-12.50`.
    NumberLiteral(String),
    StringLiteral(String),
    /// Children: `ProcedureUsings`?, `ProcedureReturnings`?, statements*.
    ProcedureDivision,
    /// Children: `Identifier`*.
    ProcedureUsings,
    /// Children: `Identifier`*.
    ProcedureReturnings,
    /// Children: `CallId`, `CallUsings`?, `CallReturnings`?.
    CallStatement,
    /// Children: `CallId`, `CallUsings`?.
    CallExpression,
    /// Children: `CallIdModule`?, `CallIdProgram`.
    CallId,
    CallIdModule(String),
    CallIdProgram(String),
    /// Children: `CallUsingId`, literals or nested `CallExpression`s.
    CallUsings,
    CallUsingId { name: String, by_content: bool },
    /// Children: `CallReturningId`*.
    CallReturnings,
    CallReturningId(String),
    /// Children: operands, shaped like call usings.
    DisplayStatement,
    GobackStatement,
    EndProgram(String),
}

impl NodeKind {
    pub fn kind(&self) -> Kind {
        match self {
            NodeKind::Module => Kind::Module,
            NodeKind::Program => Kind::Program,
            NodeKind::Export => Kind::Export,
            NodeKind::Identifier(_) => Kind::Identifier,
            NodeKind::DataDivision => Kind::DataDivision,
            NodeKind::WorkingStorageSection => Kind::WorkingStorageSection,
            NodeKind::LinkageSection => Kind::LinkageSection,
            NodeKind::Field => Kind::Field,
            NodeKind::Level(_) => Kind::Level,
            NodeKind::Picture(_) => Kind::Picture,
            NodeKind::Usage(_) => Kind::Usage,
            NodeKind::NumberLiteral(_) => Kind::NumberLiteral,
            NodeKind::StringLiteral(_) => Kind::StringLiteral,
            NodeKind::ProcedureDivision => Kind::ProcedureDivision,
            NodeKind::ProcedureUsings => Kind::ProcedureUsings,
            NodeKind::ProcedureReturnings => Kind::ProcedureReturnings,
            NodeKind::CallStatement => Kind::CallStatement,
            NodeKind::CallExpression => Kind::CallExpression,
            NodeKind::CallId => Kind::CallId,
            NodeKind::CallIdModule(_) => Kind::CallIdModule,
            NodeKind::CallIdProgram(_) => Kind::CallIdProgram,
            NodeKind::CallUsings => Kind::CallUsings,
            NodeKind::CallUsingId { .. } => Kind::CallUsingId,
            NodeKind::CallReturnings => Kind::CallReturnings,
            NodeKind::CallReturningId(_) => Kind::CallReturningId,
            NodeKind::DisplayStatement => Kind::DisplayStatement,
            NodeKind::GobackStatement => Kind::GobackStatement,
            NodeKind::EndProgram(_) => Kind::EndProgram,
        }
    }
}

/// A tree element: kind, source span and owned children.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub location: Location,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind, location: Location, children: Vec<Node>) -> Self {
        Self {
            id: NodeId::fresh(),
            kind,
            location,
            children,
        }
    }

    pub fn leaf(kind: NodeKind, location: Location) -> Self {
        Self::new(kind, location, Vec::new())
    }

    pub fn kind(&self) -> Kind {
        self.kind.kind()
    }

    pub fn is(&self, kind: Kind) -> bool {
        self.kind() == kind
    }

    /// First descendant of the given kind, searching depth-first in pre-order.
    ///
    /// The node itself is not considered.
    pub fn first(&self, kind: Kind) -> Option<&Node> {
        for child in &self.children {
            if child.is(kind) {
                return Some(child);
            }
            if let Some(found) = child.first(kind) {
                return Some(found);
            }
        }
        None
    }

    /// Direct children of the given kind (non-recursive).
    pub fn children_of(&self, kind: Kind) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(move |c| c.is(kind))
    }

    /// First direct child of the given kind.
    pub fn child(&self, kind: Kind) -> Option<&Node> {
        self.children.iter().find(|c| c.is(kind))
    }

    /// Name carried by the direct `Identifier` child (module, program, field).
    pub fn identifier(&self) -> Option<&str> {
        self.children.iter().find_map(|c| match &c.kind {
            NodeKind::Identifier(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Location of the direct `Identifier` child, falling back to the node's own.
    pub fn identifier_location(&self) -> Location {
        self.child(Kind::Identifier)
            .map(|c| c.location)
            .unwrap_or(self.location)
    }
}

/// Pre-order / post-order visitor over a [`Node`] tree.
///
/// Implementors match on the node kind and fall back to a wildcard arm for
/// kinds they do not handle. `C` is the per-compilation context threaded into
/// every handler; `E` the error type that aborts the traversal.
pub trait Visitor<C, E> {
    /// Called before the node's children are visited.
    fn enter(&mut self, _node: &Node, _cx: &mut C) -> Result<(), E> {
        Ok(())
    }

    /// Called after all of the node's children were visited.
    fn leave(&mut self, _node: &Node, _cx: &mut C) -> Result<(), E> {
        Ok(())
    }

    /// Called once after the whole tree has been visited.
    fn cleanup(&mut self, _cx: &mut C) -> Result<(), E> {
        Ok(())
    }
}

/// Rewrites a tree node by node.
///
/// Each call returns the node's replacement: nothing (the node is dropped),
/// the node itself, or several nodes spliced in its place. Children are
/// transformed before their parent sees them.
pub trait Transformer<C, E> {
    fn transform(&mut self, node: Node, _cx: &mut C) -> Result<Vec<Node>, E> {
        Ok(vec![node])
    }

    fn cleanup(&mut self, _cx: &mut C) -> Result<(), E> {
        Ok(())
    }
}

/// Walk `node` depth-first, dispatching `enter` before and `leave` after the children.
///
/// Does not call [`Visitor::cleanup`]; the pipeline does that once per tree.
pub fn walk<C, E>(visitor: &mut dyn Visitor<C, E>, node: &Node, cx: &mut C) -> Result<(), E> {
    visitor.enter(node, cx)?;
    for child in &node.children {
        walk(visitor, child, cx)?;
    }
    visitor.leave(node, cx)
}

/// A transformer replaced the root with something other than exactly one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("root node was replaced by {count} nodes, expected 1")]
pub struct RootReplaced {
    pub count: usize,
}

/// Transform a whole tree; the root must come back as a single node.
pub fn transform_tree<C, E: From<RootReplaced>>(
    transformer: &mut dyn Transformer<C, E>,
    root: Node,
    cx: &mut C,
) -> Result<Node, E> {
    let mut nodes = transform_node(transformer, root, cx)?;
    if nodes.len() != 1 {
        return Err(RootReplaced { count: nodes.len() }.into());
    }
    Ok(nodes.remove(0))
}

/// Rebuild `node` bottom-up through `transformer`.
pub fn transform_node<C, E>(
    transformer: &mut dyn Transformer<C, E>,
    mut node: Node,
    cx: &mut C,
) -> Result<Vec<Node>, E> {
    let children = core::mem::take(&mut node.children);
    let mut rebuilt = Vec::with_capacity(children.len());
    for child in children {
        rebuilt.extend(transform_node(transformer, child, cx)?);
    }
    node.children = rebuilt;
    transformer.transform(node, cx)
}
