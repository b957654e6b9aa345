//! Positioned compile errors and the diagnostics they render to.
//!
//! Every user-facing error is a [`CompileError`]: a [`CompileErrorKind`]
//! carrying the data for its message, the file and location it points at,
//! and optionally a second location (the earlier definition, the callee's
//! declaration). [`CompileError::to_diagnostic`] turns it into a
//! [`Diagnostic`] with a stable `CBLnnnn` code for renderers and tooling.


use core::fmt;

use crate::ast::Location;
use crate::symbols::{ExprType, UsageKind};

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Compilation cannot succeed.
    Error,
    /// Suspicious code that might be wrong.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A secondary location explaining a diagnostic ("previously defined here").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedInfo {
    pub file: String,
    pub location: Location,
    pub message: String,
}

/// A rendered-ready error report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable error code, e.g. `CBL0002`.
    pub code: &'static str,
    pub message: String,
    pub file: String,
    pub location: Location,
    pub related: Vec<RelatedInfo>,
    pub help: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}[{}]: {}",
            self.file, self.location, self.severity, self.code, self.message
        )
    }
}

/// What went wrong, with the data each message needs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileErrorKind {
    #[error("{message}")]
    Parse { message: String },

    #[error("'{name}' is already defined")]
    Redefinition { name: String },

    #[error("'{name}' is not defined")]
    Undefined { name: String },

    #[error("level number {level} is outside 1..=77")]
    BadLevel { level: u32 },

    #[error("sign 'S' of '{name}' must be the first picture character")]
    BadSignPicture { name: String },

    #[error("picture of '{name}' has more than one 'V'")]
    ManyVirtualDecimalPoint { name: String },

    #[error("bad default value for '{name}': {reason}")]
    BadDefaultValue { name: String, reason: String },

    #[error("picture of '{name}' is not compatible with COMP-4")]
    IncompatibleComp4Picture { name: String },

    #[error("{usage} field '{name}' cannot have a picture")]
    PictureNotAllowed { name: String, usage: UsageKind },

    #[error("'{name}' must be declared in the linkage section")]
    NotInLinkageSection { name: String },

    #[error("picture of '{name}' has {digits} digits, COMP-4 allows at most 18")]
    ExceedComp4Precision { name: String, digits: u32 },

    #[error("'{name}' is passed more than once as a mutable argument")]
    MutableArgumentRedefinition { name: String },

    #[error("'{program}' has no returning value to use as an expression")]
    ExpressionReturnsNothing { program: String },

    #[error("parameter '{name}' cannot have a default value")]
    UsingWithDefaultValue { name: String },

    #[error("'{program}' expects {expected} using argument(s), found {found}")]
    UsingCountMismatch {
        program: String,
        expected: usize,
        found: usize,
    },

    #[error("'{program}' returns {expected} value(s), {found} requested")]
    ReturningCountMismatch {
        program: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {position} type mismatch: expected {expected}, found {found}")]
    ArgumentTypeMismatch {
        position: usize,
        expected: UsageKind,
        found: ExprType,
    },

    #[error("returning {position} type mismatch: expected {expected}, found {found}")]
    ReturningTypeMismatch {
        position: usize,
        expected: UsageKind,
        found: UsageKind,
    },

    #[error("END PROGRAM '{found}' does not match program '{expected}'")]
    EndMarkerMismatch { expected: String, found: String },

    #[error("ANY field '{name}' is only allowed in the linkage section")]
    AnyOutsideLinkage { name: String },

    #[error("literal {literal} exceeds 18 digits of precision")]
    ExceedLiteralPrecision { literal: String },

    #[error("'{literal}' is not a valid number")]
    BadNumericLiteral { literal: String },

    #[error("{kind} is not a valid call argument")]
    UnexpectedArgument { kind: String },
}

impl CompileErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            CompileErrorKind::Parse { .. } => "CBL0001",
            CompileErrorKind::Redefinition { .. } => "CBL0002",
            CompileErrorKind::Undefined { .. } => "CBL0003",
            CompileErrorKind::BadLevel { .. } => "CBL0004",
            CompileErrorKind::BadSignPicture { .. } => "CBL0005",
            CompileErrorKind::ManyVirtualDecimalPoint { .. } => "CBL0006",
            CompileErrorKind::BadDefaultValue { .. } => "CBL0007",
            CompileErrorKind::IncompatibleComp4Picture { .. } => "CBL0008",
            CompileErrorKind::PictureNotAllowed { .. } => "CBL0009",
            CompileErrorKind::NotInLinkageSection { .. } => "CBL0010",
            CompileErrorKind::ExceedComp4Precision { .. } => "CBL0011",
            CompileErrorKind::MutableArgumentRedefinition { .. } => "CBL0012",
            CompileErrorKind::ExpressionReturnsNothing { .. } => "CBL0013",
            CompileErrorKind::UsingWithDefaultValue { .. } => "CBL0014",
            CompileErrorKind::UsingCountMismatch { .. } => "CBL0015",
            CompileErrorKind::ReturningCountMismatch { .. } => "CBL0016",
            CompileErrorKind::ArgumentTypeMismatch { .. } => "CBL0017",
            CompileErrorKind::ReturningTypeMismatch { .. } => "CBL0018",
            CompileErrorKind::EndMarkerMismatch { .. } => "CBL0019",
            CompileErrorKind::AnyOutsideLinkage { .. } => "CBL0020",
            CompileErrorKind::ExceedLiteralPrecision { .. } => "CBL0021",
            CompileErrorKind::BadNumericLiteral { .. } => "CBL0022",
            CompileErrorKind::UnexpectedArgument { .. } => "CBL0023",
        }
    }

    fn help(&self) -> Option<&'static str> {
        match self {
            CompileErrorKind::BadLevel { .. } => Some("Use a level number between 01 and 77"),
            CompileErrorKind::ExceedComp4Precision { .. } => {
                Some("Use COMP-2 for values that need more than 18 digits")
            }
            CompileErrorKind::NotInLinkageSection { .. } => {
                Some("Procedure parameters are declared in the LINKAGE SECTION")
            }
            CompileErrorKind::MutableArgumentRedefinition { .. } => {
                Some("Pass one of the arguments BY CONTENT")
            }
            CompileErrorKind::ReturningCountMismatch { .. } => {
                Some("A call may request fewer returning values than declared, never more")
            }
            _ => None,
        }
    }

    fn related_message(&self) -> &'static str {
        match self {
            CompileErrorKind::Redefinition { .. } => "previously defined here",
            CompileErrorKind::MutableArgumentRedefinition { .. } => "first passed here",
            CompileErrorKind::ArgumentTypeMismatch { .. }
            | CompileErrorKind::ReturningTypeMismatch { .. } => "parameter declared here",
            _ => "related location",
        }
    }
}

/// A second location attached to an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Related {
    pub file: String,
    pub location: Location,
}

/// A positioned compile error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{file}:{location}: {kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub file: String,
    pub location: Location,
    pub related: Option<Related>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, file: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            file: file.into(),
            location,
            related: None,
        }
    }

    pub fn with_related(mut self, file: impl Into<String>, location: Location) -> Self {
        self.related = Some(Related {
            file: file.into(),
            location,
        });
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Convert to a Diagnostic for API boundary.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let related = self
            .related
            .iter()
            .map(|related| RelatedInfo {
                file: related.file.clone(),
                location: related.location,
                message: self.kind.related_message().to_string(),
            })
            .collect();
        Diagnostic {
            severity: Severity::Error,
            code: self.kind.code(),
            message: self.kind.to_string(),
            file: self.file.clone(),
            location: self.location,
            related,
            help: self.kind.help().map(str::to_string),
        }
    }
}
