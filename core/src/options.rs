//! Configuration options for the compiler.

use std::path::PathBuf;

/// How a `COMP-4` default with more fractional digits than its PICTURE
/// scale is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FractionPolicy {
    /// Drop the extra digits: `PIC 9V9 VALUE 1.25` stores `1.2`.
    #[default]
    Truncate,
    /// Fail the declaration with a bad-default-value error.
    Reject,
}

/// Configuration options for compilation.
///
/// # Example
///
/// ```
/// use cbl_core::{CompileOptions, FractionPolicy};
///
/// let options = CompileOptions {
///     free_format: true,
///     system_declarations: None,
///     fraction_policy: FractionPolicy::Reject,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Forwarded to the parser: free-format instead of fixed-column source.
    ///
    /// Default: false
    pub free_format: bool,

    /// Directory searched recursively for `*.d.cbl` system declaration files.
    ///
    /// `None` skips the declaration warm-up entirely.
    ///
    /// Default: `<executable dir>/../types`, when the executable path is known.
    pub system_declarations: Option<PathBuf>,

    /// Handling of excess fractional digits in `COMP-4` defaults.
    ///
    /// Default: [`FractionPolicy::Truncate`]
    pub fraction_policy: FractionPolicy,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            free_format: false,
            system_declarations: default_system_declarations(),
            fraction_policy: FractionPolicy::default(),
        }
    }
}

fn default_system_declarations() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let bin_dir = exe.parent()?;
    Some(bin_dir.join("..").join("types"))
}
