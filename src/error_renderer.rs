//! Error rendering using ariadne
//!
//! Positioned compile errors are rendered as annotated source snippets;
//! everything else is printed as a single line.

use core::ops::Range;
use std::io::Write;

use ariadne::{ColorGenerator, Config, IndexType, Label, Report, ReportKind, Source};

use crate::{Diagnostic, Error, Severity};
use cbl_core::ast::{Location, Position};

/// Render an error against the text of the file it points into, to stderr.
///
/// # Example
/// ```no_run
/// use cbl::{Compiler, CompileOptions, render_error};
/// # fn parser() -> Box<dyn cbl::SourceParser> { unimplemented!() }
///
/// let mut compiler = Compiler::new(CompileOptions::default(), parser());
/// let source = std::fs::read_to_string("hello.cbl").unwrap();
/// if let Err(e) = compiler.compile_source(source.as_bytes(), "hello.cbl", None) {
///     render_error(&e, &source);
/// }
/// ```
pub fn render_error(error: &Error, source: &str) {
    render_error_to_writer(error, source, &mut std::io::stderr(), true).ok();
}

/// Render an error to a specific writer
pub fn render_error_to(error: &Error, source: &str, writer: &mut dyn Write) -> std::io::Result<()> {
    render_error_to_writer(error, source, writer, true)
}

/// Render an error to a String (useful for logs, editors, etc.)
pub fn render_error_to_string(error: &Error, source: &str) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source, &mut buf, true).ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// Render an error to a String without color codes (useful for tests)
pub fn render_error_to_string_no_color(error: &Error, source: &str) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source, &mut buf, false).ok();
    String::from_utf8_lossy(&buf).to_string()
}

fn render_error_to_writer(
    error: &Error,
    source: &str,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    match error.to_diagnostic() {
        Some(diagnostic) => render_diagnostic(source, &diagnostic, writer, use_color),
        None => writeln!(writer, "error: {}", error),
    }
}

/// Byte offset of a 1-based line/column position, clamped to `source`.
fn offset_of(source: &str, position: Position) -> usize {
    let mut offset = 0;
    for (index, line) in source.split_inclusive('\n').enumerate() {
        if index + 1 == position.line {
            let column = position.column.saturating_sub(1);
            return offset + column.min(line.trim_end_matches('\n').len());
        }
        offset += line.len();
    }
    source.len()
}

/// Byte range of `location` in `source`.
///
/// Uses the recorded offsets when the parser filled them in, else the
/// line and column.
fn span(source: &str, location: Location) -> Range<usize> {
    let (start, end) = if location.end.offset > location.start.offset {
        (location.start.offset, location.end.offset)
    } else {
        (
            offset_of(source, location.start),
            offset_of(source, location.end),
        )
    };
    let start = start.min(source.len());
    let end = end.clamp(start, source.len());
    if end == start && end < source.len() {
        start..end + 1
    } else {
        start..end
    }
}

fn render_diagnostic(
    source: &str,
    diag: &Diagnostic,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    let mut colors = ColorGenerator::new();
    colors.next(); // Skip the first color.

    let kind = match diag.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
    };

    let file = diag.file.as_str();
    let primary = span(source, diag.location);
    let mut report = Report::build(kind, (file, primary.clone()))
        .with_code(diag.code)
        .with_message(&diag.message)
        .with_config(
            Config::default()
                .with_color(use_color)
                .with_index_type(IndexType::Byte),
        );

    report = report.with_label(
        Label::new((file, primary))
            .with_message(&diag.message)
            .with_color(colors.next()),
    );

    // Related spans in this file become labels; others can only be named.
    for related in &diag.related {
        if related.file == diag.file {
            report = report.with_label(
                Label::new((file, span(source, related.location)))
                    .with_message(&related.message)
                    .with_color(colors.next()),
            );
        } else {
            report = report.with_note(format!(
                "{} at {}:{}",
                related.message, related.file, related.location
            ));
        }
    }

    if let Some(help) = &diag.help {
        report = report.with_help(help);
    }

    report.finish().write((file, Source::from(source)), &mut *writer)
}
