//! Human-readable rendering of resolution errors.
//!
//! A failed open is rendered with the full chain that was being opened, the
//! failing layer highlighted, followed by the cause chain:
//!
//! ```text
//! error: failed to open GZIP: format error: invalid gzip header
//!   ┌─ path specification
//! 1 │ type: OS, location=/img.raw
//! 2 │ type: GZIP
//!   │ ^^^^^^^^^^
//!   = caused by: format error: invalid gzip header
//! ```

use std::error::Error as StdError;
use std::fmt::Write;

use super::error::VfsError;
use crate::path::PathSpec;

// ============================================================================
// Options
// ============================================================================

/// Display style for diagnostic output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayStyle {
    /// Message plus chain snippet, causes and hints.
    #[default]
    Rich,
    /// One line: message and a compact `OS > QCOW > FS` chain.
    Short,
}

/// Options for controlling diagnostic formatting.
///
/// # Example
///
/// ```ignore
/// use layered_vfs::diagnostic::{DiagnosticOptions, DisplayStyle};
///
/// // Default: colored rich output
/// let opts = DiagnosticOptions::default();
///
/// // Plain text (no ANSI colors) for log files
/// let opts = DiagnosticOptions::plain();
///
/// // One line per error
/// let opts = DiagnosticOptions::short();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticOptions {
    /// Whether to use ANSI colors in output.
    pub colored: bool,
    /// Display style (rich with snippets or short).
    pub style: DisplayStyle,
    /// Whether to print the path specification chain.
    pub snippets: bool,
    /// Whether to include the cause chain.
    pub causes: bool,
    /// Whether to include hints.
    pub hints: bool,
}

impl Default for DiagnosticOptions {
    fn default() -> Self {
        Self {
            colored: true,
            style: DisplayStyle::Rich,
            snippets: true,
            causes: true,
            hints: true,
        }
    }
}

impl DiagnosticOptions {
    /// Create options for colored terminal output.
    pub fn colored() -> Self {
        Self::default()
    }

    /// Create options for plain text output (no ANSI colors).
    pub fn plain() -> Self {
        Self {
            colored: false,
            ..Self::default()
        }
    }

    /// Create options for short format.
    pub fn short() -> Self {
        Self {
            style: DisplayStyle::Short,
            snippets: false,
            causes: false,
            ..Self::default()
        }
    }

    /// Set whether to use colors.
    pub fn with_colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// Set display style.
    pub fn with_style(mut self, style: DisplayStyle) -> Self {
        self.style = style;
        self
    }

    /// Set whether to print the chain.
    pub fn with_snippets(mut self, snippets: bool) -> Self {
        self.snippets = snippets;
        self
    }

    /// Set whether to include the cause chain.
    pub fn with_causes(mut self, causes: bool) -> Self {
        self.causes = causes;
        self
    }

    /// Set whether to include hints.
    pub fn with_hints(mut self, hints: bool) -> Self {
        self.hints = hints;
        self
    }
}

// ============================================================================
// Gutter Characters
// ============================================================================

mod gutter {
    pub const HEADER: &str = "┌─";
    pub const BAR: &str = "│";
    pub const MARKER: &str = "^";
    pub const NOTE: &str = "=";
}

// ============================================================================
// Coloring
// ============================================================================

#[cfg(feature = "colored-diagnostics")]
fn colorize_error(text: &str) -> String {
    use owo_colors::OwoColorize;
    text.red().to_string()
}

#[cfg(feature = "colored-diagnostics")]
fn colorize_help(text: &str) -> String {
    use owo_colors::OwoColorize;
    text.cyan().to_string()
}

#[cfg(not(feature = "colored-diagnostics"))]
fn colorize_error(text: &str) -> String {
    text.to_owned()
}

#[cfg(not(feature = "colored-diagnostics"))]
fn colorize_help(text: &str) -> String {
    text.to_owned()
}

fn get_paint_fn(options: &DiagnosticOptions) -> Box<dyn Fn(&str) -> String> {
    if options.colored {
        Box::new(colorize_error)
    } else {
        Box::new(|s: &str| s.to_owned())
    }
}

fn get_help_paint_fn(options: &DiagnosticOptions) -> Box<dyn Fn(&str) -> String> {
    if options.colored {
        Box::new(colorize_help)
    } else {
        Box::new(|s: &str| s.to_owned())
    }
}

/// Disable colored output globally (for tests).
#[cfg(all(test, feature = "colored-diagnostics"))]
pub fn disable_colors() {
    owo_colors::set_override(false);
}

// ============================================================================
// Public API
// ============================================================================

/// Format an error with default options.
pub fn format_error(error: &VfsError) -> String {
    format_error_with_options(error, &DiagnosticOptions::default())
}

/// Format an error with custom options.
pub fn format_error_with_options(error: &VfsError, options: &DiagnosticOptions) -> String {
    let mut output = String::new();
    let paint = get_paint_fn(options);

    match options.style {
        DisplayStyle::Short => format_short(&mut output, error, &paint),
        DisplayStyle::Rich => format_rich(&mut output, error, &paint, options),
    }

    output
}

/// Render a chain as `OS > QCOW > FS`.
pub fn chain_summary(spec: &PathSpec) -> String {
    spec.chain()
        .iter()
        .map(|node| node.type_indicator().as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}

/// A suggestion for errors that have an obvious remedy.
pub fn hint(error: &VfsError) -> Option<&'static str> {
    match error.root_cause() {
        VfsError::MountNotFound { .. } => {
            Some("register the mount point before resolving, or remount it")
        }
        VfsError::CyclicMount { .. } => {
            Some("a mount point refers to itself directly or through other mount points")
        }
        VfsError::UnsupportedType { .. } => {
            Some("register a resolver helper for this type indicator")
        }
        VfsError::AlreadyRegistered { .. } | VfsError::NotRegistered { .. } => {
            Some("registration errors indicate a setup bug; check start-up code")
        }
        _ => None,
    }
}

// ============================================================================
// Internal Formatting
// ============================================================================

fn format_short(output: &mut String, error: &VfsError, paint: &dyn Fn(&str) -> String) {
    match error.path_spec() {
        Some(spec) => {
            _ = writeln!(output, "{}: {} [{}]", paint("error"), error, chain_summary(spec));
        }
        None => {
            _ = writeln!(output, "{}: {}", paint("error"), error);
        }
    }
}

fn format_rich(
    output: &mut String,
    error: &VfsError,
    paint: &dyn Fn(&str) -> String,
    options: &DiagnosticOptions,
) {
    _ = writeln!(output, "{}: {}", paint("error"), error);

    if options.snippets
        && let Some(spec) = error.path_spec()
    {
        write_chain(output, spec, paint);
    }

    let help_paint = get_help_paint_fn(options);

    if options.causes {
        let mut source = StdError::source(error);
        while let Some(cause) = source {
            _ = writeln!(output, "  {} caused by: {}", help_paint(gutter::NOTE), cause);
            source = cause.source();
        }
    }

    if options.hints
        && let Some(hint) = hint(error)
    {
        _ = writeln!(output, "  {} hint: {}", help_paint(gutter::NOTE), hint);
    }
}

/// Write the numbered chain, marking the leaf (the layer that failed).
fn write_chain(output: &mut String, spec: &PathSpec, paint: &dyn Fn(&str) -> String) {
    let lines: Vec<&str> = spec.comparable().lines().collect();
    let width = lines.len().to_string().len();

    _ = writeln!(
        output,
        "{:width$} {} path specification",
        "",
        gutter::HEADER,
        width = width
    );

    let last = lines.len().saturating_sub(1);
    for (i, line) in lines.iter().enumerate() {
        if i == last {
            _ = writeln!(output, "{:>width$} {} {}", i + 1, gutter::BAR, paint(line), width = width);
            let marker = gutter::MARKER.repeat(line.chars().count());
            _ = writeln!(
                output,
                "{:width$} {} {}",
                "",
                gutter::BAR,
                paint(&marker),
                width = width
            );
        } else {
            _ = writeln!(output, "{:>width$} {} {}", i + 1, gutter::BAR, line, width = width);
        }
    }
}
