//! CLI output formatting.
//!
//! Output is **information-centric**: the header line names the thing the
//! user asked about (a source image, a batch job), with details on indented
//! context lines underneath.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! photo.jpg (jpeg 800x600)
//!     Mode: crop
//!     Canvas: 200x200
//!     Crop: 600x600 at (100, 0)
//!     Resize: 200x200
//! ```
//!
//! ## Batch
//!
//! ```text
//! 001 photo.jpg → out/photo.jpg
//!     rendered jpeg 200x200 (8812 bytes)
//! 002 logo.png → out/logo.png
//!     skipped: crop mode 1 requires a gravity (g=1..9)
//!
//! Rendered 1, skipped 1, failed 0
//! ```
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>` or
//! `String`) for testability and a `print_*` wrapper that writes to stdout.
//! Format functions are pure: no I/O, no side effects.

use crate::batch::{BatchSummary, JobResult, JobStatus};
use crate::imaging::{ImageFormat, Layout, PlanOutcome, Rendered, Size, operations::Prepared};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `WxH`, with fractions only where a side is not whole.
fn format_size(size: Size) -> String {
    format!("{}x{}", size.width, size.height)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Plan
// ============================================================================

/// Format the geometry plan computed for `source`.
pub fn format_plan(source: &Path, prepared: &Prepared) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({} {}x{})",
        file_name(source),
        prepared.format,
        prepared.dimensions.width,
        prepared.dimensions.height
    )];
    let ctx = indent(1);

    let plan = match &prepared.outcome {
        PlanOutcome::Transform(plan) => plan,
        PlanOutcome::Skip { reason } => {
            lines.push(format!("{ctx}Skipped: {reason}"));
            return lines;
        }
    };

    lines.push(format!("{ctx}Mode: {}", plan.mode_name()));
    lines.push(format!("{ctx}Canvas: {}", format_size(plan.canvas)));
    match &plan.layout {
        Layout::Fit { resize } => {
            lines.push(format!("{ctx}Resize: {}", format_size(*resize)));
        }
        Layout::Crop { crop, resize } => {
            lines.push(format!(
                "{ctx}Crop: {} at ({}, {})",
                format_size(crop.size()),
                crop.x,
                crop.y
            ));
            lines.push(format!("{ctx}Resize: {}", format_size(*resize)));
        }
        Layout::Margin {
            mapped,
            x,
            y,
            background,
        } => {
            lines.push(format!(
                "{ctx}Image: {} at ({x}, {y})",
                format_size(*mapped)
            ));
            lines.push(format!("{ctx}Background: {background}"));
        }
    }
    if let Some(hint) = plan.decode_hint {
        lines.push(format!("{ctx}Decode hint: {}x{}", hint.width, hint.height));
    }
    lines
}

pub fn print_plan(source: &Path, prepared: &Prepared) {
    for line in format_plan(source, prepared) {
        println!("{}", line);
    }
}

// ============================================================================
// Sniff / render
// ============================================================================

/// One line per sniffed file: name, format and MIME type.
pub fn format_sniff(path: &Path, format: ImageFormat) -> String {
    format!(
        "{}: {} ({})",
        path.display(),
        format,
        format.content_type()
    )
}

/// Confirmation line after a single render.
pub fn format_rendered(output: &Path, rendered: &Rendered) -> String {
    let canvas = rendered.plan.canvas.rounded();
    format!(
        "{} \u{2192} {} {}x{} ({} bytes)",
        rendered.plan.mode_name(),
        output.display(),
        canvas.width,
        canvas.height,
        rendered.bytes.len()
    )
}

// ============================================================================
// Batch
// ============================================================================

/// Format one finished batch job.
///
/// The header carries the 1-based job position, then the status on an
/// indented line.
pub fn format_job_result(result: &JobResult) -> Vec<String> {
    let header = format!(
        "{} {} \u{2192} {}",
        format_index(result.index + 1),
        file_name(&result.source),
        result.output.display()
    );
    let detail = match &result.status {
        JobStatus::Rendered {
            format,
            width,
            height,
            bytes,
        } => format!("rendered {format} {width}x{height} ({bytes} bytes)"),
        JobStatus::Skipped { reason } => format!("skipped: {reason}"),
        JobStatus::Failed { error } => format!("failed: {error}"),
    };
    vec![header, format!("{}{}", indent(1), detail)]
}

pub fn format_batch_summary(summary: &BatchSummary) -> String {
    format!(
        "Rendered {}, skipped {}, failed {}",
        summary.rendered, summary.skipped, summary.failed
    )
}

// ============================================================================
// Tests
// ============================================================================
