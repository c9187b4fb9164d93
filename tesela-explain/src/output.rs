//! Output formatters for tesela-explain
//!
//! Supports colored text for the terminal and JSON for tooling.

use std::fmt::Debug;
use std::io::{self, Write};

use colored::Colorize;
use serde::Serialize;

use crate::report::{GraphReport, LayoutReport, QParamsReport};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colored text output for terminal
    #[default]
    Text,
    /// JSON output for tooling and CI
    Json,
}

impl OutputFormat {
    /// JSON when `json` is set, text otherwise
    #[must_use]
    pub const fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

fn header(output: &mut String, kind: &str, name: &str) {
    output.push_str(&format!("{} {}\n", kind.cyan().bold(), name.white().bold()));
    output.push_str(&"═".repeat(60));
    output.push('\n');
}

fn field(output: &mut String, last: bool, name: &str, value: impl Debug) {
    let branch = if last { "└──" } else { "├──" };
    output.push_str(&format!("  {branch} {name}: {value:?}\n"));
}

/// Format a layout report as colored text
#[must_use]
pub fn format_layout_text(report: &LayoutReport) -> String {
    let mut output = String::new();
    header(
        &mut output,
        "Layout:",
        &format!(
            "{:?} {:?} {:?}",
            report.sizes, report.storage_type, report.memory_layout
        ),
    );

    output.push_str(&format!("\n{}\n", "Logical:".white().bold()));
    field(&mut output, false, "dtype", report.dtype);
    field(&mut output, false, "dim order", &report.dim_order);
    field(&mut output, false, "strides", &report.strides);
    field(&mut output, true, "numel", report.numel);

    output.push_str(&format!("\n{}\n", "Physical:".white().bold()));
    field(&mut output, false, "axis map", report.axis_map);
    field(&mut output, false, "packed dim", report.packed_dim);
    field(&mut output, false, "padded sizes", &report.padded_sizes);
    field(&mut output, false, "unsqueezed strides", &report.unsqueezed_strides);
    match report.image_extents {
        Some(extents) => field(&mut output, false, "image extents", extents),
        None => output.push_str(&format!("  ├── image extents: {}\n", "n/a (buffer)".dimmed())),
    }
    field(&mut output, false, "logical limits", report.logical_limits);
    field(&mut output, false, "padded numel", report.padded_numel);
    field(&mut output, false, "nbytes", report.nbytes);
    field(&mut output, false, "staging nbytes", report.staging_buffer_nbytes);
    output.push_str(&format!(
        "  └── hashed layout: {}\n",
        format!("{:#x}", report.hashed_layout).green()
    ));

    let padding = report.padded_numel.saturating_sub(report.numel);
    if padding > 0 {
        output.push_str(&format!(
            "\n{} {} padding elements ({:.1}%)\n",
            "⚠".yellow(),
            padding,
            padding as f64 / report.padded_numel as f64 * 100.0
        ));
    } else {
        output.push_str(&format!("\n{} No padding\n", "✓".green()));
    }
    output
}

/// Format a quantization report as colored text
#[must_use]
pub fn format_qparams_text(report: &QParamsReport) -> String {
    let mut output = String::new();
    header(
        &mut output,
        "Quantization:",
        &format!("[{}, {}] -> {:?}", report.min, report.max, report.dtype),
    );
    field(&mut output, false, "qrange", (report.qmin, report.qmax));
    field(&mut output, false, "scale", report.scale);
    field(&mut output, false, "zero point", report.zero_point);
    field(&mut output, false, "min round trip", report.min_roundtrip);
    field(&mut output, true, "max round trip", report.max_roundtrip);
    output
}

/// Format a graph report as colored text
#[must_use]
pub fn format_graph_text(report: &GraphReport) -> String {
    let mut output = String::new();
    header(&mut output, "Graph:", &format!("version {}", report.version));
    output.push_str(&format!(
        "  {} operators, {} values, {} tensors, {} shared objects\n",
        report.operators,
        report.values,
        report.tensors.len(),
        report.shared_objects
    ));
    output.push_str(&format!(
        "  inputs {:?} outputs {:?}\n\n",
        report.input_ids, report.output_ids
    ));

    for row in &report.tensors {
        let extents = row
            .image_extents
            .map_or_else(|| "buffer".to_string(), |e| format!("{e:?}"));
        output.push_str(&format!(
            "  {:>4} {:<20} {:<8} {:<10} {:<15} {:<14} {:>10} B",
            format!("%{}", row.id).cyan(),
            format!("{:?}", row.sizes),
            format!("{:?}", row.dtype),
            format!("{:?}", row.storage_type),
            format!("{:?}", row.memory_layout),
            extents,
            row.nbytes
        ));
        if let Some(c) = row.constant_id {
            output.push_str(&format!(" {}", format!("const#{c}").yellow()));
        }
        if let Some(s) = row.shared_object_id {
            output.push_str(&format!(" {}", format!("shared#{s}").magenta()));
        }
        output.push('\n');
    }
    output
}

/// Format any report as JSON
///
/// # Errors
///
/// Returns `serde_json::Error` if serialization fails.
pub fn format_json<T: Serialize>(report: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Write a report to stdout in the specified format
///
/// # Errors
///
/// Returns `io::Error` if writing to stdout fails or JSON serialization fails.
pub fn write_report<T: Serialize>(
    report: &T,
    text: impl FnOnce(&T) -> String,
    format: OutputFormat,
) -> io::Result<()> {
    let mut stdout = io::stdout().lock();

    match format {
        OutputFormat::Text => {
            write!(stdout, "{}", text(report))?;
        }
        OutputFormat::Json => {
            let json = format_json(report).map_err(io::Error::other)?;
            writeln!(stdout, "{json}")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{explain_layout, explain_qparams, LayoutRequest};
    use tesela::{MemoryLayout, ScalarType, StorageType};

    #[test]
    fn test_format_layout_text() {
        colored::control::set_override(false);
        let report = explain_layout(&LayoutRequest::new(&[1, 3, 17, 9])).unwrap();
        let text = format_layout_text(&report);
        assert!(text.contains("Layout:"));
        assert!(text.contains("dim order: [0, 2, 3, 1]"));
        assert!(text.contains("image extents: [9, 17, 1]"));
        assert!(text.contains("hashed layout: 0x22210"));
        assert!(text.contains("153 padding elements"));
    }

    #[test]
    fn test_format_layout_text_buffer() {
        colored::control::set_override(false);
        let mut request = LayoutRequest::new(&[4, 8]);
        request.storage_type = StorageType::Buffer;
        request.memory_layout = MemoryLayout::WidthPacked;
        let text = format_layout_text(&explain_layout(&request).unwrap());
        assert!(text.contains("n/a (buffer)"));
        assert!(text.contains("No padding"));
    }

    #[test]
    fn test_format_qparams_text() {
        colored::control::set_override(false);
        let report = explain_qparams(ScalarType::QUInt8, 0.0, 0.0).unwrap();
        let text = format_qparams_text(&report);
        assert!(text.contains("scale: 0.1"));
        assert!(text.contains("zero point: 0"));
    }

    #[test]
    fn test_format_json() {
        let report = explain_layout(&LayoutRequest::new(&[2, 3])).unwrap();
        let json = format_json(&report).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["sizes"], serde_json::json!([2, 3]));
        assert_eq!(parsed["storage_type"], "Texture3D");
        assert!(parsed.get("hashed_layout").is_some());
    }

    #[test]
    fn test_output_format_flag() {
        assert_eq!(OutputFormat::from_json_flag(true), OutputFormat::Json);
        assert_eq!(OutputFormat::from_json_flag(false), OutputFormat::Text);
    }
}
