//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use super::commands::{ContextInfo, StatusReport, ValidationResult};
use crate::environment::OperationStatus;

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    // Calculate column widths
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();

    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            output.push_str("   ");
        }
        output.push_str(&format!(
            "{:width$}",
            header.to_uppercase(),
            width = widths[i]
        ));
    }
    output.push('\n');

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                output.push_str("   ");
            }
            if i < widths.len() {
                output.push_str(&format!("{:width$}", cell, width = widths[i]));
            } else {
                output.push_str(cell);
            }
        }
        output.push('\n');
    }

    output
}

// ============================================================================
// Context display
// ============================================================================

/// Format context list for display
pub fn format_context_list(contexts: &[ContextInfo]) -> String {
    let headers = &["", "NAME", "CONTROLLER", "SCHEDULER"];
    let rows: Vec<Vec<String>> = contexts
        .iter()
        .map(|ctx| {
            vec![
                if ctx.is_current { "*" } else { " " }.to_string(),
                ctx.name.clone(),
                ctx.controller.clone(),
                ctx.scheduler_url.clone(),
            ]
        })
        .collect();

    format_table(headers, rows)
}

/// Format current context for display
pub fn format_current_context(ctx: &ContextInfo) -> String {
    format!(
        "Current context: {} (controller {}, scheduler {})\n",
        ctx.name, ctx.controller, ctx.scheduler_url
    )
}

// ============================================================================
// Validation display
// ============================================================================

/// Format validation result for display
pub fn format_validation_result(result: &ValidationResult, path: &str) -> String {
    let mut output = String::new();

    if result.valid {
        output.push_str(&format!("✓ {} is valid\n\n", path));
        if let Some(ref name) = result.name {
            output.push_str(&format!("  Name:       {}\n", name));
        }
        output.push_str(&format!(
            "  Components: {}\n",
            result.components.join(", ")
        ));
        output.push_str(&format!("  Tunnels:    {}\n", result.tunnels));
    } else {
        output.push_str(&format!("✗ {} is invalid\n\n", path));
        if let Some(ref error) = result.error {
            output.push_str(&format!("  Error: {}\n", error));
        }
    }

    output
}

// ============================================================================
// Status display
// ============================================================================

/// Format machine classes and the components pinned to them
pub fn format_status(report: &StatusReport) -> String {
    let mut output = String::new();

    output.push_str("Machine classes\n");
    output.push_str("===============\n\n");
    let rows: Vec<Vec<String>> = report
        .cluster
        .iter()
        .map(|class| {
            vec![
                class.name.clone(),
                class.node_count.to_string(),
                format!("{}", class.cpu_per_node),
                format!("{}", class.mem_per_node),
                class.hostname.clone(),
            ]
        })
        .collect();
    output.push_str(&format_table(
        &["MACHINE", "NODES", "CPUS/NODE", "MEM/NODE", "HOSTNAME"],
        rows,
    ));

    output.push_str("\nRunning components\n");
    output.push_str("==================\n\n");
    let mut machines: Vec<&String> = report.by_machine.keys().collect();
    machines.sort();
    let rows: Vec<Vec<String>> = machines
        .into_iter()
        .flat_map(|machine| {
            report.by_machine[machine].iter().map(move |component| {
                vec![
                    component.app_id.trim_matches('/').to_string(),
                    machine.clone(),
                    component.instance_count.to_string(),
                ]
            })
        })
        .collect();
    output.push_str(&format_table(&["COMPONENT", "MACHINE", "INSTANCES"], rows));

    output
}

/// Format the result of run, destroy or scale
pub fn format_operation_status(status: &OperationStatus) -> String {
    let marker = if status.success { "✓" } else { "✗" };
    format!("{} {}\n", marker, status.message)
}
