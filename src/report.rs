//! CLI report rendering
//!
//! Plain-text tables for terminals and pretty-printed JSON for scripts.

use crate::pipeline::{FieldAudit, ObjectAudit};
use crate::resolve::{EffectiveAccess, MatrixRow, NormalizationReport, PrincipalAccessRow};
use serde::Serialize;
use std::fmt::Write;

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

/// Short access label: `RW`, `R-`, `-W` or `--`
pub fn access_label(access: EffectiveAccess) -> &'static str {
    match (access.can_read, access.can_write) {
        (true, true) => "RW",
        (true, false) => "R-",
        (false, true) => "-W",
        (false, false) => "--",
    }
}

#[derive(Serialize)]
struct MatrixColumn<'a> {
    id: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct MatrixReport<'a> {
    object: &'a str,
    principals: Vec<MatrixColumn<'a>>,
    rows: Vec<MatrixRow>,
    dropped: &'a NormalizationReport,
}

pub fn render_objects(objects: &[String], format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(objects),
        OutputFormat::Pretty if objects.is_empty() => Ok("No objects to audit".to_string()),
        OutputFormat::Pretty => Ok(objects.join("\n")),
    }
}

pub fn render_matrix(audit: &ObjectAudit, format: OutputFormat) -> serde_json::Result<String> {
    let rows = audit.matrix.rows();
    if format == OutputFormat::Json {
        let report = MatrixReport {
            object: &audit.object,
            principals: audit
                .matrix
                .principals()
                .iter()
                .map(|p| MatrixColumn {
                    id: &p.id,
                    name: &p.display_name,
                })
                .collect(),
            rows,
            dropped: &audit.report,
        };
        return serde_json::to_string_pretty(&report);
    }

    let mut headers = vec!["FIELD".to_string(), "TYPE".to_string()];
    headers.extend(
        audit
            .matrix
            .principals()
            .iter()
            .map(|p| p.display_name.clone()),
    );
    let body = rows
        .into_iter()
        .map(|row| {
            let mut line = vec![row.field, row.data_type];
            line.extend(
                row.cells
                    .iter()
                    .map(|cell| access_label(cell.access).to_string()),
            );
            line
        })
        .collect::<Vec<_>>();

    let mut out = format!(
        "{}: {} fields x {} roles\n\n",
        audit.object,
        audit.matrix.fields().len(),
        audit.matrix.principals().len()
    );
    out.push_str(&table(&headers, &body));
    push_dropped(&mut out, &audit.report);
    Ok(out)
}

pub fn render_field(audit: &FieldAudit, format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(audit);
    }

    let field = &audit.field;
    let mut out = format!("{}.{}: {}", audit.object, field.field_name, field.label);
    if let Some(access) = field.override_access() {
        let _ = write!(out, " [fixed {}]", access_label(access));
    }
    out.push_str("\n\n");

    push_principals(&mut out, "Profiles", &audit.principals.roles);
    push_principals(&mut out, "Permission sets", &audit.principals.additive);

    out.push_str("Users\n");
    if audit.identities.is_empty() {
        out.push_str("  (none)\n");
    } else {
        let headers = ["USER", "ACCESS", "PROFILE", "PERMISSION SETS"].map(String::from);
        let body = audit
            .identities
            .iter()
            .map(|record| {
                vec![
                    record.identity_name.clone(),
                    access_label(record.access).to_string(),
                    record.role_display_name.clone().unwrap_or_else(|| "-".to_string()),
                    if record.contributing_principals.is_empty() {
                        "-".to_string()
                    } else {
                        record.contributing_principals.join(", ")
                    },
                ]
            })
            .collect::<Vec<_>>();
        out.push_str(&indent(&table(&headers, &body)));
    }

    push_dropped(&mut out, &audit.report);
    Ok(out)
}

fn push_principals(out: &mut String, title: &str, rows: &[PrincipalAccessRow]) {
    let _ = writeln!(out, "{}", title);
    if rows.is_empty() {
        out.push_str("  (none)\n\n");
        return;
    }
    let headers = ["NAME", "ACCESS"].map(String::from);
    let body = rows
        .iter()
        .map(|row| vec![row.display_name.clone(), access_label(row.access).to_string()])
        .collect::<Vec<_>>();
    out.push_str(&indent(&table(&headers, &body)));
    out.push('\n');
}

fn push_dropped(out: &mut String, report: &NormalizationReport) {
    if report.is_clean() {
        return;
    }
    let _ = write!(
        out,
        "\nDropped {} rows: {} unknown fields, {} unknown principals, {} malformed assignments\n",
        report.dropped_rows(),
        report.unknown_fields,
        report.unknown_principal_rows(),
        report.malformed_assignments
    );
}

/// Left-aligned columns separated by two spaces
fn table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    let mut push_line = |cells: &[String]| {
        let line = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    };

    push_line(headers);
    for row in rows {
        push_line(row);
    }
    out
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("  {}\n", line)).collect()
}
