//! Grant normalizer
//!
//! Turns raw field-permission and assignment rows into [`GrantRecord`]s and
//! [`AssignmentRecord`]s. Rows that reference unknown fields or principals are
//! dropped and counted; they never abort a run.

use crate::resolve::catalog::PrincipalCatalog;
use crate::resolve::types::{AssignmentRecord, FieldDescriptor, GrantRecord};
use crate::source::{RawAssignmentRow, RawGrantRow};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{trace, warn};

/// What a dropped row pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Field,
    GrantPrincipal,
    AssignmentPrincipal,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::Field => "field",
            ReferenceKind::GrantPrincipal => "grant principal",
            ReferenceKind::AssignmentPrincipal => "assignment principal",
        };
        write!(f, "{}", s)
    }
}

/// Non-fatal warning: a row referenced an id absent from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnknownReference {
    pub kind: ReferenceKind,
    pub id: String,
}

/// Rows dropped while normalizing one run's input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationReport {
    pub unknown_fields: usize,
    pub unknown_grant_principals: usize,
    pub unknown_assignment_principals: usize,
    pub malformed_assignments: usize,
    /// Distinct unknown principal ids, sorted
    pub unknown_references: Vec<UnknownReference>,
}

impl NormalizationReport {
    /// Rows dropped because they named a principal the catalog does not know
    pub fn unknown_principal_rows(&self) -> usize {
        self.unknown_grant_principals + self.unknown_assignment_principals
    }

    pub fn dropped_rows(&self) -> usize {
        self.unknown_fields + self.unknown_principal_rows() + self.malformed_assignments
    }

    pub fn is_clean(&self) -> bool {
        self.dropped_rows() == 0
    }

    fn unknown(&mut self, kind: ReferenceKind, id: &str) {
        match kind {
            ReferenceKind::Field => self.unknown_fields += 1,
            ReferenceKind::GrantPrincipal => self.unknown_grant_principals += 1,
            ReferenceKind::AssignmentPrincipal => self.unknown_assignment_principals += 1,
        }
        // Unknown fields are dropped silently; only principals are reported by id
        if kind != ReferenceKind::Field {
            self.unknown_references.push(UnknownReference {
                kind,
                id: id.to_string(),
            });
        }
    }

    fn finish(mut self) -> Self {
        self.unknown_references.sort();
        self.unknown_references.dedup();
        self
    }
}

/// Normalized input for one resolution run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedInput {
    pub grants: Vec<GrantRecord>,
    pub assignments: Vec<AssignmentRecord>,
    pub report: NormalizationReport,
}

/// Normalize raw rows against the target object's fields and the principal catalog.
pub fn normalize(
    fields: &BTreeMap<String, FieldDescriptor>,
    raw_grants: &[RawGrantRow],
    raw_assignments: &[RawAssignmentRow],
    catalog: &PrincipalCatalog,
) -> NormalizedInput {
    let mut report = NormalizationReport::default();

    let grants = raw_grants
        .iter()
        .filter_map(|row| normalize_grant(row, fields, catalog, &mut report))
        .collect();

    let assignments = raw_assignments
        .iter()
        .filter_map(|row| normalize_assignment(row, catalog, &mut report))
        .collect();

    let report = report.finish();
    if report.unknown_principal_rows() > 0 {
        warn!(
            dropped_grants = report.unknown_grant_principals,
            dropped_assignments = report.unknown_assignment_principals,
            distinct_ids = report.unknown_references.len(),
            "Dropped rows referencing unknown principals"
        );
    }

    NormalizedInput {
        grants,
        assignments,
        report,
    }
}

fn normalize_grant(
    row: &RawGrantRow,
    fields: &BTreeMap<String, FieldDescriptor>,
    catalog: &PrincipalCatalog,
    report: &mut NormalizationReport,
) -> Option<GrantRecord> {
    let field_name = row.field_name();
    let field = match fields.get(field_name) {
        Some(field) if row.object_name.is_empty() || row.object_name == field.object_name => field,
        _ => {
            trace!(
                object = %row.object_name,
                field = field_name,
                "Dropping grant for unknown field"
            );
            report.unknown(ReferenceKind::Field, field_name);
            return None;
        }
    };

    let Some(principal) = row.principal_id().and_then(|id| catalog.get(id)) else {
        report.unknown(
            ReferenceKind::GrantPrincipal,
            row.principal_id().unwrap_or(&row.parent_id),
        );
        return None;
    };

    Some(GrantRecord {
        object_name: field.object_name.clone(),
        field_name: field.field_name.clone(),
        principal_id: principal.id.clone(),
        can_read: row.can_read,
        can_edit: row.can_edit,
    })
}

fn normalize_assignment(
    row: &RawAssignmentRow,
    catalog: &PrincipalCatalog,
    report: &mut NormalizationReport,
) -> Option<AssignmentRecord> {
    let identity_id = match row.assignee_id.as_deref() {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            trace!(permission_set = %row.permission_set_id, "Skipping assignment without assignee");
            report.malformed_assignments += 1;
            return None;
        }
    };

    let Some(principal) = row.principal_id().and_then(|id| catalog.get(id)) else {
        report.unknown(
            ReferenceKind::AssignmentPrincipal,
            row.principal_id().unwrap_or(&row.permission_set_id),
        );
        return None;
    };

    Some(AssignmentRecord {
        identity_id: identity_id.to_string(),
        identity_name: row
            .assignee_name
            .clone()
            .unwrap_or_else(|| identity_id.to_string()),
        principal_id: principal.id.clone(),
        principal_name: principal.display_name.clone(),
        principal_kind: principal.kind,
    })
}
