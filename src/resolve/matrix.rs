//! Matrix resolver
//!
//! Builds the field × principal access matrix for one object. Each cell is a
//! fold over immutable layers applied in this order (later wins):
//!
//! 1. Base: no access (`{false, false}`)
//! 2. [`GrantLayer`]: the principal's grant for the field, if any
//! 3. [`OverrideLayer`]: fixed access of platform-reserved fields
//!
//! Role grants replace the cell rather than OR into it: a role holds exactly
//! one grant per field.

use crate::error::DataIntegrityError;
use crate::resolve::types::{
    EffectiveAccess, FieldDescriptor, GrantRecord, Principal, PrincipalAccessRow, PrincipalKind,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// One immutable layer of the access fold
pub trait MatrixLayer {
    /// Layer name, for tracing
    fn name(&self) -> &'static str;

    /// Access this layer assigns to the cell, or `None` to leave it as is
    fn apply(&self, field: &FieldDescriptor, principal: &Principal) -> Option<EffectiveAccess>;
}

/// Explicit field grants keyed by `(field, principal)`
#[derive(Debug, Clone, Default)]
pub struct GrantLayer {
    grants: HashMap<(String, String), EffectiveAccess>,
}

impl GrantLayer {
    /// Index grants; a repeated `(field, principal)` key keeps the last record seen
    pub fn new<'a>(grants: impl IntoIterator<Item = &'a GrantRecord>) -> Self {
        let mut index = HashMap::new();
        for grant in grants {
            let key = (grant.field_name.clone(), grant.principal_id.clone());
            if let Some(previous) = index.insert(key, grant.access())
                && previous != grant.access()
            {
                debug!(
                    field = %grant.field_name,
                    principal = %grant.principal_id,
                    "Conflicting duplicate grant, keeping the later record"
                );
            }
        }
        Self { grants: index }
    }

    /// Whether the principal holds an explicit grant on the field
    pub fn contains(&self, field_name: &str, principal_id: &str) -> bool {
        self.grants
            .contains_key(&(field_name.to_string(), principal_id.to_string()))
    }
}

impl MatrixLayer for GrantLayer {
    fn name(&self) -> &'static str {
        "grant"
    }

    fn apply(&self, field: &FieldDescriptor, principal: &Principal) -> Option<EffectiveAccess> {
        self.grants
            .get(&(field.field_name.clone(), principal.id.clone()))
            .copied()
    }
}

/// Platform-fixed access for override fields
#[derive(Debug, Clone, Copy, Default)]
pub struct OverrideLayer;

impl MatrixLayer for OverrideLayer {
    fn name(&self) -> &'static str {
        "override"
    }

    fn apply(&self, field: &FieldDescriptor, _principal: &Principal) -> Option<EffectiveAccess> {
        field.override_access()
    }
}

/// Fold the layers over the no-access base, in order
pub fn fold_layers(
    layers: &[&dyn MatrixLayer],
    field: &FieldDescriptor,
    principal: &Principal,
) -> EffectiveAccess {
    layers.iter().fold(EffectiveAccess::NONE, |cell, layer| {
        layer.apply(field, principal).unwrap_or(cell)
    })
}

/// Row of the rendered matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixRow {
    pub field: String,
    pub data_type: String,
    pub cells: Vec<MatrixCell>,
}

/// One principal column of a matrix row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixCell {
    pub principal_id: String,
    pub principal: String,
    pub access: EffectiveAccess,
}

/// Field × role access matrix for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMatrix {
    fields: Vec<FieldDescriptor>,
    principals: Vec<Principal>,
    /// field name -> principal id -> access
    cells: BTreeMap<String, BTreeMap<String, EffectiveAccess>>,
}

impl ResolvedMatrix {
    pub fn get(&self, field_name: &str, principal_id: &str) -> Option<EffectiveAccess> {
        self.cells.get(field_name)?.get(principal_id).copied()
    }

    /// Fields in field-name order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Role principals in column order
    pub fn principals(&self) -> &[Principal] {
        &self.principals
    }

    pub fn cell_count(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    /// Cells as `(field, principal, access)` in field then principal-id order
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str, EffectiveAccess)> {
        self.cells.iter().flat_map(|(field, row)| {
            row.iter()
                .map(move |(principal, access)| (field.as_str(), principal.as_str(), *access))
        })
    }

    /// Rows for display, with columns in principal order
    pub fn rows(&self) -> Vec<MatrixRow> {
        self.fields
            .iter()
            .map(|field| MatrixRow {
                field: field.display_label(),
                data_type: field.data_type.clone(),
                cells: self
                    .principals
                    .iter()
                    .map(|principal| MatrixCell {
                        principal_id: principal.id.clone(),
                        principal: principal.display_name.clone(),
                        access: self
                            .get(&field.field_name, &principal.id)
                            .unwrap_or_default(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Resolve the field × role matrix.
///
/// Only role principals get columns. Every field is validated before any
/// cell is computed, so a malformed catalog yields no partial matrix.
pub fn resolve_matrix(
    fields: &[FieldDescriptor],
    grants: &[GrantRecord],
    principals: &[Principal],
) -> Result<ResolvedMatrix, DataIntegrityError> {
    for field in fields {
        field.validate()?;
    }

    let mut fields = fields.to_vec();
    fields.sort_by(|a, b| a.field_name.cmp(&b.field_name));

    let roles: Vec<Principal> = principals
        .iter()
        .filter(|p| p.kind.is_role())
        .cloned()
        .collect();

    let grant_layer = GrantLayer::new(grants);
    let layers: [&dyn MatrixLayer; 2] = [&grant_layer, &OverrideLayer];

    let cells = fields
        .iter()
        .map(|field| {
            let row = roles
                .iter()
                .map(|principal| (principal.id.clone(), fold_layers(&layers, field, principal)))
                .collect();
            (field.field_name.clone(), row)
        })
        .collect();

    let layer_names: Vec<&str> = layers.iter().map(|l| l.name()).collect();
    debug!(
        fields = fields.len(),
        principals = roles.len(),
        layers = ?layer_names,
        "Resolved access matrix"
    );

    Ok(ResolvedMatrix {
        fields,
        principals: roles,
        cells,
    })
}

/// Per-principal access to a single field, across both principal kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldAccess {
    field: FieldDescriptor,
    by_principal: BTreeMap<String, EffectiveAccess>,
    /// Principals holding an explicit grant on the field
    granted: BTreeSet<String>,
}

impl FieldAccess {
    pub fn field(&self) -> &FieldDescriptor {
        &self.field
    }

    /// Access of one principal; unknown principals have none
    pub fn get(&self, principal_id: &str) -> EffectiveAccess {
        self.by_principal
            .get(principal_id)
            .copied()
            .unwrap_or_default()
    }

    /// The `principal id -> access` mapping consumed by the identity aggregator
    pub fn as_map(&self) -> &BTreeMap<String, EffectiveAccess> {
        &self.by_principal
    }

    pub fn is_granted(&self, principal_id: &str) -> bool {
        self.granted.contains(principal_id)
    }

    /// Principals holding an explicit grant, split by kind and sorted by name
    pub fn listing(&self, principals: &[Principal]) -> PrincipalListing {
        let mut listing = PrincipalListing::default();

        for principal in principals.iter().filter(|p| self.is_granted(&p.id)) {
            let row = PrincipalAccessRow {
                principal_id: principal.id.clone(),
                display_name: principal.display_name.clone(),
                access: self.get(&principal.id),
            };
            match principal.kind {
                PrincipalKind::Role => listing.roles.push(row),
                PrincipalKind::Additive => listing.additive.push(row),
            }
        }

        for rows in [&mut listing.roles, &mut listing.additive] {
            rows.sort_by(|a, b| {
                a.display_name
                    .cmp(&b.display_name)
                    .then_with(|| a.principal_id.cmp(&b.principal_id))
            });
        }
        listing
    }
}

/// Principals with a grant on one field, by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrincipalListing {
    pub roles: Vec<PrincipalAccessRow>,
    pub additive: Vec<PrincipalAccessRow>,
}

/// Resolve one field's access for every principal, with the same layering
/// as [`resolve_matrix`].
pub fn resolve_field_access(
    field: &FieldDescriptor,
    grants: &[GrantRecord],
    principals: &[Principal],
) -> Result<FieldAccess, DataIntegrityError> {
    field.validate()?;

    let grant_layer = GrantLayer::new(
        grants
            .iter()
            .filter(|g| g.field_name == field.field_name),
    );
    let layers: [&dyn MatrixLayer; 2] = [&grant_layer, &OverrideLayer];

    let by_principal = principals
        .iter()
        .map(|p| (p.id.clone(), fold_layers(&layers, field, p)))
        .collect();
    let granted = principals
        .iter()
        .filter(|p| grant_layer.contains(&field.field_name, &p.id))
        .map(|p| p.id.clone())
        .collect();

    Ok(FieldAccess {
        field: field.clone(),
        by_principal,
        granted,
    })
}

/// Restrict columns to the selected role principals, in selection order.
///
/// Selectors match a principal id or display name. An empty selection keeps
/// every principal.
pub fn select_principals(principals: &[Principal], selectors: &[String]) -> Vec<Principal> {
    if selectors.is_empty() {
        return principals.to_vec();
    }

    let mut selected: Vec<Principal> = Vec::with_capacity(selectors.len());
    for selector in selectors {
        match principals
            .iter()
            .find(|p| &p.id == selector || &p.display_name == selector)
        {
            Some(principal) if !selected.contains(principal) => selected.push(principal.clone()),
            Some(_) => {}
            None => warn!(selector = %selector, "Selected principal not found, ignoring"),
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(field: &str, principal: &str, read: bool, edit: bool) -> GrantRecord {
        GrantRecord {
            object_name: "Invoice__c".to_string(),
            field_name: field.to_string(),
            principal_id: principal.to_string(),
            can_read: read,
            can_edit: edit,
        }
    }

    fn amount() -> FieldDescriptor {
        FieldDescriptor::new("Invoice__c", "Amount__c", "Amount", "currency")
    }

    fn record_id() -> FieldDescriptor {
        FieldDescriptor::new("Invoice__c", "Id", "Record ID", "id").with_override(true, false)
    }

    #[test]
    fn test_fold_order_override_last() {
        let grants = [grant("Id", "00e1", false, true)];
        let grant_layer = GrantLayer::new(&grants);
        let sales = Principal::role("00e1", "Sales");

        let layers: [&dyn MatrixLayer; 2] = [&grant_layer, &OverrideLayer];
        assert_eq!(
            fold_layers(&layers, &record_id(), &sales),
            EffectiveAccess::new(true, false)
        );

        // Reversed order lets the grant win; order is what decides precedence
        let reversed: [&dyn MatrixLayer; 2] = [&OverrideLayer, &grant_layer];
        assert_eq!(
            fold_layers(&reversed, &record_id(), &sales),
            EffectiveAccess::new(false, true)
        );
    }

    #[test]
    fn test_grant_layer_last_write_wins() {
        let grants = [
            grant("Amount__c", "00e1", true, true),
            grant("Amount__c", "00e1", true, false),
        ];
        let layer = GrantLayer::new(&grants);
        assert_eq!(
            layer.apply(&amount(), &Principal::role("00e1", "Sales")),
            Some(EffectiveAccess::new(true, false))
        );
    }

    #[test]
    fn test_matrix_is_total_and_role_only() {
        let principals = [
            Principal::role("00e1", "Sales"),
            Principal::role("00e2", "Support"),
            Principal::additive("0PS1", "ApprovedEditors"),
        ];
        let grants = [
            grant("Amount__c", "00e1", true, false),
            grant("Amount__c", "0PS1", true, true),
        ];

        let matrix = resolve_matrix(&[amount(), record_id()], &grants, &principals).unwrap();

        assert_eq!(matrix.cell_count(), 4);
        assert_eq!(matrix.principals().len(), 2);
        assert_eq!(
            matrix.get("Amount__c", "00e1"),
            Some(EffectiveAccess::new(true, false))
        );
        assert_eq!(matrix.get("Amount__c", "00e2"), Some(EffectiveAccess::NONE));
        assert_eq!(matrix.get("Amount__c", "0PS1"), None);
        assert_eq!(
            matrix.get("Id", "00e2"),
            Some(EffectiveAccess::new(true, false))
        );
    }

    #[test]
    fn test_matrix_rows_sorted_by_field_name() {
        let matrix = resolve_matrix(
            &[amount(), record_id()],
            &[],
            &[Principal::role("00e1", "Sales")],
        )
        .unwrap();

        let rows = matrix.rows();
        assert_eq!(rows[0].field, "Amount (Amount__c)");
        assert_eq!(rows[1].field, "Record ID (Id)");
        assert_eq!(rows[1].cells[0].principal, "Sales");
    }

    #[test]
    fn test_malformed_field_aborts_matrix() {
        let broken = FieldDescriptor::new("Invoice__c", "Notes__c", "Notes", "");
        let result = resolve_matrix(
            &[amount(), broken],
            &[],
            &[Principal::role("00e1", "Sales")],
        );
        assert_eq!(
            result,
            Err(DataIntegrityError::malformed_field(
                "Invoice__c",
                "Notes__c",
                "data type"
            ))
        );
    }

    #[test]
    fn test_field_access_covers_both_kinds() {
        let principals = [
            Principal::role("00e1", "Sales"),
            Principal::additive("0PS2", "Zeta"),
            Principal::additive("0PS1", "ApprovedEditors"),
            Principal::additive("0PS3", "Unused"),
        ];
        let grants = [
            grant("Amount__c", "00e1", true, false),
            grant("Amount__c", "0PS1", true, true),
            grant("Amount__c", "0PS2", false, false),
            grant("Other__c", "0PS3", true, true),
        ];

        let access = resolve_field_access(&amount(), &grants, &principals).unwrap();
        assert_eq!(access.get("0PS1"), EffectiveAccess::new(true, true));
        assert_eq!(access.get("0PS3"), EffectiveAccess::NONE);
        assert_eq!(access.get("missing"), EffectiveAccess::NONE);
        assert_eq!(access.as_map().len(), 4);

        let listing = access.listing(&principals);
        assert_eq!(listing.roles.len(), 1);
        let names: Vec<&str> = listing
            .additive
            .iter()
            .map(|r| r.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["ApprovedEditors", "Zeta"]);
    }

    #[test]
    fn test_select_principals() {
        let principals = [
            Principal::role("00e1", "Sales"),
            Principal::role("00e2", "Support"),
        ];

        assert_eq!(select_principals(&principals, &[]).len(), 2);

        let selected = select_principals(
            &principals,
            &["Support".to_string(), "00e1".to_string(), "Nope".to_string()],
        );
        let ids: Vec<&str> = selected.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["00e2", "00e1"]);
    }
}
