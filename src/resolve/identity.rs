//! Identity aggregator
//!
//! Folds per-principal access on one field into one record per identity.
//! The role assignment sets the starting access; additive assignments OR
//! into it. Additive principals that grant nothing on the field are not
//! listed as contributors. Override fields list no contributors.

use crate::error::DataIntegrityError;
use crate::resolve::types::{
    AssignmentRecord, EffectiveAccess, FieldDescriptor, IdentityAccessRecord, PrincipalKind,
};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

#[derive(Default)]
struct IdentityFold<'a> {
    name: Option<&'a str>,
    roles: Vec<&'a AssignmentRecord>,
    additive: Vec<&'a AssignmentRecord>,
}

/// Resolve access of every assigned identity to `field`.
///
/// Principals missing from `per_principal_access` grant nothing. Records are
/// ordered by identity name, then id.
pub fn resolve_identity_access(
    field: &FieldDescriptor,
    assignments: &[AssignmentRecord],
    per_principal_access: &BTreeMap<String, EffectiveAccess>,
) -> Result<Vec<IdentityAccessRecord>, DataIntegrityError> {
    field.validate()?;

    let mut identities: BTreeMap<&str, IdentityFold<'_>> = BTreeMap::new();
    for assignment in assignments {
        if assignment.identity_id.trim().is_empty() || assignment.principal_id.trim().is_empty() {
            trace!(?assignment, "Skipping malformed assignment");
            continue;
        }

        let fold = identities.entry(assignment.identity_id.as_str()).or_default();
        // Smallest non-empty name keeps the result independent of row order
        let name = assignment.identity_name.as_str();
        if !name.is_empty() && fold.name.is_none_or(|current| name < current) {
            fold.name = Some(name);
        }
        match assignment.principal_kind {
            PrincipalKind::Role => fold.roles.push(assignment),
            PrincipalKind::Additive => fold.additive.push(assignment),
        }
    }

    let access_of = |principal_id: &str| {
        per_principal_access
            .get(principal_id)
            .copied()
            .unwrap_or_default()
    };

    let mut records: Vec<IdentityAccessRecord> = identities
        .into_iter()
        .map(|(identity_id, fold)| {
            let role = fold.roles.iter().min_by(|a, b| a.principal_id.cmp(&b.principal_id));
            if fold.roles.len() > 1 {
                warn!(
                    identity = identity_id,
                    roles = fold.roles.len(),
                    kept = role.map(|r| r.principal_id.as_str()),
                    "Identity has more than one role assignment, keeping one"
                );
            }

            let mut access = role.map_or(EffectiveAccess::NONE, |r| access_of(&r.principal_id));
            let mut contributing = Vec::new();
            for assignment in &fold.additive {
                let granted = access_of(&assignment.principal_id);
                access = access.union(granted);
                if granted.grants_any() && !field.is_override_field {
                    contributing.push(assignment.principal_name.clone());
                }
            }
            contributing.sort();
            contributing.dedup();

            IdentityAccessRecord {
                identity_id: identity_id.to_string(),
                identity_name: fold.name.unwrap_or(identity_id).to_string(),
                role_display_name: role.map(|r| r.principal_name.clone()),
                contributing_principals: contributing,
                access,
            }
        })
        .collect();

    records.sort_by(|a, b| {
        a.identity_name
            .cmp(&b.identity_name)
            .then_with(|| a.identity_id.cmp(&b.identity_id))
    });

    debug!(
        object = %field.object_name,
        field = %field.field_name,
        identities = records.len(),
        "Resolved identity access"
    );

    Ok(records)
}
