//! Principal catalog
//!
//! Id-keyed lookup used to classify grants and assignments by principal kind.

use crate::error::DataIntegrityError;
use crate::resolve::types::{Principal, PrincipalKind};
use crate::source::{RawGrantRow, RawRole};
use std::collections::BTreeMap;
use tracing::trace;

/// Known principals keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalCatalog {
    principals: BTreeMap<String, Principal>,
}

impl PrincipalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from the role list and the principal metadata on grant rows.
    ///
    /// Roles come only from the role list. Grant rows contribute additive
    /// principals and never rename one that is already known. Profile-owned
    /// rows whose profile is absent from the role list, and rows that name no
    /// principal, are left for the normalizer to drop.
    pub fn from_sources(
        roles: &[RawRole],
        grants: &[RawGrantRow],
    ) -> Result<Self, DataIntegrityError> {
        let mut catalog = Self::new();

        for role in roles {
            catalog.insert(role.principal())?;
        }

        for row in grants {
            if let Some(principal) = row.principal()
                && principal.kind == PrincipalKind::Additive
                && !catalog.contains(&principal.id)
            {
                trace!(
                    principal = %principal.id,
                    kind = %principal.kind,
                    "Cataloging principal from grant row"
                );
                catalog.insert(principal)?;
            }
        }

        Ok(catalog)
    }

    /// Add or replace a principal after validating it
    pub fn insert(&mut self, principal: Principal) -> Result<(), DataIntegrityError> {
        principal.validate()?;
        self.principals.insert(principal.id.clone(), principal);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Principal> {
        self.principals.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.principals.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    /// All principals ordered by display name, then id
    pub fn principals(&self) -> Vec<Principal> {
        let mut all: Vec<Principal> = self.principals.values().cloned().collect();
        all.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    /// Principals of one kind ordered by display name, then id
    pub fn of_kind(&self, kind: PrincipalKind) -> Vec<Principal> {
        self.principals()
            .into_iter()
            .filter(|p| p.kind == kind)
            .collect()
    }
}

impl FromIterator<Principal> for PrincipalCatalog {
    /// Collects without validation; intended for already-validated principals
    fn from_iter<I: IntoIterator<Item = Principal>>(iter: I) -> Self {
        Self {
            principals: iter.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }
}
