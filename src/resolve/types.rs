//! Resolution types
//!
//! Core types shared by the normalizer, the matrix resolver and the
//! identity aggregator.

use crate::error::DataIntegrityError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of authorization principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// Role-derived principal (a Profile). An identity holds at most one.
    Role,
    /// Additive principal (a Permission Set). An identity may hold many.
    Additive,
}

impl PrincipalKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Role => "role",
            PrincipalKind::Additive => "additive",
        }
    }

    pub const fn is_role(&self) -> bool {
        matches!(self, PrincipalKind::Role)
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved read/write pair for one field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectiveAccess {
    pub can_read: bool,
    pub can_write: bool,
}

impl EffectiveAccess {
    /// No access at all
    pub const NONE: EffectiveAccess = EffectiveAccess {
        can_read: false,
        can_write: false,
    };

    pub const fn new(can_read: bool, can_write: bool) -> Self {
        Self {
            can_read,
            can_write,
        }
    }

    /// Bitwise OR of two access pairs
    pub const fn union(self, other: EffectiveAccess) -> Self {
        Self {
            can_read: self.can_read || other.can_read,
            can_write: self.can_write || other.can_write,
        }
    }

    /// True when at least one bit is granted
    pub const fn grants_any(&self) -> bool {
        self.can_read || self.can_write
    }
}

/// Field metadata from the object's field catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub object_name: String,
    pub field_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub data_type: String,
    /// Platform-reserved field whose access ignores grants
    #[serde(default)]
    pub is_override_field: bool,
    #[serde(default)]
    pub override_read: bool,
    #[serde(default)]
    pub override_write: bool,
}

impl FieldDescriptor {
    pub fn new(
        object_name: impl Into<String>,
        field_name: impl Into<String>,
        label: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            object_name: object_name.into(),
            field_name: field_name.into(),
            label: label.into(),
            data_type: data_type.into(),
            is_override_field: false,
            override_read: false,
            override_write: false,
        }
    }

    /// Mark this field as platform-reserved with fixed access
    pub fn with_override(mut self, read: bool, write: bool) -> Self {
        self.is_override_field = true;
        self.override_read = read;
        self.override_write = write;
        self
    }

    /// Fixed access for override fields, `None` otherwise
    pub fn override_access(&self) -> Option<EffectiveAccess> {
        self.is_override_field
            .then(|| EffectiveAccess::new(self.override_read, self.override_write))
    }

    /// Label shown in reports, e.g. `Amount (Amount__c)`
    pub fn display_label(&self) -> String {
        format!("{} ({})", self.label, self.field_name)
    }

    /// Reject descriptors missing structural metadata.
    ///
    /// Access bits have defaults; names, labels and types do not.
    pub fn validate(&self) -> Result<(), DataIntegrityError> {
        let missing = if self.field_name.trim().is_empty() {
            Some("field name")
        } else if self.label.trim().is_empty() {
            Some("label")
        } else if self.data_type.trim().is_empty() {
            Some("data type")
        } else {
            None
        };

        match missing {
            Some(missing) => Err(DataIntegrityError::malformed_field(
                &self.object_name,
                &self.field_name,
                missing,
            )),
            None => Ok(()),
        }
    }
}

/// Authorization principal that can hold field grants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub kind: PrincipalKind,
}

impl Principal {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        kind: PrincipalKind,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
        }
    }

    pub fn role(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, PrincipalKind::Role)
    }

    pub fn additive(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(id, display_name, PrincipalKind::Additive)
    }

    pub fn validate(&self) -> Result<(), DataIntegrityError> {
        if self.id.trim().is_empty() {
            return Err(DataIntegrityError::malformed_principal(&self.display_name, "id"));
        }
        if self.display_name.trim().is_empty() {
            return Err(DataIntegrityError::malformed_principal(&self.id, "display name"));
        }
        Ok(())
    }
}

/// One normalized field-permission grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub object_name: String,
    pub field_name: String,
    pub principal_id: String,
    pub can_read: bool,
    pub can_edit: bool,
}

impl GrantRecord {
    pub fn access(&self) -> EffectiveAccess {
        EffectiveAccess::new(self.can_read, self.can_edit)
    }
}

/// One normalized identity-to-principal assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub identity_id: String,
    pub identity_name: String,
    pub principal_id: String,
    /// Display name of the principal, copied from the catalog
    pub principal_name: String,
    pub principal_kind: PrincipalKind,
}

/// Resolved access of one identity to one field, with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAccessRecord {
    pub identity_id: String,
    pub identity_name: String,
    pub role_display_name: Option<String>,
    /// Additive principals that granted at least one bit, by display name
    pub contributing_principals: Vec<String>,
    pub access: EffectiveAccess,
}

/// Access one principal holds on a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalAccessRow {
    pub principal_id: String,
    pub display_name: String,
    pub access: EffectiveAccess,
}
