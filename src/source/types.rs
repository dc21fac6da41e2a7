//! Raw row types returned by a permission source
//!
//! These mirror the tabular shape of the upstream catalog: field-permission
//! rows hang off a permission set, which is either owned by a profile
//! (role-derived) or stands alone (additive).

use crate::resolve::{Principal, PrincipalKind};
use serde::{Deserialize, Serialize};

/// Profile entry from the role list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRole {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl RawRole {
    pub fn principal(&self) -> Principal {
        Principal::role(&self.id, &self.name)
    }
}

/// One field-permission row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGrantRow {
    pub object_name: String,
    /// Field reference, either `Field__c` or `Object.Field__c`
    pub field: String,
    /// Owning permission set id
    pub parent_id: String,
    #[serde(default)]
    pub is_owned_by_profile: bool,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    /// Permission set label, for rows not owned by a profile
    #[serde(default)]
    pub parent_label: Option<String>,
    #[serde(default)]
    pub can_read: bool,
    #[serde(default)]
    pub can_edit: bool,
}

impl RawGrantRow {
    /// Field name with any `Object.` prefix stripped
    pub fn field_name(&self) -> &str {
        unqualified_field(&self.field)
    }

    pub fn kind(&self) -> PrincipalKind {
        if self.is_owned_by_profile {
            PrincipalKind::Role
        } else {
            PrincipalKind::Additive
        }
    }

    /// Principal the grant belongs to: the profile for profile-owned sets,
    /// the permission set itself otherwise
    pub fn principal_id(&self) -> Option<&str> {
        principal_id(self.is_owned_by_profile, self.profile_id.as_deref(), &self.parent_id)
    }

    /// Principal metadata carried on the row, if it names one
    pub fn principal(&self) -> Option<Principal> {
        let id = self.principal_id()?;
        let name = if self.is_owned_by_profile {
            self.profile_name.as_deref()
        } else {
            self.parent_label.as_deref()
        };
        Some(Principal::new(id, name.unwrap_or_default(), self.kind()))
    }
}

/// One identity-to-permission-set assignment row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAssignmentRow {
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub assignee_name: Option<String>,
    pub permission_set_id: String,
    #[serde(default)]
    pub is_owned_by_profile: bool,
    #[serde(default)]
    pub profile_id: Option<String>,
}

impl RawAssignmentRow {
    pub fn principal_id(&self) -> Option<&str> {
        principal_id(
            self.is_owned_by_profile,
            self.profile_id.as_deref(),
            &self.permission_set_id,
        )
    }
}

fn principal_id<'a>(
    owned_by_profile: bool,
    profile_id: Option<&'a str>,
    permission_set_id: &'a str,
) -> Option<&'a str> {
    let id = if owned_by_profile {
        profile_id?
    } else {
        permission_set_id
    };
    (!id.trim().is_empty()).then_some(id)
}

/// Strip a leading `Object.` qualifier from a field reference
pub fn unqualified_field(field: &str) -> &str {
    field.split_once('.').map_or(field, |(_, name)| name)
}
