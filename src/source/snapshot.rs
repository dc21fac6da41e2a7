//! Snapshot-backed permission source
//!
//! Serves the query surfaces from an exported document (JSON, or TOML when
//! the file ends in `.toml`) instead of a live catalog.

use crate::error::{SourceError, SourceResult};
use crate::resolve::FieldDescriptor;
use crate::source::PermissionSource;
use crate::source::types::{RawAssignmentRow, RawGrantRow, RawRole, unqualified_field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Exported catalog document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub objects: BTreeMap<String, SnapshotObject>,
    pub roles: Vec<RawRole>,
    pub field_permissions: Vec<RawGrantRow>,
    pub assignments: Vec<RawAssignmentRow>,
}

/// One object's field catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotObject {
    pub fields: Vec<SnapshotField>,
}

/// Field catalog entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotField {
    pub name: String,
    pub label: String,
    #[serde(alias = "type")]
    pub data_type: String,
    #[serde(alias = "is_special_field")]
    pub is_override_field: bool,
    #[serde(alias = "special_read")]
    pub override_read: bool,
    #[serde(alias = "special_edit")]
    pub override_write: bool,
}

impl SnapshotField {
    fn descriptor(&self, object: &str) -> FieldDescriptor {
        FieldDescriptor {
            object_name: object.to_string(),
            field_name: self.name.clone(),
            label: self.label.clone(),
            data_type: self.data_type.clone(),
            is_override_field: self.is_override_field,
            override_read: self.override_read,
            override_write: self.override_write,
        }
    }
}

/// Permission source over an in-memory [`Snapshot`]
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    snapshot: Snapshot,
}

impl SnapshotSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Load a snapshot file; `.toml` files are parsed as TOML, anything else as JSON
    pub async fn load(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SourceError::Io {
                path: shown.clone(),
                source,
            })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let snapshot = if is_toml {
            toml::from_str(&content).map_err(|e| SourceError::Parse {
                path: shown.clone(),
                reason: e.to_string(),
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| SourceError::Parse {
                path: shown.clone(),
                reason: e.to_string(),
            })?
        };

        let source = Self::new(snapshot);
        info!(
            path = %shown,
            objects = source.snapshot.objects.len(),
            grants = source.snapshot.field_permissions.len(),
            assignments = source.snapshot.assignments.len(),
            "Loaded permission snapshot"
        );
        Ok(source)
    }

    /// Parse a JSON snapshot (useful for testing)
    pub fn from_json_str(json: &str) -> SourceResult<Self> {
        serde_json::from_str(json)
            .map(Self::new)
            .map_err(|e| SourceError::Parse {
                path: "<inline>".to_string(),
                reason: e.to_string(),
            })
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

#[async_trait]
impl PermissionSource for SnapshotSource {
    async fn list_target_objects(&self) -> SourceResult<Vec<String>> {
        Ok(self.snapshot.objects.keys().cloned().collect())
    }

    #[instrument(skip(self))]
    async fn list_fields(&self, object: &str) -> SourceResult<BTreeMap<String, FieldDescriptor>> {
        let entry = self
            .snapshot
            .objects
            .get(object)
            .ok_or_else(|| SourceError::UnknownObject(object.to_string()))?;

        Ok(entry
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.descriptor(object)))
            .collect())
    }

    async fn list_roles(&self) -> SourceResult<Vec<RawRole>> {
        Ok(self.snapshot.roles.clone())
    }

    #[instrument(skip(self))]
    async fn query_grants(
        &self,
        object: &str,
        field: Option<&str>,
    ) -> SourceResult<Vec<RawGrantRow>> {
        let rows: Vec<RawGrantRow> = self
            .snapshot
            .field_permissions
            .iter()
            .filter(|row| row.object_name == object)
            .filter(|row| field.is_none_or(|f| unqualified_field(&row.field) == f))
            .cloned()
            .collect();
        debug!(rows = rows.len(), "Queried field permissions");
        Ok(rows)
    }

    #[instrument(skip(self, principal_ids), fields(principals = principal_ids.len()))]
    async fn query_assignments(
        &self,
        principal_ids: &[String],
    ) -> SourceResult<Vec<RawAssignmentRow>> {
        let wanted: HashSet<&str> = principal_ids.iter().map(String::as_str).collect();
        let rows: Vec<RawAssignmentRow> = self
            .snapshot
            .assignments
            .iter()
            .filter(|row| row.principal_id().is_some_and(|id| wanted.contains(id)))
            .cloned()
            .collect();
        debug!(rows = rows.len(), "Queried assignments");
        Ok(rows)
    }
}
