//! Permission source module
//!
//! The external collaborator that supplies catalog, grant and assignment
//! rows. Only the shape of the returned data matters here; how a source
//! fetches it is its own business.

pub mod patterns;
pub mod snapshot;
pub mod types;

pub use patterns::{ObjectFilter, PatternMatcher};
pub use snapshot::{Snapshot, SnapshotSource};
pub use types::*;

use crate::error::SourceResult;
use crate::resolve::FieldDescriptor;
// async_trait required for dyn-compatibility with Arc<dyn PermissionSource>
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read-only query surfaces of the upstream catalog
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Names of objects that can be audited
    async fn list_target_objects(&self) -> SourceResult<Vec<String>>;

    /// Field catalog of one object, keyed by field name
    async fn list_fields(&self, object: &str) -> SourceResult<BTreeMap<String, FieldDescriptor>>;

    /// Every role principal, whether or not it holds grants
    async fn list_roles(&self) -> SourceResult<Vec<RawRole>>;

    /// Field-permission rows for an object, optionally for one field only
    async fn query_grants(&self, object: &str, field: Option<&str>)
    -> SourceResult<Vec<RawGrantRow>>;

    /// Assignment rows for the given principal ids
    async fn query_assignments(&self, principal_ids: &[String])
    -> SourceResult<Vec<RawAssignmentRow>>;
}

/// Shared source handle
pub type SharedSource = Arc<dyn PermissionSource>;
