//! Audit pipeline tests
//!
//! Runs object and field audits against the invoice fixture, including runs
//! superseded while they wait on the source.

use async_trait::async_trait;
use perm_auditor::error::{AppError, DataIntegrityError, SourceResult};
use perm_auditor::pipeline::{AuditPipeline, FieldSelection, ObjectSelection, ViewState};
use perm_auditor::report::{OutputFormat, render_field, render_matrix};
use perm_auditor::resolve::{EffectiveAccess, FieldDescriptor};
use perm_auditor::source::{
    PermissionSource, RawAssignmentRow, RawGrantRow, RawRole, SnapshotSource,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

const READ: EffectiveAccess = EffectiveAccess::new(true, false);
const RW: EffectiveAccess = EffectiveAccess::new(true, true);

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/invoice_snapshot.json")
}

async fn fixture() -> SnapshotSource {
    SnapshotSource::load(fixture_path()).await.unwrap()
}

/// Holds the first grant query until released
struct GatedSource {
    inner: SnapshotSource,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedSource {
    fn new(inner: SnapshotSource) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl PermissionSource for GatedSource {
    async fn list_target_objects(&self) -> SourceResult<Vec<String>> {
        self.inner.list_target_objects().await
    }

    async fn list_fields(&self, object: &str) -> SourceResult<BTreeMap<String, FieldDescriptor>> {
        self.inner.list_fields(object).await
    }

    async fn list_roles(&self) -> SourceResult<Vec<RawRole>> {
        self.inner.list_roles().await
    }

    async fn query_grants(
        &self,
        object: &str,
        field: Option<&str>,
    ) -> SourceResult<Vec<RawGrantRow>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.query_grants(object, field).await
    }

    async fn query_assignments(
        &self,
        principal_ids: &[String],
    ) -> SourceResult<Vec<RawAssignmentRow>> {
        self.inner.query_assignments(principal_ids).await
    }
}

// =============================================================================
// Object audits
// =============================================================================

#[tokio::test]
async fn test_invoice_matrix() {
    let pipeline = AuditPipeline::new(Arc::new(fixture().await));
    let outcome = assert_ok!(
        pipeline
            .audit_object(ObjectSelection::new("Invoice__c"))
            .await
    );
    let audit = outcome.published().unwrap();
    let matrix = &audit.matrix;

    let fields: Vec<&str> = matrix.fields().iter().map(|f| f.field_name.as_str()).collect();
    assert_eq!(fields, vec!["Amount__c", "Id", "Status__c"]);
    let columns: Vec<&str> = matrix
        .principals()
        .iter()
        .map(|p| p.display_name.as_str())
        .collect();
    assert_eq!(columns, vec!["Read Only", "Sales", "System Administrator"]);

    assert_eq!(matrix.get("Amount__c", "00eSALES"), Some(READ));
    assert_eq!(matrix.get("Amount__c", "00eADMIN"), Some(RW));
    assert_eq!(matrix.get("Amount__c", "00eREAD"), Some(EffectiveAccess::NONE));
    assert_eq!(matrix.get("Status__c", "00eSALES"), Some(RW));
    // Override field: fixed read-only for every role
    assert_eq!(matrix.get("Id", "00eADMIN"), Some(READ));
    assert_eq!(matrix.get("Id", "00eREAD"), Some(READ));

    assert_eq!(audit.report.unknown_fields, 1);
}

#[tokio::test]
async fn test_matrix_principal_selection() {
    let pipeline = AuditPipeline::new(Arc::new(fixture().await));
    let selection = ObjectSelection::new("Invoice__c").with_principals(vec![
        "System Administrator".to_string(),
        "00eSALES".to_string(),
        "Nobody".to_string(),
    ]);
    let outcome = pipeline.audit_object(selection).await.unwrap();
    let audit = outcome.published().unwrap();

    let ids: Vec<&str> = audit
        .matrix
        .principals()
        .iter()
        .map(|p| p.id.as_str())
        .collect();
    assert_eq!(ids, vec!["00eADMIN", "00eSALES"]);
}

#[tokio::test]
async fn test_matrix_pretty_report() {
    let pipeline = AuditPipeline::new(Arc::new(fixture().await));
    let outcome = pipeline
        .audit_object(ObjectSelection::new("Invoice__c"))
        .await
        .unwrap();
    let report = render_matrix(outcome.published().unwrap(), OutputFormat::Pretty).unwrap();

    assert!(report.starts_with("Invoice__c: 3 fields x 3 roles\n"));
    assert!(report.contains("FIELD"));
    assert!(report.contains("Amount (Amount__c)"));
    assert!(report.contains("Dropped 1 rows: 1 unknown fields"));
}

#[tokio::test]
async fn test_matrix_json_report() {
    let pipeline = AuditPipeline::new(Arc::new(fixture().await));
    let selection = ObjectSelection::new("Invoice__c").with_principals(vec!["Sales".to_string()]);
    let outcome = pipeline.audit_object(selection).await.unwrap();
    let json = render_matrix(outcome.published().unwrap(), OutputFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["object"], "Invoice__c");
    assert_eq!(value["principals"][0]["name"], "Sales");
    assert_eq!(value["rows"][0]["field"], "Amount (Amount__c)");
    insta::assert_json_snapshot!(value["rows"][0]["cells"][0], @r###"
    {
      "access": {
        "can_read": true,
        "can_write": false
      },
      "principal": "Sales",
      "principal_id": "00eSALES"
    }
    "###);
}

// =============================================================================
// Field audits
// =============================================================================

#[tokio::test]
async fn test_invoice_amount_field_audit() {
    let pipeline = AuditPipeline::new(Arc::new(fixture().await));
    let outcome = pipeline
        .audit_field(FieldSelection::new("Invoice__c", "Amount__c"))
        .await
        .unwrap();
    let audit = outcome.published().unwrap();

    let uma = audit
        .identities
        .iter()
        .find(|r| r.identity_id == "005U1")
        .unwrap();
    assert_eq!(uma.access, RW);
    assert_eq!(uma.role_display_name.as_deref(), Some("Sales"));
    assert_eq!(uma.contributing_principals, vec!["ApprovedEditors".to_string()]);

    let names: Vec<&str> = audit
        .identities
        .iter()
        .map(|r| r.identity_name.as_str())
        .collect();
    assert_eq!(names, vec!["Ben Baker", "Cara Chen", "Uma Underwood"]);
    assert_eq!(audit.identities[1].access, READ);
    assert!(audit.identities[1].contributing_principals.is_empty());

    let roles: Vec<&str> = audit
        .principals
        .roles
        .iter()
        .map(|r| r.display_name.as_str())
        .collect();
    assert_eq!(roles, vec!["Sales", "System Administrator"]);
    let additive: Vec<&str> = audit
        .principals
        .additive
        .iter()
        .map(|r| r.display_name.as_str())
        .collect();
    assert_eq!(additive, vec!["ApprovedEditors", "Auditors"]);

    assert_eq!(audit.report.malformed_assignments, 1);
}

#[tokio::test]
async fn test_field_without_grants_has_no_identities() {
    let pipeline = AuditPipeline::new(Arc::new(fixture().await));
    let outcome = pipeline
        .audit_field(FieldSelection::new("Account", "Name"))
        .await
        .unwrap();
    let audit = outcome.published().unwrap();

    assert!(audit.identities.is_empty());
    assert!(audit.principals.roles.is_empty());

    let report = render_field(audit, OutputFormat::Pretty).unwrap();
    assert!(report.starts_with("Account.Name: Account Name\n"));
    assert!(report.contains("Users\n  (none)"));
}

#[tokio::test]
async fn test_field_pretty_report_lists_users() {
    let pipeline = AuditPipeline::new(Arc::new(fixture().await));
    let outcome = pipeline
        .audit_field(FieldSelection::new("Invoice__c", "Amount__c"))
        .await
        .unwrap();
    let report = render_field(outcome.published().unwrap(), OutputFormat::Pretty).unwrap();

    assert!(report.contains("Permission sets"));
    assert!(report.contains("Uma Underwood"));
    assert!(report.contains("ApprovedEditors"));
    assert!(report.contains("1 malformed assignments"));
}

// =============================================================================
// Superseded runs
// =============================================================================

#[tokio::test]
async fn test_superseded_field_run_is_discarded() {
    let source = Arc::new(GatedSource::new(fixture().await));
    let pipeline = AuditPipeline::new(source.clone());
    let mut views = pipeline.subscribe_field();

    let first = pipeline.audit_field(FieldSelection::new("Invoice__c", "Amount__c"));
    let second = async {
        source.entered.notified().await;
        let outcome = pipeline
            .audit_field(FieldSelection::new("Invoice__c", "Status__c"))
            .await;
        source.release.notify_one();
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    let first = assert_ok!(first);
    assert!(first.is_discarded());
    let second = assert_ok!(second);
    assert_eq!(
        second.published().unwrap().field.field_name,
        "Status__c"
    );

    let view = views.borrow_and_update().clone();
    assert_eq!(view.generation(), Some(2));
    assert_eq!(view.data().unwrap().field.field_name, "Status__c");
    assert_eq!(pipeline.metrics().runs_discarded(), 1);
}

#[tokio::test]
async fn test_object_selection_supersedes_field_run() {
    let source = Arc::new(GatedSource::new(fixture().await));
    let pipeline = AuditPipeline::new(source.clone());

    let field_run = pipeline.audit_field(FieldSelection::new("Invoice__c", "Amount__c"));
    let object_run = async {
        source.entered.notified().await;
        let outcome = pipeline
            .audit_object(ObjectSelection::new("Account"))
            .await;
        source.release.notify_one();
        outcome
    };
    let (field_outcome, object_outcome) = tokio::join!(field_run, object_run);

    assert!(field_outcome.unwrap().is_discarded());
    assert!(object_outcome.unwrap().published().is_some());
    assert!(pipeline.field_view().is_empty());
    assert_eq!(pipeline.matrix_view().generation(), Some(1));
}

#[tokio::test]
async fn test_later_run_replaces_view() {
    let pipeline = AuditPipeline::new(Arc::new(fixture().await));
    let mut views = pipeline.subscribe_matrix();

    pipeline
        .audit_object(ObjectSelection::new("Invoice__c"))
        .await
        .unwrap();
    pipeline
        .audit_object(ObjectSelection::new("Account"))
        .await
        .unwrap();

    let view = views.borrow_and_update().clone();
    assert_eq!(view.generation(), Some(2));
    assert_eq!(view.data().unwrap().object, "Account");
}

// =============================================================================
// Integrity failures
// =============================================================================

const GHOST_PROFILES: &str = r#"{
    "objects": {
        "Invoice__c": {
            "fields": [{"name": "Amount__c", "label": "Amount", "type": "currency"}]
        }
    },
    "roles": [{"id": "00eSALES", "name": "Sales"}],
    "field_permissions": [
        {"object_name": "Invoice__c", "field": "Invoice__c.Amount__c", "parent_id": "0PSS",
         "is_owned_by_profile": true, "profile_id": "00eSALES", "profile_name": "Sales",
         "can_read": true},
        {"object_name": "Invoice__c", "field": "Invoice__c.Amount__c", "parent_id": "0PSG",
         "is_owned_by_profile": true, "profile_id": "00eGHOST", "profile_name": "Ghost",
         "can_read": true, "can_edit": true},
        {"object_name": "Invoice__c", "field": "Invoice__c.Amount__c", "parent_id": "0PSN",
         "is_owned_by_profile": true, "profile_id": "00eNONAME", "can_read": true}
    ],
    "assignments": [
        {"assignee_id": "005G", "assignee_name": "Gil Grey", "permission_set_id": "0PSG",
         "is_owned_by_profile": true, "profile_id": "00eGHOST"}
    ]
}"#;

const UNLABELLED_PERMISSION_SET: &str = r#"{
    "objects": {
        "Invoice__c": {
            "fields": [{"name": "Amount__c", "label": "Amount", "type": "currency"}]
        }
    },
    "roles": [{"id": "00eSALES", "name": "Sales"}],
    "field_permissions": [{
        "object_name": "Invoice__c",
        "field": "Invoice__c.Amount__c",
        "parent_id": "0PSX",
        "can_read": true
    }]
}"#;

const UNLABELLED_FIELD: &str = r#"{
    "objects": {
        "Invoice__c": {
            "fields": [
                {"name": "Amount__c", "label": "Amount", "type": "currency"},
                {"name": "Notes__c", "label": "", "type": "textarea"}
            ]
        }
    },
    "roles": [{"id": "00eSALES", "name": "Sales"}]
}"#;

#[tokio::test]
async fn test_grants_for_unlisted_profiles_are_dropped() {
    let source = SnapshotSource::from_json_str(GHOST_PROFILES).unwrap();
    let pipeline = AuditPipeline::new(Arc::new(source));

    let outcome = assert_ok!(
        pipeline
            .audit_object(ObjectSelection::new("Invoice__c"))
            .await
    );
    let audit = outcome.published().unwrap();

    let columns: Vec<&str> = audit
        .matrix
        .principals()
        .iter()
        .map(|p| p.id.as_str())
        .collect();
    assert_eq!(columns, vec!["00eSALES"]);
    assert_eq!(audit.matrix.get("Amount__c", "00eGHOST"), None);
    assert_eq!(audit.matrix.get("Amount__c", "00eSALES"), Some(READ));

    assert_eq!(audit.report.unknown_grant_principals, 2);
    let ids: Vec<&str> = audit
        .report
        .unknown_references
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(ids, vec!["00eGHOST", "00eNONAME"]);
    assert_eq!(pipeline.metrics().snapshot().dropped.unknown_principals, 2);
}

#[tokio::test]
async fn test_unlisted_profile_grants_no_field_access() {
    let source = SnapshotSource::from_json_str(GHOST_PROFILES).unwrap();
    let pipeline = AuditPipeline::new(Arc::new(source));

    let outcome = assert_ok!(
        pipeline
            .audit_field(FieldSelection::new("Invoice__c", "Amount__c"))
            .await
    );
    let audit = outcome.published().unwrap();

    let roles: Vec<&str> = audit
        .principals
        .roles
        .iter()
        .map(|r| r.principal_id.as_str())
        .collect();
    assert_eq!(roles, vec!["00eSALES"]);
    assert!(audit.principals.additive.is_empty());
    assert!(audit.identities.is_empty());
    assert_eq!(audit.report.unknown_grant_principals, 2);
}

#[tokio::test]
async fn test_malformed_principal_fails_view() {
    let source = SnapshotSource::from_json_str(UNLABELLED_PERMISSION_SET).unwrap();
    let pipeline = AuditPipeline::new(Arc::new(source));

    let err = assert_err!(
        pipeline
            .audit_object(ObjectSelection::new("Invoice__c"))
            .await
    );
    match &err {
        AppError::Integrity(DataIntegrityError::MalformedPrincipal { id, .. }) => {
            assert_eq!(id, "0PSX");
        }
        other => panic!("expected malformed principal, got {:?}", other),
    }

    match pipeline.matrix_view() {
        ViewState::Failed { generation, message } => {
            assert_eq!(generation, 1);
            assert!(message.contains("0PSX"));
        }
        other => panic!("expected failed view, got {:?}", other),
    }
    assert_eq!(pipeline.metrics().snapshot().runs_failed, 1);
}

#[tokio::test]
async fn test_malformed_field_publishes_no_matrix() {
    let source = SnapshotSource::from_json_str(UNLABELLED_FIELD).unwrap();
    let pipeline = AuditPipeline::new(Arc::new(source));

    let err = pipeline
        .audit_object(ObjectSelection::new("Invoice__c"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Integrity(DataIntegrityError::MalformedField { .. })
    ));
    assert!(pipeline.matrix_view().data().is_none());
    assert!(pipeline.matrix_view().message().unwrap().contains("Notes__c"));

    // A well-formed field on the same object still audits
    let outcome = pipeline
        .audit_field(FieldSelection::new("Invoice__c", "Amount__c"))
        .await
        .unwrap();
    assert!(outcome.published().is_some());
}
