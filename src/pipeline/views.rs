//! Read-models published to subscribers
//!
//! The pipeline exposes two views: the object matrix and the field audit.
//! Both are replaced wholesale by the run that currently owns them.

use crate::error::StaleRunDiscarded;
use crate::resolve::{
    FieldDescriptor, IdentityAccessRecord, NormalizationReport, PrincipalListing, ResolvedMatrix,
};
use serde::Serialize;
use std::sync::Arc;

/// Selection snapshot for an object audit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSelection {
    pub object: String,
    /// Role principals to show, by id or display name; empty shows all
    pub principals: Vec<String>,
}

impl ObjectSelection {
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            principals: Vec::new(),
        }
    }

    pub fn with_principals(mut self, principals: Vec<String>) -> Self {
        self.principals = principals;
        self
    }
}

/// Selection snapshot for a field audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    pub object: String,
    pub field: String,
}

impl FieldSelection {
    pub fn new(object: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            field: field.into(),
        }
    }
}

/// Field × role matrix for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectAudit {
    pub object: String,
    pub matrix: ResolvedMatrix,
    pub report: NormalizationReport,
}

/// Who can access one field, and through which principals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldAudit {
    pub object: String,
    pub field: FieldDescriptor,
    pub principals: PrincipalListing,
    pub identities: Vec<IdentityAccessRecord>,
    pub report: NormalizationReport,
}

/// Common surface of published audits
pub trait Audited {
    /// `Object` or `Object.Field`
    fn target(&self) -> String;

    fn report(&self) -> &NormalizationReport;
}

impl Audited for ObjectAudit {
    fn target(&self) -> String {
        self.object.clone()
    }

    fn report(&self) -> &NormalizationReport {
        &self.report
    }
}

impl Audited for FieldAudit {
    fn target(&self) -> String {
        format!("{}.{}", self.object, self.field.field_name)
    }

    fn report(&self) -> &NormalizationReport {
        &self.report
    }
}

/// State of a published view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState<T> {
    /// Nothing resolved for the current selection yet
    Empty,
    Ready { generation: u64, data: Arc<T> },
    /// The current run hit a catalog problem; carries one user-facing message
    Failed { generation: u64, message: String },
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        ViewState::Empty
    }
}

impl<T> ViewState<T> {
    pub fn data(&self) -> Option<&Arc<T>> {
        match self {
            ViewState::Ready { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            ViewState::Empty => None,
            ViewState::Ready { generation, .. } | ViewState::Failed { generation, .. } => {
                Some(*generation)
            }
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ViewState::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ViewState::Empty)
    }
}

/// How a run ended, from the caller's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    /// The run's result is now the published view
    Published(Arc<T>),
    /// A newer run superseded this one; nothing was published
    Discarded(StaleRunDiscarded),
}

impl<T> RunOutcome<T> {
    pub fn published(&self) -> Option<&Arc<T>> {
        match self {
            RunOutcome::Published(data) => Some(data),
            RunOutcome::Discarded(_) => None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, RunOutcome::Discarded(_))
    }
}
