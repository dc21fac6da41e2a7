//! Resolution runs
//!
//! Selecting an object or a field starts a run. A newer selection supersedes
//! any run still in flight for the same view, and selecting an object also
//! supersedes the field view. Superseded runs finish as
//! [`RunOutcome::Discarded`] and never touch the published view.

pub mod generation;
pub mod runner;
pub mod views;

pub use generation::{GenerationToken, RunGenerations};
pub use runner::AuditPipeline;
pub use views::{
    Audited, FieldAudit, FieldSelection, ObjectAudit, ObjectSelection, RunOutcome, ViewState,
};
