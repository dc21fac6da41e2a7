//! Field Permission Auditor
//!
//! Resolves who can read or edit a field, from profile and permission set
//! grants, and explains where each user's access comes from.
//!
//! ## Features
//!
//! - **Field × profile matrix** for one object, with override fields applied last
//! - **Per-field audit** listing profiles, permission sets and assigned users
//! - **Cancel-on-supersede runs**: a newer selection discards stale results
//! - **Flexible configuration** via TOML files and environment variables
//!
//! ## Resolution Model
//!
//! ```text
//! profile grant (replaces) → override field (fixed) ; permission sets OR together
//! ```
//!
//! A user's effective access is their profile's access ORed with every
//! assigned permission set. Only permission sets that grant at least one bit
//! are reported as contributors.
//!
//! ## Example Configuration
//!
//! ```toml
//! [source]
//! snapshot = "~/exports/org-permissions.json"
//!
//! [objects]
//! include = [".*__c$"]            # Custom objects only
//! exclude = ["^Legacy_.*"]
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod source;

// Re-export main types
pub use config::{AppConfig, load_config};
pub use error::{AppError, Result};
pub use metrics::PipelineMetrics;
pub use pipeline::{AuditPipeline, FieldSelection, ObjectSelection, RunOutcome, ViewState};
pub use source::{PermissionSource, SharedSource, SnapshotSource};
