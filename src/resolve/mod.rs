//! Permission resolution
//!
//! Resolves effective field-level access from profile and permission set
//! grants. The pipeline is:
//!
//! ```text
//! raw rows → normalizer → matrix resolver (field × role)
//!                       → field access → identity aggregator (per user)
//! ```
//!
//! ## Merge rules
//!
//! - A field with no grant and no override resolves to no access
//! - A role grant replaces the cell; roles never combine with each other
//! - Override fields take their fixed access last, ignoring every grant
//! - Additive principals combine by OR per bit; only those that grant at
//!   least one bit are listed as contributors
//!
//! Every step is a pure function of its inputs and independent of row order.

pub mod catalog;
pub mod identity;
pub mod matrix;
pub mod normalizer;
pub mod types;

pub use catalog::PrincipalCatalog;
pub use identity::resolve_identity_access;
pub use matrix::{
    FieldAccess, GrantLayer, MatrixCell, MatrixLayer, MatrixRow, OverrideLayer, PrincipalListing,
    ResolvedMatrix, resolve_field_access, resolve_matrix, select_principals,
};
pub use normalizer::{NormalizationReport, NormalizedInput, UnknownReference, normalize};
pub use types::{
    AssignmentRecord, EffectiveAccess, FieldDescriptor, GrantRecord, IdentityAccessRecord,
    Principal, PrincipalAccessRow, PrincipalKind,
};
