//! `claimsync-core`: primitives shared by every layer of the claims sync core.
//!
//! This crate contains **pure** types (no IO, no async): identifiers, the
//! per-principal sync version, and the error taxonomy the router classifies into.

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult, ErrorClass, SyncError};
pub use id::{AttemptId, EventId, Minted, PrincipalId};
pub use version::{ExpectedRevision, SyncVersion};
