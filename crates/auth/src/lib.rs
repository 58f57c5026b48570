//! `claimsync-auth`: profile records and the claims derived from them.
//!
//! This crate is intentionally decoupled from storage and transport: it only
//! knows how a profile snapshot maps to the authorization claims an identity
//! record should carry.

pub mod claims;
pub mod profile;
pub mod roles;

pub use claims::{ClaimsSet, resolve_claims};
pub use profile::ProfileRecord;
pub use roles::{Role, UnknownRole};
