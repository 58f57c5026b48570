//! HTTP API: trigger endpoints in front of the sync router.

pub mod app;
