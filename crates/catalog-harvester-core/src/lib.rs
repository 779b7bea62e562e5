//! # Catalog Harvester Core
//!
//! Backend-agnostic logic for Catalog Harvester: catalog and release models,
//! schema-version detection and upgrade, compliance scoring, release merging,
//! and the search-backend abstraction with an in-memory implementation.
//!
//! This crate contains no tokio, sqlx, network, or filesystem I/O. Everything
//! that touches the outside world lives in the `catalog-harvester` crate.

pub mod backend;
pub mod compliance;
pub mod merge;
pub mod models;
pub mod normalize;
