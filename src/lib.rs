//! # Catalog Harvester
//!
//! Harvests `code.json` software inventories published by many
//! organizations, upgrades legacy (1.0.1) catalogs to the 2.0.0 shape,
//! validates them, scores each organization's compliance, and rebuilds an
//! aliased search index without read downtime.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────────────┐   ┌──────────────────┐
//! │ Sources  │──▶│ fetch → normalize →     │──▶│ Index lifecycle  │
//! │ code.json│   │ validate → merge → score│   │ create → populate│
//! └──────────┘   └────────────┬────────────┘   │ → optimize → swap│
//!                             │                │ → retire         │
//!                             ▼                └────────┬─────────┘
//!                      ┌─────────────┐                  ▼
//!                      │ report.json │            ┌──────────┐
//!                      └─────────────┘            │  SQLite  │
//!                                                 │  FTS5    │
//!                                                 └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init                    # create database
//! harvest sources                 # list configured sources
//! harvest run                     # harvest every source and swap the alias
//! harvest run --source AA         # harvest a subset
//! harvest indices                 # list index generations
//! harvest retire --days 3         # delete aged, unaliased generations
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`fetch`] | Catalog retrieval over HTTP |
//! | [`validate`] | JSON-schema validation of catalogs |
//! | [`lifecycle`] | Index create/populate/optimize/swap/retire state machine |
//! | [`pipeline`] | Run orchestration |
//! | [`report`] | Per-source status report |
//! | [`sqlite_backend`] | SQLite/FTS5 search backend |
//! | [`error`] | Error taxonomy |
//! | [`telemetry`] | Structured logging setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod indices;
pub mod lifecycle;
pub mod migrate;
pub mod pipeline;
pub mod report;
pub mod sources;
pub mod sqlite_backend;
pub mod telemetry;
pub mod validate;

pub use catalog_harvester_core as core;
