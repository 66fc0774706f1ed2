//! # Vault Index
//!
//! Keeps a local, queryable copy of a remote note collection and a vector
//! index over it for semantic retrieval.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Remote    │──▶│ Sync engine  │──▶│    SQLite    │
//! │ list/fetch  │   │ tags + embed │   │ docs/tags/vec│
//! └─────────────┘   └──────┬───────┘   └──────┬───────┘
//!                          │ rebuild          │ list_embeddings
//!                          ▼                  ▼
//!                   ┌──────────────┐   ┌──────────────┐
//!                   │ Vector index │◀──│   Snapshot   │
//!                   │  (in memory) │──▶│ vectors+ids  │
//!                   └──────┬───────┘   └──────────────┘
//!                          ▼
//!                 ┌─────────────────┐
//!                 │  Query service  │──▶ CLI (vidx) / HTTP
//!                 └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vidx init
//! vidx sync --progress human
//! vidx search "release checklist"
//! vidx serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Document, tag and embedding persistence |
//! | [`tags`] | Hashtag extraction |
//! | [`index`] | Vector index and its live owner |
//! | [`snapshot`] | On-disk index snapshot |
//! | [`remote`] | Remote listing/download sources |
//! | [`embedding`] | Embedding providers |
//! | [`sync`] | Single-flight sync runs |
//! | [`status`] | Shared sync status record |
//! | [`query`] | Semantic and lexical search |
//! | [`server`] | HTTP API |

pub mod app;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod index;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod query;
pub mod remote;
pub mod server;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod sync;
pub mod tags;
