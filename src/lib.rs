//! # LiveIndex
//!
//! Keeps a vector index continuously consistent with a mutable set of
//! source documents and serves permission-filtered, cited answers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ events ┌──────────────────┐  upsert/retire  ┌─────────────┐
//! │  Connector  │───────▶│ Sync Coordinator │────────────────▶│ Index Store │
//! │  FS/memory  │        │ debounce + swap  │                 └──────┬──────┘
//! └─────────────┘        └───┬──────────┬───┘                        │ search
//!                            │ commit   │ events                     │
//!                            ▼          ▼                            │
//!                      ┌─────────┐  ┌──────┐      ┌───────────────────┴┐
//!                      │ Catalog │  │ Hub  │      │ Query Orchestrator │
//!                      └─────────┘  └──┬───┘      └─────────┬──────────┘
//!                                      ▼ /ws                ▼ /query
//!                                   observers            callers
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`app`] | Component wiring and watcher control |
//! | [`catalog`] | Committed document versions |
//! | [`config`] | TOML configuration parsing |
//! | [`connector`] | Connector trait and in-memory connector |
//! | [`connector_fs`] | Filesystem connector with `notify` watch |
//! | [`embedding`] | Hash and OpenAI embedders |
//! | [`error`] | Sync and query error types |
//! | [`hub`] | Per-subscriber event queues |
//! | [`logging`] | Tracing subscriber setup |
//! | [`metrics`] | Rolling query latency window |
//! | [`permissions`] | Roles and document permission levels |
//! | [`query`] | Query orchestration and answer assembly |
//! | [`server`] | HTTP and WebSocket server |
//! | [`sync`] | Per-document sync state machine |

pub mod app;
pub mod catalog;
pub mod config;
pub mod connector;
pub mod connector_fs;
pub mod embedding;
pub mod error;
pub mod hub;
pub mod logging;
pub mod metrics;
pub mod permissions;
pub mod query;
pub mod server;
pub mod sync;
