//! # LiveIndex Core
//!
//! Shared, runtime-agnostic logic for LiveIndex: data models, chunking,
//! the index store abstraction, the embedding trait, and result ranking.
//!
//! This crate contains no tokio, filesystem I/O, or network dependencies.
//! The application crate wires these pieces to a connector, an embedding
//! provider, and the sync coordinator.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod rank;
pub mod store;
