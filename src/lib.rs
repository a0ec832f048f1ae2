//! Confstore Server Library
//!
//! A versioned, deduplicated file store exposed over HTTP. The server binary
//! is in main.rs; everything it serves is built from these modules.
//!
//! # Modules
//!
//! - `store`: versioning engine, blob codec, snapshot persistence and rebuild
//! - `diff`: adjacent-version diff rendering
//! - `routes`: axum routers for the HTTP surface

pub mod config;
pub mod diff;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
