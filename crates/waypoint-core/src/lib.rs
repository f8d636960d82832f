//! Core types and trait definitions for the Waypoint timeline store.
//!
//! This crate owns the domain model (nodes, organizations, policies), the
//! `TimelineStore` abstraction, and the permission resolver. It is
//! deliberately free of HTTP and database dependencies; all other crates
//! depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod error;
pub mod filter;
pub mod node;
pub mod org;
pub mod policy;
pub mod store;

pub use error::{Classify, Error, ErrorKind, Result};
