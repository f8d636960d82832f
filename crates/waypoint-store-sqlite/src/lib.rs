//! SQLite backend for the Waypoint timeline store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Hierarchy mutations execute
//! as single transactions on that connection, which also serialises
//! concurrent writers.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
