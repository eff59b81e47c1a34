//! setgrid-state — embedded state store for SetGrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for modules, settings, the subject directory (users and groups),
//! per-subject setting assignments, setting rules, and global statistics.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value columns. Every write
//! runs in its own redb write transaction; redb serializes write
//! transactions, which is what makes the release counter increment atomic.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::StateError::$variant(e.to_string())
    };
}

pub mod assignments;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod rules;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
