//! setgrid-core — leaf codecs and shared vocabulary for SetGrid.
//!
//! Nothing in this crate touches storage. It holds the pieces every other
//! crate agrees on:
//!
//! - **`pagination`** — opaque cursor tokens and the page-trimming convention
//! - **`rule`** — the `userPercent` rollout rule validator/codec
//! - **`validate`** — request validation for setting names, updates and filters
//! - **`config`** — `setgrid.toml` parsing

pub mod config;
pub mod error;
pub mod pagination;
pub mod rule;
pub mod validate;

pub use config::SetgridConfig;
pub use error::ValidationError;
pub use pagination::{Page, Pagination};
pub use rule::PercentRule;
pub use validate::{SettingFilter, SettingUpdate};
