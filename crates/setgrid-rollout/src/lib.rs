//! SetGrid rollout engine — release-scoped setting assignment.
//!
//! Every `assign` allocates a new release generation for the setting and
//! writes it onto the affected user and group rows, so a whole release can
//! later be recalled, or a single subject rolled back to its prior value.
//!
//! # Components
//!
//! - **`engine`** — Assign, recall, rollback, remove, offline, delete
//! - **`catalog`** — Modules, settings, subjects and rollout rules
//! - **`queries`** — Paginated listings and statistics
//! - **`maintainer`** — Background status counters and cascade purges

pub mod catalog;
pub mod engine;
pub mod error;
pub mod maintainer;
pub mod queries;

pub use catalog::RuleInfo;
pub use engine::{ReleaseInfo, RolloutEngine};
pub use error::{RolloutError, RolloutResult};
pub use maintainer::{StatusHandle, StatusMaintainer, StatusTask};
