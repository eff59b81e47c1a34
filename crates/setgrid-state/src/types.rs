//! Domain types for the SetGrid state store.
//!
//! Records are JSON-serialized into redb value columns. Timestamps are unix
//! seconds.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub type ModuleId = u64;
pub type SettingId = u64;
pub type SubjectId = u64;

/// Statistic key for the number of live settings across all modules.
pub const SETTINGS_TOTAL_SIZE: &str = "settings_total_size";

/// `status` value of a retired setting.
pub const OFFLINE_STATUS: i64 = -1;

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ── Modules & settings ─────────────────────────────────────────────

/// A group of settings. `status` counts its live settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    pub description: String,
    pub status: i64,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A rollout-managed setting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Setting {
    pub id: SettingId,
    pub module_id: ModuleId,
    pub name: String,
    pub description: String,
    pub channels: Vec<String>,
    pub clients: Vec<String>,
    pub values: Vec<String>,
    /// Active assignment count; [`OFFLINE_STATUS`] once retired.
    pub status: i64,
    /// Last allocated release generation. Starts at 0.
    pub release: u64,
    pub created_at: u64,
    pub updated_at: u64,
    pub offline_at: Option<u64>,
}

impl Setting {
    pub fn is_offline(&self) -> bool {
        self.offline_at.is_some()
    }

    /// Key into the per-module name index.
    pub fn name_key(module_id: ModuleId, name: &str) -> String {
        format!("{module_id}/{name}")
    }
}

// ── Subjects ───────────────────────────────────────────────────────

/// Which assignment table a subject lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    User,
    Group,
}

impl SubjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectKind::User => "user",
            SubjectKind::Group => "group",
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: SubjectId,
    pub uid: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: SubjectId,
    /// Free-form category, e.g. "org" or "project".
    pub kind: String,
    pub uid: String,
    pub description: String,
    pub created_at: u64,
}

// ── Assignments ────────────────────────────────────────────────────

/// One subject's value for one setting. Unique on (subject, setting).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    /// Row id, allocated once when the row is first created.
    pub id: u64,
    pub subject_id: SubjectId,
    pub setting_id: SettingId,
    pub value: String,
    /// Value immediately before `value`; the rollback target.
    pub last_value: String,
    /// Release generation of the batch that last wrote this row.
    pub release: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

/// An assignment row as seen from its setting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingAssignment {
    #[serde(skip)]
    pub id: u64,
    pub uid: String,
    pub value: String,
    #[serde(rename = "lastValue")]
    pub last_value: String,
    pub release: u64,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
    #[serde(rename = "updatedAt")]
    pub updated_at: u64,
}

/// An assignment row as seen from its subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubjectSetting {
    #[serde(skip)]
    pub id: u64,
    #[serde(rename = "settingId")]
    pub setting_id: SettingId,
    #[serde(rename = "moduleId")]
    pub module_id: ModuleId,
    pub name: String,
    pub value: String,
    #[serde(rename = "lastValue")]
    pub last_value: String,
    pub release: u64,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
    #[serde(rename = "updatedAt")]
    pub updated_at: u64,
}

// ── Rules ──────────────────────────────────────────────────────────

/// A stored rollout rule. `rule` holds the encoded payload only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingRule {
    pub id: u64,
    pub setting_id: SettingId,
    pub kind: String,
    pub rule: String,
    pub release: u64,
    pub created_at: u64,
    pub updated_at: u64,
}
