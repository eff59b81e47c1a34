//! redb table definitions for the SetGrid state store.
//!
//! Records are `u64`-keyed JSON blobs. Name and uid indexes map `&str` keys to
//! record ids; the `{module_id}/{name}` composite key makes setting names
//! unique per module. Assignment rows are keyed `(setting_id, subject_id)` so a
//! setting's rows form one contiguous range, with a reverse
//! `(subject_id, setting_id) -> row id` index for subject-facing reads and a
//! `(setting_id, row_id) -> subject_id` index for row-id ordered pages.

use redb::TableDefinition;

use crate::types::SubjectKind;

/// Id allocation counters keyed by sequence name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub const MODULES: TableDefinition<u64, &[u8]> = TableDefinition::new("modules");
pub const MODULE_NAMES: TableDefinition<&str, u64> = TableDefinition::new("module_names");

pub const SETTINGS: TableDefinition<u64, &[u8]> = TableDefinition::new("settings");
/// `{module_id}/{name}` → setting id.
pub const SETTING_NAMES: TableDefinition<&str, u64> = TableDefinition::new("setting_names");

pub const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
pub const USER_UIDS: TableDefinition<&str, u64> = TableDefinition::new("user_uids");

pub const GROUPS: TableDefinition<u64, &[u8]> = TableDefinition::new("groups");
pub const GROUP_UIDS: TableDefinition<&str, u64> = TableDefinition::new("group_uids");

/// `(setting_id, user_id)` → assignment.
pub const USER_SETTINGS: TableDefinition<(u64, u64), &[u8]> =
    TableDefinition::new("user_settings");
/// `(user_id, setting_id)` → assignment row id.
pub const USER_SETTINGS_BY_SUBJECT: TableDefinition<(u64, u64), u64> =
    TableDefinition::new("user_settings_by_subject");
/// `(setting_id, row_id)` → user id.
pub const USER_SETTINGS_BY_ROW: TableDefinition<(u64, u64), u64> =
    TableDefinition::new("user_settings_by_row");

/// `(setting_id, group_id)` → assignment.
pub const GROUP_SETTINGS: TableDefinition<(u64, u64), &[u8]> =
    TableDefinition::new("group_settings");
/// `(group_id, setting_id)` → assignment row id.
pub const GROUP_SETTINGS_BY_SUBJECT: TableDefinition<(u64, u64), u64> =
    TableDefinition::new("group_settings_by_subject");
/// `(setting_id, row_id)` → group id.
pub const GROUP_SETTINGS_BY_ROW: TableDefinition<(u64, u64), u64> =
    TableDefinition::new("group_settings_by_row");

pub const SETTING_RULES: TableDefinition<u64, &[u8]> = TableDefinition::new("setting_rules");

/// Global counters keyed by statistic name.
pub const STATISTICS: TableDefinition<&str, i64> = TableDefinition::new("statistics");

/// The tables backing one subject kind.
#[derive(Clone, Copy)]
pub(crate) struct SubjectTables {
    pub records: TableDefinition<'static, u64, &'static [u8]>,
    pub uids: TableDefinition<'static, &'static str, u64>,
    pub assignments: TableDefinition<'static, (u64, u64), &'static [u8]>,
    pub by_subject: TableDefinition<'static, (u64, u64), u64>,
    pub by_row: TableDefinition<'static, (u64, u64), u64>,
    /// Sequence for subject record ids.
    pub subject_sequence: &'static str,
    /// Sequence for assignment row ids.
    pub row_sequence: &'static str,
}

pub(crate) fn subject_tables(kind: SubjectKind) -> SubjectTables {
    match kind {
        SubjectKind::User => SubjectTables {
            records: USERS,
            uids: USER_UIDS,
            assignments: USER_SETTINGS,
            by_subject: USER_SETTINGS_BY_SUBJECT,
            by_row: USER_SETTINGS_BY_ROW,
            subject_sequence: "user",
            row_sequence: "user_setting",
        },
        SubjectKind::Group => SubjectTables {
            records: GROUPS,
            uids: GROUP_UIDS,
            assignments: GROUP_SETTINGS,
            by_subject: GROUP_SETTINGS_BY_SUBJECT,
            by_row: GROUP_SETTINGS_BY_ROW,
            subject_sequence: "group",
            row_sequence: "group_setting",
        },
    }
}
