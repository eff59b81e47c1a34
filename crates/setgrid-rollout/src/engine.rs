//! Rollout engine — release-scoped assignment, rollback, recall and retirement.
//!
//! Every operation performs its primary write synchronously and returns once
//! that write is durable. Counter upkeep and cascade purges are handed to the
//! [`StatusHandle`] and never awaited.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use setgrid_core::config::SettingsConfig;
use setgrid_core::{ValidationError, validate};
use setgrid_state::assignments::AFFECTED_SUBJECTS_LIMIT;
use setgrid_state::{
    ModuleId, SETTINGS_TOTAL_SIZE, Setting, SettingId, StateStore, SubjectId, SubjectKind,
};
use tracing::{info, warn};

use crate::error::{RolloutError, RolloutResult};
use crate::maintainer::{StatusHandle, StatusTask};

/// Outcome of one `assign` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub release: u64,
    pub value: String,
    /// Sample of the users written by this release, newest first.
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

/// The rollout engine. Cheap to clone; all clones share one store.
#[derive(Clone)]
pub struct RolloutEngine {
    pub(crate) store: StateStore,
    pub(crate) settings: Arc<SettingsConfig>,
    pub(crate) status: StatusHandle,
}

impl RolloutEngine {
    pub fn new(store: StateStore, settings: SettingsConfig, status: StatusHandle) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
            status,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Grant `value` to the listed users and groups under one new release.
    ///
    /// The group batch runs only after the user batch succeeded. Unknown
    /// uids are skipped silently.
    ///
    /// Errors: `NotFound` if the setting is absent or offline, including
    /// when it goes offline between release allocation and the batch write;
    /// `Validation` if `value` is malformed or, when the setting declares
    /// `values`, not one of them; `Store` on storage failure.
    pub fn assign(
        &self,
        setting_id: SettingId,
        value: &str,
        users: &[String],
        groups: &[String],
    ) -> RolloutResult<ReleaseInfo> {
        let setting = self.acquire_setting(setting_id)?;
        validate::check_value(value)?;
        if !setting.values.is_empty() && !setting.values.iter().any(|v| v == value) {
            return Err(ValidationError::Invalid {
                field: "value",
                value: value.to_string(),
            }
            .into());
        }

        let release = self.store.allocate_release(setting_id)?;
        let mut info = ReleaseInfo {
            release,
            value: value.to_string(),
            users: Vec::new(),
            groups: Vec::new(),
        };

        let mut affected = 0u64;
        let result = self.assign_batches(setting_id, users, groups, &mut info, &mut affected);
        // Rows already written must be counted even if the group batch failed.
        if affected > 0 {
            self.status.schedule(StatusTask::RefreshSetting(setting_id));
        }
        result?;

        info!(
            setting_id,
            release,
            %value,
            users = info.users.len(),
            groups = info.groups.len(),
            "release assigned"
        );
        Ok(info)
    }

    fn assign_batches(
        &self,
        setting_id: SettingId,
        users: &[String],
        groups: &[String],
        info: &mut ReleaseInfo,
        affected: &mut u64,
    ) -> RolloutResult<()> {
        info.users = self.assign_batch(
            SubjectKind::User,
            setting_id,
            info.release,
            &info.value,
            users,
            affected,
        )?;
        info.groups = self.assign_batch(
            SubjectKind::Group,
            setting_id,
            info.release,
            &info.value,
            groups,
            affected,
        )?;
        Ok(())
    }

    fn assign_batch(
        &self,
        kind: SubjectKind,
        setting_id: SettingId,
        release: u64,
        value: &str,
        uids: &[String],
        affected: &mut u64,
    ) -> RolloutResult<Vec<String>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let count = self
            .store
            .batch_assign(kind, setting_id, release, value, uids)?;
        *affected += count;
        if count == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .list_affected_subjects(kind, setting_id, release, AFFECTED_SUBJECTS_LIMIT)?)
    }

    /// Delete every row written by `release`. Idempotent.
    pub fn recall(&self, setting_id: SettingId, release: u64) -> RolloutResult<u64> {
        let removed = self.store.recall_release(setting_id, release)?;
        if removed > 0 {
            self.status.schedule(StatusTask::RefreshSetting(setting_id));
            info!(setting_id, release, removed, "release recalled");
        }
        Ok(removed)
    }

    /// Revert one user's value to the one it held before the last assign.
    /// Returns false when the user has no row for the setting.
    pub fn rollback_user(&self, uid: &str, setting_id: SettingId) -> RolloutResult<bool> {
        let user_id = self.subject_id(SubjectKind::User, uid)?;
        Ok(self
            .store
            .rollback_assignment(SubjectKind::User, user_id, setting_id)?)
    }

    pub fn rollback_group(&self, uid: &str, setting_id: SettingId) -> RolloutResult<bool> {
        let group_id = self.subject_id(SubjectKind::Group, uid)?;
        Ok(self
            .store
            .rollback_assignment(SubjectKind::Group, group_id, setting_id)?)
    }

    pub fn remove_user_setting(&self, uid: &str, setting_id: SettingId) -> RolloutResult<bool> {
        self.remove_subject_setting(SubjectKind::User, uid, setting_id)
    }

    pub fn remove_group_setting(&self, uid: &str, setting_id: SettingId) -> RolloutResult<bool> {
        self.remove_subject_setting(SubjectKind::Group, uid, setting_id)
    }

    fn remove_subject_setting(
        &self,
        kind: SubjectKind,
        uid: &str,
        setting_id: SettingId,
    ) -> RolloutResult<bool> {
        let subject_id = self.subject_id(kind, uid)?;
        let removed = self.store.remove_assignment(kind, subject_id, setting_id)?;
        if removed {
            self.status.schedule(StatusTask::AdjustSetting {
                setting_id,
                delta: -1,
            });
        }
        Ok(removed)
    }

    /// Retire a setting permanently. Its rows and rules are purged and the
    /// module and global counters decremented in the background.
    pub fn offline(&self, module_id: ModuleId, setting_id: SettingId) -> RolloutResult<Setting> {
        let Some(setting) = self.store.mark_offline(module_id, setting_id)? else {
            return Err(RolloutError::NotFound(format!(
                "setting {setting_id} in module {module_id}"
            )));
        };
        self.status.schedule(StatusTask::PurgeAssignments(vec![setting_id]));
        self.status.schedule(StatusTask::PurgeRules(vec![setting_id]));
        self.schedule_setting_removed(module_id);
        info!(setting_id, module_id, name = %setting.name, "setting offline");
        Ok(setting)
    }

    /// Hard-delete a setting together with its rows and rules.
    pub fn delete(&self, setting_id: SettingId) -> RolloutResult<Setting> {
        let Some(setting) = self.store.delete_setting(setting_id)? else {
            return Err(RolloutError::NotFound(format!("setting {setting_id}")));
        };
        if setting.is_offline() {
            info!(setting_id, "offline setting deleted");
        } else {
            warn!(setting_id, name = %setting.name, "deleting a setting that was never offline");
            self.schedule_setting_removed(setting.module_id);
        }
        Ok(setting)
    }

    /// Allocate a fresh release for a live setting.
    pub fn acquire_release(&self, setting_id: SettingId) -> RolloutResult<u64> {
        Ok(self.store.allocate_release(setting_id)?)
    }

    fn schedule_setting_removed(&self, module_id: ModuleId) {
        self.status.schedule(StatusTask::AdjustModule {
            module_id,
            delta: -1,
        });
        self.status.schedule(StatusTask::AdjustStatistic {
            key: SETTINGS_TOTAL_SIZE,
            delta: -1,
        });
    }

    pub(crate) fn subject_id(&self, kind: SubjectKind, uid: &str) -> RolloutResult<SubjectId> {
        self.store
            .resolve_subject(kind, uid)?
            .ok_or_else(|| RolloutError::NotFound(format!("{kind} {uid}")))
    }
}
