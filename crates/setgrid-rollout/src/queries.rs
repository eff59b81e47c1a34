//! Paginated reads over settings, subjects and assignments.

use std::collections::BTreeMap;

use setgrid_core::{Page, Pagination, SettingFilter};
use setgrid_state::{ModuleId, Setting, SettingAssignment, SettingId, SubjectKind, SubjectSetting};

use crate::engine::RolloutEngine;
use crate::error::{RolloutError, RolloutResult};

impl RolloutEngine {
    pub fn list_settings(&self, module_id: ModuleId, pg: &Pagination) -> RolloutResult<Page<Setting>> {
        self.get_module(module_id)?;
        let (rows, total) = self
            .store
            .list_settings(module_id, pg.cursor(), pg.fetch_limit())?;
        Ok(Page::from_rows(rows, total, pg, |s| s.id))
    }

    /// Live settings assigned directly to a user, narrowed by `filter`.
    pub fn list_user_settings(
        &self,
        uid: &str,
        filter: &SettingFilter,
        pg: &Pagination,
    ) -> RolloutResult<Page<SubjectSetting>> {
        self.list_subject_settings(SubjectKind::User, uid, filter, pg)
    }

    pub fn list_group_settings(
        &self,
        uid: &str,
        filter: &SettingFilter,
        pg: &Pagination,
    ) -> RolloutResult<Page<SubjectSetting>> {
        self.list_subject_settings(SubjectKind::Group, uid, filter, pg)
    }

    fn list_subject_settings(
        &self,
        kind: SubjectKind,
        uid: &str,
        filter: &SettingFilter,
        pg: &Pagination,
    ) -> RolloutResult<Page<SubjectSetting>> {
        filter.validate(&self.settings.channels, &self.settings.clients)?;
        let subject_id = self.subject_id(kind, uid)?;
        self.check_filter_scope(filter)?;
        let (rows, total) = self.store.list_subject_settings(
            kind,
            subject_id,
            filter,
            pg.cursor(),
            pg.fetch_limit(),
        )?;
        Ok(Page::from_rows(rows, total, pg, |row| row.id))
    }

    /// A module or setting named in a filter must exist, and a setting must
    /// belong to the named module.
    fn check_filter_scope(&self, filter: &SettingFilter) -> RolloutResult<()> {
        if let Some(module_id) = filter.module_id {
            self.get_module(module_id)?;
        }
        if let Some(setting_id) = filter.setting_id {
            let setting = self.get_setting(setting_id)?;
            if filter.module_id.is_some_and(|id| id != setting.module_id) {
                return Err(RolloutError::NotFound(format!(
                    "setting {setting_id} in module {}",
                    setting.module_id
                )));
            }
        }
        Ok(())
    }

    pub fn list_setting_users(
        &self,
        setting_id: SettingId,
        pg: &Pagination,
    ) -> RolloutResult<Page<SettingAssignment>> {
        self.list_setting_assignments(SubjectKind::User, setting_id, pg)
    }

    pub fn list_setting_groups(
        &self,
        setting_id: SettingId,
        pg: &Pagination,
    ) -> RolloutResult<Page<SettingAssignment>> {
        self.list_setting_assignments(SubjectKind::Group, setting_id, pg)
    }

    fn list_setting_assignments(
        &self,
        kind: SubjectKind,
        setting_id: SettingId,
        pg: &Pagination,
    ) -> RolloutResult<Page<SettingAssignment>> {
        self.get_setting(setting_id)?;
        let (rows, total) =
            self.store
                .list_setting_assignments(kind, setting_id, pg.cursor(), pg.fetch_limit())?;
        Ok(Page::from_rows(rows, total, pg, |row| row.id))
    }

    pub fn statistics(&self) -> RolloutResult<BTreeMap<String, i64>> {
        Ok(self.store.list_statistics()?)
    }
}
