//! Setting catalog: modules, settings, subjects and rollout rules.

use serde::{Deserialize, Serialize};
use setgrid_core::rule::PercentValue;
use setgrid_core::{PercentRule, SettingUpdate, validate};
use setgrid_state::{
    Group, Module, ModuleId, SETTINGS_TOTAL_SIZE, Setting, SettingId, SettingRule,
};
use tracing::info;

use crate::engine::RolloutEngine;
use crate::error::{RolloutError, RolloutResult};
use crate::maintainer::StatusTask;

/// A stored rule with its payload decoded. Undecodable payloads carry
/// `rule.value == -1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub id: u64,
    pub setting_id: SettingId,
    pub kind: String,
    pub rule: PercentValue,
    pub release: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl From<SettingRule> for RuleInfo {
    fn from(stored: SettingRule) -> Self {
        let decoded = PercentRule::decode(&stored.kind, &stored.rule);
        Self {
            id: stored.id,
            setting_id: stored.setting_id,
            kind: stored.kind,
            rule: decoded.rule,
            release: stored.release,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }
}

impl RolloutEngine {
    // ── Modules ────────────────────────────────────────────────────

    pub fn create_module(&self, name: &str, description: &str) -> RolloutResult<Module> {
        validate::check_name("module name", name)?;
        validate::check_desc(description)?;
        let module = self.store.create_module(name, description)?;
        info!(module_id = module.id, %name, "module created");
        Ok(module)
    }

    pub fn get_module(&self, module_id: ModuleId) -> RolloutResult<Module> {
        self.store
            .get_module(module_id)?
            .ok_or_else(|| RolloutError::NotFound(format!("module {module_id}")))
    }

    // ── Settings ───────────────────────────────────────────────────

    /// Create a setting. Module and global counters are bumped in the
    /// background.
    pub fn create_setting(
        &self,
        module_id: ModuleId,
        name: &str,
        description: &str,
    ) -> RolloutResult<Setting> {
        validate::check_name("setting name", name)?;
        validate::check_desc(description)?;
        let setting = self.store.create_setting(module_id, name, description)?;
        self.status.schedule(StatusTask::AdjustModule {
            module_id,
            delta: 1,
        });
        self.status.schedule(StatusTask::AdjustStatistic {
            key: SETTINGS_TOTAL_SIZE,
            delta: 1,
        });
        info!(setting_id = setting.id, module_id, %name, "setting created");
        Ok(setting)
    }

    /// Live setting by module and name.
    pub fn acquire_active_setting(&self, module_id: ModuleId, name: &str) -> RolloutResult<Setting> {
        match self.store.find_setting_by_name(module_id, name)? {
            Some(setting) if !setting.is_offline() => Ok(setting),
            _ => Err(RolloutError::NotFound(format!(
                "setting {name} in module {module_id}"
            ))),
        }
    }

    /// Live setting by id.
    pub fn acquire_setting(&self, setting_id: SettingId) -> RolloutResult<Setting> {
        match self.store.get_setting(setting_id)? {
            Some(setting) if !setting.is_offline() => Ok(setting),
            Some(_) => Err(RolloutError::NotFound(format!(
                "setting {setting_id} was offline"
            ))),
            None => Err(RolloutError::NotFound(format!("setting {setting_id}"))),
        }
    }

    /// Setting by id, offline or not.
    pub fn get_setting(&self, setting_id: SettingId) -> RolloutResult<Setting> {
        self.store
            .get_setting(setting_id)?
            .ok_or_else(|| RolloutError::NotFound(format!("setting {setting_id}")))
    }

    pub fn update_setting(
        &self,
        setting_id: SettingId,
        mut update: SettingUpdate,
    ) -> RolloutResult<Setting> {
        update.validate(&self.settings.channels, &self.settings.clients)?;
        let changes = update.into_changes();
        Ok(self.store.update_setting(setting_id, &changes)?)
    }

    // ── Subjects ───────────────────────────────────────────────────

    /// Register users that don't exist yet. Returns how many were new.
    pub fn ensure_users(&self, uids: &[String]) -> RolloutResult<u64> {
        for uid in uids {
            validate::check_uid("user uid", uid)?;
        }
        Ok(self.store.ensure_users(uids)?)
    }

    pub fn create_group(&self, kind: &str, uid: &str, description: &str) -> RolloutResult<Group> {
        validate::check_name("group kind", kind)?;
        validate::check_uid("group uid", uid)?;
        validate::check_desc(description)?;
        Ok(self.store.create_group(kind, uid, description)?)
    }

    // ── Rules ──────────────────────────────────────────────────────

    /// Attach a rollout rule to a live setting under a fresh release.
    pub fn create_rule(&self, setting_id: SettingId, rule: PercentRule) -> RolloutResult<RuleInfo> {
        rule.validate()?;
        let release = self.store.allocate_release(setting_id)?;
        let stored = self
            .store
            .create_rule(setting_id, &rule.kind, &rule.encode(), release)?;
        info!(setting_id, release, value = rule.rule.value, "setting rule created");
        Ok(stored.into())
    }

    pub fn list_rules(&self, setting_id: SettingId) -> RolloutResult<Vec<RuleInfo>> {
        self.get_setting(setting_id)?;
        Ok(self
            .store
            .list_rules(setting_id)?
            .into_iter()
            .map(RuleInfo::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintainer::{StatusHandle, StatusMaintainer};
    use setgrid_core::ValidationError;
    use setgrid_core::config::{SettingsConfig, StatusConfig};
    use setgrid_core::rule::INVALID_PERCENT;
    use setgrid_state::StateStore;

    fn engine() -> RolloutEngine {
        let store = StateStore::open_in_memory().unwrap();
        let (status, _tasks) = StatusHandle::recording(1024);
        RolloutEngine::new(store, SettingsConfig::default(), status)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicate_names_conflict() {
        let engine = engine();
        let module = engine.create_module("app", "").unwrap();
        assert!(matches!(
            engine.create_module("app", ""),
            Err(RolloutError::Conflict(_))
        ));

        engine.create_setting(module.id, "beta", "").unwrap();
        assert!(matches!(
            engine.create_setting(module.id, "beta", ""),
            Err(RolloutError::Conflict(_))
        ));
        assert!(matches!(
            engine.create_setting(module.id + 1, "beta", ""),
            Err(RolloutError::NotFound(_))
        ));
    }

    #[test]
    fn invalid_names_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.create_module("Bad Name", ""),
            Err(RolloutError::Validation(_))
        ));
        assert!(matches!(
            engine.ensure_users(&strings(&["ok", ""])),
            Err(RolloutError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn create_setting_bumps_counters() {
        let store = StateStore::open_in_memory().unwrap();
        let maintainer = StatusMaintainer::spawn(store.clone(), &StatusConfig::default());
        let engine = RolloutEngine::new(store, SettingsConfig::default(), maintainer.handle());
        let module = engine.create_module("app", "").unwrap();
        engine.create_setting(module.id, "alpha", "").unwrap();
        engine.create_setting(module.id, "beta", "").unwrap();

        maintainer.shutdown().await;
        assert_eq!(engine.get_module(module.id).unwrap().status, 2);
        assert_eq!(engine.statistics().unwrap()[SETTINGS_TOTAL_SIZE], 2);
    }

    #[test]
    fn update_validates_against_allow_lists() {
        let engine = engine();
        let module = engine.create_module("app", "").unwrap();
        let setting = engine.create_setting(module.id, "beta", "").unwrap();

        let updated = engine
            .update_setting(
                setting.id,
                SettingUpdate {
                    desc: Some("new".into()),
                    channels: Some(strings(&["stable", "beta"])),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.description, "new");
        assert_eq!(updated.channels, strings(&["beta", "stable"]));
        assert!(updated.clients.is_empty());

        assert!(matches!(
            engine.update_setting(
                setting.id,
                SettingUpdate {
                    clients: Some(strings(&["fridge"])),
                    ..Default::default()
                }
            ),
            Err(RolloutError::Validation(_))
        ));
        assert!(matches!(
            engine.update_setting(setting.id, SettingUpdate::default()),
            Err(RolloutError::Validation(ValidationError::EmptyUpdate))
        ));
    }

    #[test]
    fn offline_setting_is_immutable_and_hidden() {
        let engine = engine();
        let module = engine.create_module("app", "").unwrap();
        let setting = engine.create_setting(module.id, "beta", "").unwrap();
        assert_eq!(
            engine.acquire_active_setting(module.id, "beta").unwrap().id,
            setting.id
        );

        engine.offline(module.id, setting.id).unwrap();
        assert!(matches!(
            engine.acquire_setting(setting.id),
            Err(RolloutError::NotFound(_))
        ));
        assert!(matches!(
            engine.update_setting(
                setting.id,
                SettingUpdate {
                    desc: Some("x".into()),
                    ..Default::default()
                }
            ),
            Err(RolloutError::NotFound(_))
        ));
        // Operators can still see it.
        assert!(engine.get_setting(setting.id).unwrap().is_offline());
    }

    #[test]
    fn rules_allocate_releases() {
        let engine = engine();
        let module = engine.create_module("app", "").unwrap();
        let setting = engine.create_setting(module.id, "beta", "").unwrap();

        let first = engine
            .create_rule(setting.id, PercentRule::user_percent(10))
            .unwrap();
        let second = engine
            .create_rule(setting.id, PercentRule::user_percent(50))
            .unwrap();
        assert_eq!(first.release, 1);
        assert_eq!(second.release, 2);
        assert_eq!(engine.acquire_release(setting.id).unwrap(), 3);

        let rules = engine.list_rules(setting.id).unwrap();
        assert_eq!(
            rules.iter().map(|r| r.rule.value).collect::<Vec<_>>(),
            vec![10, 50]
        );
    }

    #[test]
    fn invalid_rules_rejected() {
        let engine = engine();
        let module = engine.create_module("app", "").unwrap();
        let setting = engine.create_setting(module.id, "beta", "").unwrap();

        assert!(matches!(
            engine.create_rule(setting.id, PercentRule::user_percent(101)),
            Err(RolloutError::Validation(_))
        ));
        let mut other = PercentRule::user_percent(5);
        other.kind = "groupPercent".into();
        assert!(matches!(
            engine.create_rule(setting.id, other),
            Err(RolloutError::Validation(_))
        ));
        assert_eq!(engine.get_setting(setting.id).unwrap().release, 0);
    }

    #[test]
    fn corrupt_rule_payload_lists_as_sentinel() {
        let engine = engine();
        let module = engine.create_module("app", "").unwrap();
        let setting = engine.create_setting(module.id, "beta", "").unwrap();
        engine
            .store
            .create_rule(setting.id, "userPercent", "not json", 1)
            .unwrap();

        let rules = engine.list_rules(setting.id).unwrap();
        assert_eq!(rules[0].rule.value, INVALID_PERCENT);
        assert!(matches!(
            engine.list_rules(999),
            Err(RolloutError::NotFound(_))
        ));
    }

    #[test]
    fn group_kind_checked_on_create() {
        let engine = engine();
        let group = engine.create_group("org", "g1", "team").unwrap();
        assert_eq!(group.kind, "org");
        assert!(matches!(
            engine.create_group("org", "g1", ""),
            Err(RolloutError::Conflict(_))
        ));
    }
}
