//! Setting rules — rollout policies attached to a setting.
//!
//! The store keeps the rule kind and its encoded payload as opaque strings;
//! decoding and validation belong to `setgrid_core::rule`.

use redb::{ReadableDatabase, ReadableTable, WriteTransaction};
use tracing::debug;

use crate::error::StateResult;
use crate::store::{StateStore, decode, encode, next_id};
use crate::tables::SETTING_RULES;
use crate::types::*;

/// Delete every rule belonging to the given settings.
pub(crate) fn purge_rules(txn: &WriteTransaction, setting_ids: &[SettingId]) -> StateResult<u64> {
    let mut table = txn.open_table(SETTING_RULES).map_err(map_err!(Table))?;
    let mut doomed = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        let rule: SettingRule = decode(value.value())?;
        if setting_ids.contains(&rule.setting_id) {
            doomed.push(key.value());
        }
    }
    for id in &doomed {
        table.remove(*id).map_err(map_err!(Write))?;
    }
    Ok(doomed.len() as u64)
}

impl StateStore {
    pub fn create_rule(
        &self,
        setting_id: SettingId,
        kind: &str,
        rule: &str,
        release: u64,
    ) -> StateResult<SettingRule> {
        let now = now_secs();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        {
            let id = next_id(&txn, "setting_rule")?;
            record = SettingRule {
                id,
                setting_id,
                kind: kind.to_string(),
                rule: rule.to_string(),
                release,
                created_at: now,
                updated_at: now,
            };
            let value = encode(&record)?;
            let mut table = txn.open_table(SETTING_RULES).map_err(map_err!(Table))?;
            table.insert(id, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(rule_id = record.id, setting_id, %kind, release, "setting rule created");
        Ok(record)
    }

    /// Rules of one setting, oldest first.
    pub fn list_rules(&self, setting_id: SettingId) -> StateResult<Vec<SettingRule>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SETTING_RULES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let rule: SettingRule = decode(value.value())?;
            if rule.setting_id == setting_id {
                results.push(rule);
            }
        }
        Ok(results)
    }

    pub fn delete_rules_for_settings(&self, setting_ids: &[SettingId]) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed = purge_rules(&txn, setting_ids)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(?setting_ids, removed, "setting rules deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_scoped_to_setting() {
        let store = StateStore::open_in_memory().unwrap();
        store.create_rule(1, "userPercent", r#"{"value":10}"#, 1).unwrap();
        store.create_rule(1, "userPercent", r#"{"value":20}"#, 2).unwrap();
        store.create_rule(2, "userPercent", r#"{"value":30}"#, 1).unwrap();

        let rules = store.list_rules(1).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].release, 2);
        assert_eq!(rules[1].rule, r#"{"value":20}"#);
    }

    #[test]
    fn delete_rules_for_settings() {
        let store = StateStore::open_in_memory().unwrap();
        store.create_rule(1, "userPercent", "{}", 1).unwrap();
        store.create_rule(2, "userPercent", "{}", 1).unwrap();

        assert_eq!(store.delete_rules_for_settings(&[1]).unwrap(), 1);
        assert!(store.list_rules(1).unwrap().is_empty());
        assert_eq!(store.list_rules(2).unwrap().len(), 1);
    }
}
