//! StateStore — redb-backed persistence for SetGrid.
//!
//! This file holds the store handle, shared transaction helpers, and the
//! module/setting catalog plus counters. Assignment rows, the release ledger,
//! the subject directory, and rules live in sibling modules as further
//! `impl StateStore` blocks.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use setgrid_core::validate::SettingChange;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    pub(crate) db: Arc<Database>,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Fetch and decode a `u64`-keyed record.
pub(crate) fn get_record<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> StateResult<Option<T>> {
    match table.get(id).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

/// Fetch a setting that exists and is not offline.
pub(crate) fn get_live_setting(
    table: &impl ReadableTable<u64, &'static [u8]>,
    setting_id: SettingId,
) -> StateResult<Setting> {
    match get_record::<Setting>(table, setting_id)? {
        Some(s) if !s.is_offline() => Ok(s),
        Some(_) => Err(StateError::NotFound(format!(
            "setting {setting_id} was offline"
        ))),
        None => Err(StateError::NotFound(format!("setting {setting_id}"))),
    }
}

/// Allocate the next id from a named sequence. Ids start at 1.
pub(crate) fn next_id(txn: &WriteTransaction, sequence: &str) -> StateResult<u64> {
    let mut table = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
    let current = table
        .get(sequence)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next).map_err(map_err!(Write))?;
    Ok(next)
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.open_table(MODULES).map_err(map_err!(Table))?;
        txn.open_table(MODULE_NAMES).map_err(map_err!(Table))?;
        txn.open_table(SETTINGS).map_err(map_err!(Table))?;
        txn.open_table(SETTING_NAMES).map_err(map_err!(Table))?;
        txn.open_table(USERS).map_err(map_err!(Table))?;
        txn.open_table(USER_UIDS).map_err(map_err!(Table))?;
        txn.open_table(GROUPS).map_err(map_err!(Table))?;
        txn.open_table(GROUP_UIDS).map_err(map_err!(Table))?;
        txn.open_table(USER_SETTINGS).map_err(map_err!(Table))?;
        txn.open_table(USER_SETTINGS_BY_SUBJECT).map_err(map_err!(Table))?;
        txn.open_table(USER_SETTINGS_BY_ROW).map_err(map_err!(Table))?;
        txn.open_table(GROUP_SETTINGS).map_err(map_err!(Table))?;
        txn.open_table(GROUP_SETTINGS_BY_SUBJECT).map_err(map_err!(Table))?;
        txn.open_table(GROUP_SETTINGS_BY_ROW).map_err(map_err!(Table))?;
        txn.open_table(SETTING_RULES).map_err(map_err!(Table))?;
        txn.open_table(STATISTICS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Modules ────────────────────────────────────────────────────

    /// Create a module. Names are unique.
    pub fn create_module(&self, name: &str, description: &str) -> StateResult<Module> {
        let now = now_secs();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let module;
        {
            let mut names = txn.open_table(MODULE_NAMES).map_err(map_err!(Table))?;
            if names.get(name).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Conflict(format!("module {name} already exists")));
            }
            let id = next_id(&txn, "module")?;
            module = Module {
                id,
                name: name.to_string(),
                description: description.to_string(),
                status: 0,
                created_at: now,
                updated_at: now,
            };
            let value = encode(&module)?;
            let mut modules = txn.open_table(MODULES).map_err(map_err!(Table))?;
            modules
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            names.insert(name, id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(module_id = module.id, %name, "module created");
        Ok(module)
    }

    pub fn get_module(&self, module_id: ModuleId) -> StateResult<Option<Module>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MODULES).map_err(map_err!(Table))?;
        get_record(&table, module_id)
    }

    // ── Settings ───────────────────────────────────────────────────

    /// Create a setting under a module. Names are unique per module,
    /// offline settings included.
    pub fn create_setting(
        &self,
        module_id: ModuleId,
        name: &str,
        description: &str,
    ) -> StateResult<Setting> {
        let now = now_secs();
        let key = Setting::name_key(module_id, name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let setting;
        {
            let modules = txn.open_table(MODULES).map_err(map_err!(Table))?;
            if get_record::<Module>(&modules, module_id)?.is_none() {
                return Err(StateError::NotFound(format!("module {module_id}")));
            }
            let mut names = txn.open_table(SETTING_NAMES).map_err(map_err!(Table))?;
            if names.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Conflict(format!("setting {name} already exists")));
            }
            let id = next_id(&txn, "setting")?;
            setting = Setting {
                id,
                module_id,
                name: name.to_string(),
                description: description.to_string(),
                channels: Vec::new(),
                clients: Vec::new(),
                values: Vec::new(),
                status: 0,
                release: 0,
                created_at: now,
                updated_at: now,
                offline_at: None,
            };
            let value = encode(&setting)?;
            let mut settings = txn.open_table(SETTINGS).map_err(map_err!(Table))?;
            settings
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            names.insert(key.as_str(), id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(setting_id = setting.id, module_id, %name, "setting created");
        Ok(setting)
    }

    /// Get a setting by id, offline or not.
    pub fn get_setting(&self, setting_id: SettingId) -> StateResult<Option<Setting>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SETTINGS).map_err(map_err!(Table))?;
        get_record(&table, setting_id)
    }

    /// Look a setting up by module and name, offline or not.
    pub fn find_setting_by_name(
        &self,
        module_id: ModuleId,
        name: &str,
    ) -> StateResult<Option<Setting>> {
        let key = Setting::name_key(module_id, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let names = txn.open_table(SETTING_NAMES).map_err(map_err!(Table))?;
        let id = match names.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => guard.value(),
            None => return Ok(None),
        };
        let settings = txn.open_table(SETTINGS).map_err(map_err!(Table))?;
        get_record(&settings, id)
    }

    /// Apply a sparse set of column changes to a live setting.
    pub fn update_setting(
        &self,
        setting_id: SettingId,
        changes: &[SettingChange],
    ) -> StateResult<Setting> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let setting;
        {
            let mut settings = txn.open_table(SETTINGS).map_err(map_err!(Table))?;
            let mut current = get_live_setting(&settings, setting_id)?;
            if !changes.is_empty() {
                for change in changes {
                    match change {
                        SettingChange::Description(d) => current.description = d.clone(),
                        SettingChange::Channels(c) => current.channels = c.clone(),
                        SettingChange::Clients(c) => current.clients = c.clone(),
                        SettingChange::Values(v) => current.values = v.clone(),
                    }
                }
                current.updated_at = now_secs();
                let value = encode(&current)?;
                settings
                    .insert(setting_id, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            setting = current;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(setting_id, changed = changes.len(), "setting updated");
        Ok(setting)
    }

    /// Settings of a module with `id >= cursor`, ascending, at most `limit`,
    /// plus the module's total setting count.
    pub fn list_settings(
        &self,
        module_id: ModuleId,
        cursor: u64,
        limit: usize,
    ) -> StateResult<(Vec<Setting>, u64)> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SETTINGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        let mut total = 0u64;
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let setting: Setting = decode(value.value())?;
            if setting.module_id != module_id {
                continue;
            }
            total += 1;
            if key.value() >= cursor && results.len() < limit {
                results.push(setting);
            }
        }
        Ok((results, total))
    }

    /// Retire a setting: stamp `offline_at` and set status to
    /// [`OFFLINE_STATUS`].
    ///
    /// Returns the updated setting only when this call made the transition;
    /// `None` if the setting is absent, belongs to another module, or was
    /// already offline.
    pub fn mark_offline(
        &self,
        module_id: ModuleId,
        setting_id: SettingId,
    ) -> StateResult<Option<Setting>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut settings = txn.open_table(SETTINGS).map_err(map_err!(Table))?;
            updated = match get_record::<Setting>(&settings, setting_id)? {
                Some(mut s) if s.module_id == module_id && !s.is_offline() => {
                    let now = now_secs();
                    s.offline_at = Some(now);
                    s.status = OFFLINE_STATUS;
                    s.updated_at = now;
                    let value = encode(&s)?;
                    settings
                        .insert(setting_id, value.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(s)
                }
                _ => None,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(setting_id, transitioned = updated.is_some(), "setting offline");
        Ok(updated)
    }

    /// Hard-delete a setting together with its assignment rows and rules.
    pub fn delete_setting(&self, setting_id: SettingId) -> StateResult<Option<Setting>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let deleted: Option<Setting>;
        let mut purged = 0u64;
        {
            let mut settings = txn.open_table(SETTINGS).map_err(map_err!(Table))?;
            deleted = match settings.remove(setting_id).map_err(map_err!(Write))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
        }
        if let Some(setting) = &deleted {
            let key = Setting::name_key(setting.module_id, &setting.name);
            let mut names = txn.open_table(SETTING_NAMES).map_err(map_err!(Table))?;
            names.remove(key.as_str()).map_err(map_err!(Write))?;
            drop(names);
            for kind in [SubjectKind::User, SubjectKind::Group] {
                purged += crate::assignments::purge_rows(&txn, kind, setting_id, None)?;
            }
            crate::rules::purge_rules(&txn, &[setting_id])?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(setting_id, existed = deleted.is_some(), purged, "setting deleted");
        Ok(deleted)
    }

    // ── Counters ───────────────────────────────────────────────────

    /// Add `delta` to a live setting's status. Offline settings keep
    /// [`OFFLINE_STATUS`]. Returns the new status, if applied.
    pub fn adjust_setting_status(
        &self,
        setting_id: SettingId,
        delta: i64,
    ) -> StateResult<Option<i64>> {
        self.write_setting_status(setting_id, |current| current + delta)
    }

    /// Recompute a live setting's status from its assignment rows.
    pub fn refresh_setting_status(&self, setting_id: SettingId) -> StateResult<Option<i64>> {
        let count = self.count_assignments(setting_id)? as i64;
        self.write_setting_status(setting_id, |_| count)
    }

    fn write_setting_status(
        &self,
        setting_id: SettingId,
        f: impl FnOnce(i64) -> i64,
    ) -> StateResult<Option<i64>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let status;
        {
            let mut settings = txn.open_table(SETTINGS).map_err(map_err!(Table))?;
            status = match get_record::<Setting>(&settings, setting_id)? {
                Some(mut s) if !s.is_offline() => {
                    s.status = f(s.status).max(0);
                    let value = encode(&s)?;
                    settings
                        .insert(setting_id, value.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(s.status)
                }
                _ => None,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(status)
    }

    /// Add `delta` to a module's live-setting count.
    pub fn adjust_module_status(&self, module_id: ModuleId, delta: i64) -> StateResult<Option<i64>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let status;
        {
            let mut modules = txn.open_table(MODULES).map_err(map_err!(Table))?;
            status = match get_record::<Module>(&modules, module_id)? {
                Some(mut m) => {
                    m.status = (m.status + delta).max(0);
                    m.updated_at = now_secs();
                    let value = encode(&m)?;
                    modules
                        .insert(module_id, value.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(m.status)
                }
                None => None,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(status)
    }

    /// Add `delta` to a global statistic, creating it at zero if absent.
    pub fn adjust_statistic(&self, key: &str, delta: i64) -> StateResult<i64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let value;
        {
            let mut table = txn.open_table(STATISTICS).map_err(map_err!(Table))?;
            let current = table
                .get(key)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value())
                .unwrap_or(0);
            value = (current + delta).max(0);
            table.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(value)
    }

    pub fn get_statistic(&self, key: &str) -> StateResult<i64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATISTICS).map_err(map_err!(Table))?;
        Ok(table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }

    pub fn list_statistics(&self) -> StateResult<BTreeMap<String, i64>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATISTICS).map_err(map_err!(Table))?;
        let mut results = BTreeMap::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            results.insert(key.value().to_string(), value.value());
        }
        Ok(results)
    }
}
