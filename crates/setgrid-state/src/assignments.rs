//! Assignment store — per-user and per-group setting values.
//!
//! A subject has at most one row per setting. Assigning again moves the
//! current value into `last_value` and stamps the new release instead of
//! inserting a second row, so rollback always returns to the value that was
//! live immediately before the latest assignment.

use redb::{ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Deserialize;
use setgrid_core::SettingFilter;
use tracing::debug;

use crate::error::StateResult;
use crate::store::{StateStore, decode, encode, get_live_setting, get_record, next_id};
use crate::tables::{SETTINGS, subject_tables};
use crate::types::*;

/// Upper bound on subjects reported back from one assignment batch.
pub const AFFECTED_SUBJECTS_LIMIT: usize = 1000;

/// The only field read back from a user or group record when resolving uids.
#[derive(Deserialize)]
struct SubjectRef {
    uid: String,
}

/// Delete a setting's rows of one subject kind, optionally only those from
/// one release. Returns the number of rows removed.
pub(crate) fn purge_rows(
    txn: &WriteTransaction,
    kind: SubjectKind,
    setting_id: SettingId,
    release: Option<u64>,
) -> StateResult<u64> {
    let tables = subject_tables(kind);
    let mut rows = txn.open_table(tables.assignments).map_err(map_err!(Table))?;
    let mut doomed = Vec::new();
    for entry in rows
        .range((setting_id, 0)..=(setting_id, u64::MAX))
        .map_err(map_err!(Read))?
    {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let row: Assignment = decode(value.value())?;
        if release.is_some_and(|release| row.release != release) {
            continue;
        }
        doomed.push((row.subject_id, row.id));
    }

    let mut index = txn.open_table(tables.by_subject).map_err(map_err!(Table))?;
    let mut by_row = txn.open_table(tables.by_row).map_err(map_err!(Table))?;
    for (subject_id, row_id) in &doomed {
        rows.remove((setting_id, *subject_id))
            .map_err(map_err!(Write))?;
        index
            .remove((*subject_id, setting_id))
            .map_err(map_err!(Write))?;
        by_row
            .remove((setting_id, *row_id))
            .map_err(map_err!(Write))?;
    }
    Ok(doomed.len() as u64)
}

impl StateStore {
    /// Grant `value` under `release` to every listed subject that exists in
    /// the directory. Unknown uids are skipped. Returns rows created or updated.
    ///
    /// Fails with `NotFound` if the setting is absent or went offline after
    /// the release was allocated; no row is written in that case.
    pub fn batch_assign(
        &self,
        kind: SubjectKind,
        setting_id: SettingId,
        release: u64,
        value: &str,
        uids: &[String],
    ) -> StateResult<u64> {
        let tables = subject_tables(kind);
        let now = now_secs();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut count = 0u64;
        {
            let settings = txn.open_table(SETTINGS).map_err(map_err!(Table))?;
            get_live_setting(&settings, setting_id)?;
            drop(settings);

            let mut subject_ids = Vec::with_capacity(uids.len());
            {
                let directory = txn.open_table(tables.uids).map_err(map_err!(Table))?;
                for uid in uids {
                    if let Some(guard) = directory.get(uid.as_str()).map_err(map_err!(Read))? {
                        subject_ids.push(guard.value());
                    }
                }
            }
            subject_ids.sort_unstable();
            subject_ids.dedup();

            let mut rows = txn.open_table(tables.assignments).map_err(map_err!(Table))?;
            let mut index = txn.open_table(tables.by_subject).map_err(map_err!(Table))?;
            let mut by_row = txn.open_table(tables.by_row).map_err(map_err!(Table))?;
            for subject_id in subject_ids {
                let existing: Option<Assignment> =
                    match rows.get((setting_id, subject_id)).map_err(map_err!(Read))? {
                        Some(guard) => Some(decode(guard.value())?),
                        None => None,
                    };
                let row = match existing {
                    Some(mut row) => {
                        row.last_value = std::mem::replace(&mut row.value, value.to_string());
                        row.release = release;
                        row.updated_at = now;
                        row
                    }
                    None => {
                        let id = next_id(&txn, tables.row_sequence)?;
                        index
                            .insert((subject_id, setting_id), id)
                            .map_err(map_err!(Write))?;
                        by_row
                            .insert((setting_id, id), subject_id)
                            .map_err(map_err!(Write))?;
                        Assignment {
                            id,
                            subject_id,
                            setting_id,
                            value: value.to_string(),
                            last_value: value.to_string(),
                            release,
                            created_at: now,
                            updated_at: now,
                        }
                    }
                };
                let bytes = encode(&row)?;
                rows.insert((setting_id, subject_id), bytes.as_slice())
                    .map_err(map_err!(Write))?;
                count += 1;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, setting_id, release, count, "batch assigned");
        Ok(count)
    }

    /// Uids of subjects whose row for `setting_id` carries `release`,
    /// most recently written first, at most `limit`.
    pub fn list_affected_subjects(
        &self,
        kind: SubjectKind,
        setting_id: SettingId,
        release: u64,
        limit: usize,
    ) -> StateResult<Vec<String>> {
        let tables = subject_tables(kind);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let rows = txn.open_table(tables.assignments).map_err(map_err!(Table))?;
        let mut hits: Vec<(u64, u64, SubjectId)> = Vec::new();
        for entry in rows
            .range((setting_id, 0)..=(setting_id, u64::MAX))
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: Assignment = decode(value.value())?;
            if row.release == release {
                hits.push((row.updated_at, row.id, row.subject_id));
            }
        }
        hits.sort_unstable_by(|a, b| b.cmp(a));
        hits.truncate(limit);

        let records = txn.open_table(tables.records).map_err(map_err!(Table))?;
        let mut uids = Vec::with_capacity(hits.len());
        for (_, _, subject_id) in hits {
            if let Some(subject) = get_record::<SubjectRef>(&records, subject_id)? {
                uids.push(subject.uid);
            }
        }
        Ok(uids)
    }

    pub fn get_assignment(
        &self,
        kind: SubjectKind,
        subject_id: SubjectId,
        setting_id: SettingId,
    ) -> StateResult<Option<Assignment>> {
        let tables = subject_tables(kind);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let rows = txn.open_table(tables.assignments).map_err(map_err!(Table))?;
        match rows.get((setting_id, subject_id)).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Set `value := last_value` on one row. Returns false if there is no row.
    pub fn rollback_assignment(
        &self,
        kind: SubjectKind,
        subject_id: SubjectId,
        setting_id: SettingId,
    ) -> StateResult<bool> {
        let tables = subject_tables(kind);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let found;
        {
            let mut rows = txn.open_table(tables.assignments).map_err(map_err!(Table))?;
            let existing: Option<Assignment> =
                match rows.get((setting_id, subject_id)).map_err(map_err!(Read))? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };
            found = existing.is_some();
            if let Some(mut row) = existing {
                row.value = row.last_value.clone();
                row.updated_at = now_secs();
                let bytes = encode(&row)?;
                rows.insert((setting_id, subject_id), bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, subject_id, setting_id, found, "assignment rolled back");
        Ok(found)
    }

    /// Delete one row. Returns false if there was none.
    pub fn remove_assignment(
        &self,
        kind: SubjectKind,
        subject_id: SubjectId,
        setting_id: SettingId,
    ) -> StateResult<bool> {
        let tables = subject_tables(kind);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut rows = txn.open_table(tables.assignments).map_err(map_err!(Table))?;
            let removed: Option<Assignment> =
                match rows.remove((setting_id, subject_id)).map_err(map_err!(Write))? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };
            existed = removed.is_some();
            if let Some(row) = removed {
                let mut index = txn.open_table(tables.by_subject).map_err(map_err!(Table))?;
                index
                    .remove((subject_id, setting_id))
                    .map_err(map_err!(Write))?;
                let mut by_row = txn.open_table(tables.by_row).map_err(map_err!(Table))?;
                by_row
                    .remove((setting_id, row.id))
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%kind, subject_id, setting_id, existed, "assignment removed");
        Ok(existed)
    }

    /// Delete every user and group row of `setting_id` written by `release`.
    pub fn recall_release(&self, setting_id: SettingId, release: u64) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut removed = 0u64;
        for kind in [SubjectKind::Group, SubjectKind::User] {
            removed += purge_rows(&txn, kind, setting_id, Some(release))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(setting_id, release, removed, "release recalled");
        Ok(removed)
    }

    /// Delete every user and group row of the given settings.
    pub fn purge_settings(&self, setting_ids: &[SettingId]) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut removed = 0u64;
        for &setting_id in setting_ids {
            for kind in [SubjectKind::User, SubjectKind::Group] {
                removed += purge_rows(&txn, kind, setting_id, None)?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(?setting_ids, removed, "assignments purged");
        Ok(removed)
    }

    /// Number of user plus group rows for a setting.
    pub fn count_assignments(&self, setting_id: SettingId) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let mut count = 0u64;
        for kind in [SubjectKind::User, SubjectKind::Group] {
            let rows = txn
                .open_table(subject_tables(kind).assignments)
                .map_err(map_err!(Table))?;
            for entry in rows
                .range((setting_id, 0)..=(setting_id, u64::MAX))
                .map_err(map_err!(Read))?
            {
                entry.map_err(map_err!(Read))?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Rows of one setting with row id `>= cursor`, ascending, at most
    /// `limit`, plus the setting's total row count for `kind`.
    pub fn list_setting_assignments(
        &self,
        kind: SubjectKind,
        setting_id: SettingId,
        cursor: u64,
        limit: usize,
    ) -> StateResult<(Vec<SettingAssignment>, u64)> {
        let tables = subject_tables(kind);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let by_row = txn.open_table(tables.by_row).map_err(map_err!(Table))?;
        let rows = txn.open_table(tables.assignments).map_err(map_err!(Table))?;
        let records = txn.open_table(tables.records).map_err(map_err!(Table))?;

        let mut total = 0u64;
        for entry in by_row
            .range((setting_id, 0)..=(setting_id, u64::MAX))
            .map_err(map_err!(Read))?
        {
            entry.map_err(map_err!(Read))?;
            total += 1;
        }

        let mut results = Vec::new();
        for entry in by_row
            .range((setting_id, cursor)..=(setting_id, u64::MAX))
            .map_err(map_err!(Read))?
        {
            if results.len() >= limit {
                break;
            }
            let (_, subject_id) = entry.map_err(map_err!(Read))?;
            let subject_id = subject_id.value();
            let row: Assignment = match rows.get((setting_id, subject_id)).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => continue,
            };
            let uid = get_record::<SubjectRef>(&records, subject_id)?
                .map(|s| s.uid)
                .unwrap_or_default();
            results.push(SettingAssignment {
                id: row.id,
                uid,
                value: row.value,
                last_value: row.last_value,
                release: row.release,
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }
        Ok((results, total))
    }

    /// A subject's rows for live settings accepted by `filter`, with row id
    /// `>= cursor`, ascending, at most `limit`, plus the total match count.
    pub fn list_subject_settings(
        &self,
        kind: SubjectKind,
        subject_id: SubjectId,
        filter: &SettingFilter,
        cursor: u64,
        limit: usize,
    ) -> StateResult<(Vec<SubjectSetting>, u64)> {
        let tables = subject_tables(kind);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(tables.by_subject).map_err(map_err!(Table))?;
        let rows = txn.open_table(tables.assignments).map_err(map_err!(Table))?;
        let settings = txn.open_table(SETTINGS).map_err(map_err!(Table))?;

        let mut matched = Vec::new();
        let mut total = 0u64;
        for entry in index
            .range((subject_id, 0)..=(subject_id, u64::MAX))
            .map_err(map_err!(Read))?
        {
            let (key, row_id) = entry.map_err(map_err!(Read))?;
            let (_, setting_id) = key.value();
            let setting = match get_record::<Setting>(&settings, setting_id)? {
                Some(s) if !s.is_offline() => s,
                _ => continue,
            };
            if !filter.matches(setting.module_id, setting.id, &setting.channels, &setting.clients) {
                continue;
            }
            total += 1;
            if row_id.value() < cursor {
                continue;
            }
            let row: Assignment = match rows.get((setting_id, subject_id)).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => continue,
            };
            matched.push(SubjectSetting {
                id: row.id,
                setting_id,
                module_id: setting.module_id,
                name: setting.name,
                value: row.value,
                last_value: row.last_value,
                release: row.release,
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }
        matched.sort_unstable_by_key(|s| s.id);
        matched.truncate(limit);
        Ok((matched, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use setgrid_core::validate::SettingChange;

    fn uids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn setup() -> (StateStore, Setting) {
        let store = StateStore::open_in_memory().unwrap();
        let module = store.create_module("app", "").unwrap();
        let setting = store.create_setting(module.id, "beta", "").unwrap();
        store.ensure_users(&uids(&["u1", "u2", "u3"])).unwrap();
        (store, setting)
    }

    fn user_row(store: &StateStore, uid: &str, setting_id: SettingId) -> Option<Assignment> {
        let id = store.resolve_user_id(uid).unwrap().unwrap();
        store
            .get_assignment(SubjectKind::User, id, setting_id)
            .unwrap()
    }

    #[test]
    fn first_assign_creates_rows() {
        let (store, setting) = setup();
        let count = store
            .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1", "u2"]))
            .unwrap();
        assert_eq!(count, 2);

        let row = user_row(&store, "u1", setting.id).unwrap();
        assert_eq!(row.value, "on");
        assert_eq!(row.last_value, "on");
        assert_eq!(row.release, 1);
    }

    #[test]
    fn unknown_and_duplicate_uids_skipped() {
        let (store, setting) = setup();
        let count = store
            .batch_assign(
                SubjectKind::User,
                setting.id,
                1,
                "on",
                &uids(&["u1", "ghost", "u1"]),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert!(store.resolve_user_id("ghost").unwrap().is_none());
    }

    #[test]
    fn reassign_shifts_last_value_and_keeps_row_id() {
        let (store, setting) = setup();
        store
            .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1"]))
            .unwrap();
        let first = user_row(&store, "u1", setting.id).unwrap();

        store
            .batch_assign(SubjectKind::User, setting.id, 2, "off", &uids(&["u1"]))
            .unwrap();
        let second = user_row(&store, "u1", setting.id).unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.value, "off");
        assert_eq!(second.last_value, "on");
        assert_eq!(second.release, 2);
        assert_eq!(store.count_assignments(setting.id).unwrap(), 1);
    }

    #[test]
    fn rollback_restores_previous_value() {
        let (store, setting) = setup();
        let u1 = store.resolve_user_id("u1").unwrap().unwrap();
        store
            .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1"]))
            .unwrap();
        store
            .batch_assign(SubjectKind::User, setting.id, 2, "off", &uids(&["u1"]))
            .unwrap();

        assert!(store.rollback_assignment(SubjectKind::User, u1, setting.id).unwrap());
        assert_eq!(user_row(&store, "u1", setting.id).unwrap().value, "on");
    }

    #[test]
    fn rollback_without_row_is_noop() {
        let (store, setting) = setup();
        let u1 = store.resolve_user_id("u1").unwrap().unwrap();
        assert!(!store.rollback_assignment(SubjectKind::User, u1, setting.id).unwrap());
        assert!(user_row(&store, "u1", setting.id).is_none());
    }

    #[test]
    fn affected_subjects_filtered_by_release() {
        let (store, setting) = setup();
        store
            .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1", "u2"]))
            .unwrap();
        store
            .batch_assign(SubjectKind::User, setting.id, 2, "off", &uids(&["u3"]))
            .unwrap();

        let mut first = store
            .list_affected_subjects(SubjectKind::User, setting.id, 1, AFFECTED_SUBJECTS_LIMIT)
            .unwrap();
        first.sort();
        assert_eq!(first, uids(&["u1", "u2"]));

        let second = store
            .list_affected_subjects(SubjectKind::User, setting.id, 2, AFFECTED_SUBJECTS_LIMIT)
            .unwrap();
        assert_eq!(second, uids(&["u3"]));

        let limited = store
            .list_affected_subjects(SubjectKind::User, setting.id, 1, 1)
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn recall_removes_only_that_release() {
        let (store, setting) = setup();
        store.create_group("org", "g1", "").unwrap();
        store
            .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1"]))
            .unwrap();
        store
            .batch_assign(SubjectKind::Group, setting.id, 1, "on", &uids(&["g1"]))
            .unwrap();
        store
            .batch_assign(SubjectKind::User, setting.id, 2, "on", &uids(&["u2"]))
            .unwrap();

        assert_eq!(store.recall_release(setting.id, 1).unwrap(), 2);
        assert!(user_row(&store, "u1", setting.id).is_none());
        assert_eq!(user_row(&store, "u2", setting.id).unwrap().release, 2);
        assert_eq!(store.count_assignments(setting.id).unwrap(), 1);

        // Idempotent.
        assert_eq!(store.recall_release(setting.id, 1).unwrap(), 0);
    }

    #[test]
    fn remove_deletes_row_and_index() {
        let (store, setting) = setup();
        let u1 = store.resolve_user_id("u1").unwrap().unwrap();
        store
            .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1"]))
            .unwrap();

        assert!(store.remove_assignment(SubjectKind::User, u1, setting.id).unwrap());
        assert!(!store.remove_assignment(SubjectKind::User, u1, setting.id).unwrap());
        let (rows, total) = store
            .list_subject_settings(SubjectKind::User, u1, &SettingFilter::default(), 0, 10)
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn purge_clears_both_kinds() {
        let (store, setting) = setup();
        store.create_group("org", "g1", "").unwrap();
        store
            .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1", "u2"]))
            .unwrap();
        store
            .batch_assign(SubjectKind::Group, setting.id, 1, "on", &uids(&["g1"]))
            .unwrap();

        assert_eq!(store.purge_settings(&[setting.id]).unwrap(), 3);
        assert_eq!(store.count_assignments(setting.id).unwrap(), 0);
    }

    #[test]
    fn setting_assignments_paginate_by_row_id() {
        let (store, setting) = setup();
        store
            .batch_assign(
                SubjectKind::User,
                setting.id,
                1,
                "on",
                &uids(&["u1", "u2", "u3"]),
            )
            .unwrap();

        let (page, total) = store
            .list_setting_assignments(SubjectKind::User, setting.id, 0, 2)
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert!(page[0].id < page[1].id);

        let (rest, _) = store
            .list_setting_assignments(SubjectKind::User, setting.id, page[1].id + 1, 2)
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].uid, "u3");
    }

    #[test]
    fn subject_settings_hide_offline() {
        let store = StateStore::open_in_memory().unwrap();
        let module = store.create_module("app", "").unwrap();
        let live = store.create_setting(module.id, "live", "").unwrap();
        let retired = store.create_setting(module.id, "retired", "").unwrap();
        store.ensure_users(&uids(&["u1"])).unwrap();
        let u1 = store.resolve_user_id("u1").unwrap().unwrap();

        for setting in [&live, &retired] {
            store
                .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1"]))
                .unwrap();
        }
        store.mark_offline(module.id, retired.id).unwrap();

        let (rows, total) = store
            .list_subject_settings(SubjectKind::User, u1, &SettingFilter::default(), 0, 10)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].name, "live");
        assert_eq!(rows[0].value, "on");
    }

    #[test]
    fn delete_setting_cascades() {
        let (store, setting) = setup();
        store
            .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1"]))
            .unwrap();
        store.delete_setting(setting.id).unwrap();
        assert_eq!(store.count_assignments(setting.id).unwrap(), 0);

        let u1 = store.resolve_user_id("u1").unwrap().unwrap();
        let (rows, _) = store
            .list_subject_settings(SubjectKind::User, u1, &SettingFilter::default(), 0, 10)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn assign_after_offline_writes_nothing() {
        let (store, setting) = setup();
        let release = store.allocate_release(setting.id).unwrap();
        store.mark_offline(setting.module_id, setting.id).unwrap();
        store.purge_settings(&[setting.id]).unwrap();

        let err = store
            .batch_assign(SubjectKind::User, setting.id, release, "on", &uids(&["u1"]))
            .unwrap_err();
        assert!(matches!(err, crate::error::StateError::NotFound(_)));
        assert_eq!(store.count_assignments(setting.id).unwrap(), 0);

        assert!(matches!(
            store.batch_assign(SubjectKind::Group, 999, 1, "on", &uids(&["g1"])),
            Err(crate::error::StateError::NotFound(_))
        ));
    }

    #[test]
    fn setting_pages_skip_removed_and_recalled_rows() {
        let (store, setting) = setup();
        let u2 = store.resolve_user_id("u2").unwrap().unwrap();
        store
            .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1", "u2"]))
            .unwrap();
        store
            .batch_assign(SubjectKind::User, setting.id, 2, "on", &uids(&["u3"]))
            .unwrap();

        store.remove_assignment(SubjectKind::User, u2, setting.id).unwrap();
        let (page, total) = store
            .list_setting_assignments(SubjectKind::User, setting.id, 0, 10)
            .unwrap();
        assert_eq!(total, 2);
        let seen: Vec<&str> = page.iter().map(|row| row.uid.as_str()).collect();
        assert_eq!(seen, vec!["u1", "u3"]);

        store.recall_release(setting.id, 2).unwrap();
        let (page, total) = store
            .list_setting_assignments(SubjectKind::User, setting.id, 0, 10)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].uid, "u1");

        // A re-created row gets a fresh row id at the end of the order.
        store
            .batch_assign(SubjectKind::User, setting.id, 3, "off", &uids(&["u2"]))
            .unwrap();
        let (page, _) = store
            .list_setting_assignments(SubjectKind::User, setting.id, page[0].id + 1, 10)
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].uid, "u2");
        assert_eq!(page[0].value, "off");
    }

    #[test]
    fn subject_settings_apply_filter() {
        let store = StateStore::open_in_memory().unwrap();
        let module = store.create_module("app", "").unwrap();
        let tagged = store.create_setting(module.id, "tagged", "").unwrap();
        let plain = store.create_setting(module.id, "plain", "").unwrap();
        store
            .update_setting(
                tagged.id,
                &[SettingChange::Channels(vec!["beta".to_string()])],
            )
            .unwrap();
        store.ensure_users(&uids(&["u1"])).unwrap();
        let u1 = store.resolve_user_id("u1").unwrap().unwrap();
        for setting in [&tagged, &plain] {
            store
                .batch_assign(SubjectKind::User, setting.id, 1, "on", &uids(&["u1"]))
                .unwrap();
        }

        let filter = SettingFilter {
            channel: Some("beta".to_string()),
            ..Default::default()
        };
        let (rows, total) = store
            .list_subject_settings(SubjectKind::User, u1, &filter, 0, 10)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].name, "tagged");

        let filter = SettingFilter {
            setting_id: Some(plain.id),
            ..Default::default()
        };
        let (rows, _) = store
            .list_subject_settings(SubjectKind::User, u1, &filter, 0, 10)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "plain");
    }
}
