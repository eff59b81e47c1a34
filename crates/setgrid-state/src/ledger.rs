//! Release ledger — per-setting release generation counter.
//!
//! Allocation reads the counter, increments it, and writes it back inside one
//! redb write transaction. redb admits a single writer at a time, so two
//! concurrent allocations for the same setting always observe each other and
//! return distinct, strictly increasing generations.

use tracing::info;

use crate::error::StateResult;
use crate::store::{StateStore, encode, get_live_setting};
use crate::tables::SETTINGS;
use crate::types::*;

impl StateStore {
    /// Allocate the next release generation of a live setting.
    ///
    /// Fails with `NotFound` if the setting is absent or offline.
    pub fn allocate_release(&self, setting_id: SettingId) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let release;
        {
            let mut settings = txn.open_table(SETTINGS).map_err(map_err!(Table))?;
            let mut setting = get_live_setting(&settings, setting_id)?;
            setting.release += 1;
            setting.updated_at = now_secs();
            release = setting.release;
            let value = encode(&setting)?;
            settings
                .insert(setting_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(setting_id, release, "release allocated");
        Ok(release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn releases_increase_from_one() {
        let store = StateStore::open_in_memory().unwrap();
        let module = store.create_module("app", "").unwrap();
        let setting = store.create_setting(module.id, "beta", "").unwrap();

        assert_eq!(store.allocate_release(setting.id).unwrap(), 1);
        assert_eq!(store.allocate_release(setting.id).unwrap(), 2);
        assert_eq!(store.get_setting(setting.id).unwrap().unwrap().release, 2);
    }

    #[test]
    fn releases_are_per_setting() {
        let store = StateStore::open_in_memory().unwrap();
        let module = store.create_module("app", "").unwrap();
        let a = store.create_setting(module.id, "a1", "").unwrap();
        let b = store.create_setting(module.id, "b1", "").unwrap();

        store.allocate_release(a.id).unwrap();
        store.allocate_release(a.id).unwrap();
        assert_eq!(store.allocate_release(b.id).unwrap(), 1);
    }

    #[test]
    fn missing_or_offline_setting_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let module = store.create_module("app", "").unwrap();
        let setting = store.create_setting(module.id, "beta", "").unwrap();

        assert!(matches!(store.allocate_release(999), Err(StateError::NotFound(_))));

        store.mark_offline(module.id, setting.id).unwrap();
        assert!(matches!(
            store.allocate_release(setting.id),
            Err(StateError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_allocations_are_distinct() {
        let store = StateStore::open_in_memory().unwrap();
        let module = store.create_module("app", "").unwrap();
        let setting = store.create_setting(module.id, "beta", "").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    (0..10)
                        .map(|_| store.allocate_release(setting.id).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for release in handle.join().unwrap() {
                assert!(seen.insert(release), "release {release} allocated twice");
            }
        }
        assert_eq!(seen.len(), 80);
        assert_eq!(store.get_setting(setting.id).unwrap().unwrap().release, 80);
    }
}
