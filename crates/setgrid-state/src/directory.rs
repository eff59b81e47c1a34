//! Subject directory — users and groups that settings can be assigned to.

use redb::{ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::{StateStore, encode, get_record, next_id};
use crate::tables::{GROUP_UIDS, GROUPS, USER_UIDS, USERS, subject_tables};
use crate::types::*;

impl StateStore {
    /// Create any users in `uids` that don't exist yet. Returns how many were
    /// created.
    pub fn ensure_users(&self, uids: &[String]) -> StateResult<u64> {
        let now = now_secs();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut created = 0u64;
        {
            let mut index = txn.open_table(USER_UIDS).map_err(map_err!(Table))?;
            let mut users = txn.open_table(USERS).map_err(map_err!(Table))?;
            for uid in uids {
                if index.get(uid.as_str()).map_err(map_err!(Read))?.is_some() {
                    continue;
                }
                let id = next_id(&txn, "user")?;
                let user = User {
                    id,
                    uid: uid.clone(),
                    created_at: now,
                };
                let value = encode(&user)?;
                users.insert(id, value.as_slice()).map_err(map_err!(Write))?;
                index.insert(uid.as_str(), id).map_err(map_err!(Write))?;
                created += 1;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(requested = uids.len(), created, "users ensured");
        Ok(created)
    }

    /// Create a group. Group uids are unique across kinds.
    pub fn create_group(&self, kind: &str, uid: &str, description: &str) -> StateResult<Group> {
        let now = now_secs();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let group;
        {
            let mut index = txn.open_table(GROUP_UIDS).map_err(map_err!(Table))?;
            if index.get(uid).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Conflict(format!("group {uid} already exists")));
            }
            let id = next_id(&txn, "group")?;
            group = Group {
                id,
                kind: kind.to_string(),
                uid: uid.to_string(),
                description: description.to_string(),
                created_at: now,
            };
            let value = encode(&group)?;
            let mut groups = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            groups.insert(id, value.as_slice()).map_err(map_err!(Write))?;
            index.insert(uid, id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(group_id = group.id, %kind, %uid, "group created");
        Ok(group)
    }

    /// Internal id of a user or group, by uid alone.
    pub fn resolve_subject(&self, kind: SubjectKind, uid: &str) -> StateResult<Option<SubjectId>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn
            .open_table(subject_tables(kind).uids)
            .map_err(map_err!(Table))?;
        Ok(index
            .get(uid)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value()))
    }

    pub fn resolve_user_id(&self, uid: &str) -> StateResult<Option<SubjectId>> {
        self.resolve_subject(SubjectKind::User, uid)
    }

    /// Internal id of a group, only if its kind matches.
    pub fn resolve_group_id(&self, kind: &str, uid: &str) -> StateResult<Option<SubjectId>> {
        let Some(id) = self.resolve_subject(SubjectKind::Group, uid)? else {
            return Ok(None);
        };
        Ok(self
            .get_group(id)?
            .filter(|group| group.kind == kind)
            .map(|group| group.id))
    }

    pub fn get_user(&self, user_id: SubjectId) -> StateResult<Option<User>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(USERS).map_err(map_err!(Table))?;
        get_record(&table, user_id)
    }

    pub fn get_group(&self, group_id: SubjectId) -> StateResult<Option<Group>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
        get_record(&table, group_id)
    }
}
