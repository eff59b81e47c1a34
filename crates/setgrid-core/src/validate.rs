//! Request validation for settings.
//!
//! Lists (channels, clients, values) are stored in canonical form: sorted,
//! no duplicates, no empty entries. Validation sorts them in place and
//! rejects anything that cannot be made canonical.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MAX_DESC_LEN: usize = 1022;
pub const MAX_CHANNELS: usize = 5;
pub const MAX_CLIENTS: usize = 10;
pub const MAX_VALUES: usize = 10;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z][0-9A-Za-z._-]{1,62}$").expect("name pattern"));

static UID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z][0-9A-Za-z._:@-]{1,62}$").expect("uid pattern"));

static VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z][0-9A-Za-z._-]{0,254}$").expect("value pattern"));

/// Check a module or setting name.
pub fn check_name(field: &'static str, name: &str) -> Result<(), ValidationError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::Invalid {
            field,
            value: name.to_string(),
        })
    }
}

/// Check a user or group uid.
pub fn check_uid(field: &'static str, uid: &str) -> Result<(), ValidationError> {
    if UID_RE.is_match(uid) {
        Ok(())
    } else {
        Err(ValidationError::Invalid {
            field,
            value: uid.to_string(),
        })
    }
}

/// Check a single setting value.
pub fn check_value(value: &str) -> Result<(), ValidationError> {
    if VALUE_RE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::Invalid {
            field: "value",
            value: value.to_string(),
        })
    }
}

pub fn check_desc(desc: &str) -> Result<(), ValidationError> {
    if desc.len() > MAX_DESC_LEN {
        return Err(ValidationError::TooLong {
            field: "desc",
            len: desc.len(),
        });
    }
    Ok(())
}

/// Sort `list` in place; false if it holds an empty or duplicate entry.
pub fn sort_and_check(list: &mut [String]) -> bool {
    list.sort();
    for (i, item) in list.iter().enumerate() {
        if item.is_empty() {
            return false;
        }
        if i > 0 && list[i - 1] == *item {
            return false;
        }
    }
    true
}

fn check_list(
    field: &'static str,
    list: &mut [String],
    max: usize,
    allowed: Option<&[String]>,
) -> Result<(), ValidationError> {
    if list.len() > max {
        return Err(ValidationError::TooMany {
            field,
            count: list.len(),
            max,
        });
    }
    if !sort_and_check(list) {
        return Err(ValidationError::Invalid {
            field,
            value: format!("{list:?}"),
        });
    }
    for item in list.iter() {
        let ok = match allowed {
            Some(allowed) => allowed.iter().any(|a| a == item),
            None => check_value(item).is_ok(),
        };
        if !ok {
            return Err(ValidationError::Invalid {
                field,
                value: item.clone(),
            });
        }
    }
    Ok(())
}

/// One changed column of a setting, produced from a validated [`SettingUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum SettingChange {
    Description(String),
    Channels(Vec<String>),
    Clients(Vec<String>),
    Values(Vec<String>),
}

/// Partial update body: absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingUpdate {
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub channels: Option<Vec<String>>,
    #[serde(default)]
    pub clients: Option<Vec<String>>,
    #[serde(default)]
    pub values: Option<Vec<String>>,
}

impl SettingUpdate {
    /// Validate against the configured allow-lists, canonicalising lists in place.
    pub fn validate(
        &mut self,
        allowed_channels: &[String],
        allowed_clients: &[String],
    ) -> Result<(), ValidationError> {
        if self.desc.is_none()
            && self.channels.is_none()
            && self.clients.is_none()
            && self.values.is_none()
        {
            return Err(ValidationError::EmptyUpdate);
        }
        if let Some(desc) = &self.desc {
            check_desc(desc)?;
        }
        if let Some(channels) = self.channels.as_mut() {
            check_list("channels", channels, MAX_CHANNELS, Some(allowed_channels))?;
        }
        if let Some(clients) = self.clients.as_mut() {
            check_list("clients", clients, MAX_CLIENTS, Some(allowed_clients))?;
        }
        if let Some(values) = self.values.as_mut() {
            check_list("values", values, MAX_VALUES, None)?;
        }
        Ok(())
    }

    /// Sparse list of the fields the caller supplied.
    pub fn into_changes(self) -> Vec<SettingChange> {
        let mut changes = Vec::new();
        if let Some(desc) = self.desc {
            changes.push(SettingChange::Description(desc));
        }
        if let Some(channels) = self.channels {
            changes.push(SettingChange::Channels(channels));
        }
        if let Some(clients) = self.clients {
            changes.push(SettingChange::Clients(clients));
        }
        if let Some(values) = self.values {
            changes.push(SettingChange::Values(values));
        }
        changes
    }
}

/// Optional narrowing of a subject's setting list. Empty strings count as
/// absent, so `?channel=` means no channel filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingFilter {
    #[serde(default)]
    pub module_id: Option<u64>,
    #[serde(default)]
    pub setting_id: Option<u64>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
}

impl SettingFilter {
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref().filter(|c| !c.is_empty())
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref().filter(|c| !c.is_empty())
    }

    /// Reject a channel or client outside the configured allow-lists.
    pub fn validate(
        &self,
        allowed_channels: &[String],
        allowed_clients: &[String],
    ) -> Result<(), ValidationError> {
        if let Some(channel) = self.channel() {
            if !allowed_channels.iter().any(|a| a == channel) {
                return Err(ValidationError::Invalid {
                    field: "channel",
                    value: channel.to_string(),
                });
            }
        }
        if let Some(client) = self.client() {
            if !allowed_clients.iter().any(|a| a == client) {
                return Err(ValidationError::Invalid {
                    field: "client",
                    value: client.to_string(),
                });
            }
        }
        Ok(())
    }

    /// True when a setting with these attributes passes every given filter.
    /// A channel or client filter matches only settings that list it.
    pub fn matches(
        &self,
        module_id: u64,
        setting_id: u64,
        channels: &[String],
        clients: &[String],
    ) -> bool {
        self.module_id.is_none_or(|id| id == module_id)
            && self.setting_id.is_none_or(|id| id == setting_id)
            && self.channel().is_none_or(|c| channels.iter().any(|x| x == c))
            && self.client().is_none_or(|c| clients.iter().any(|x| x == c))
    }
}
