//! Percent rollout rule.
//!
//! Wire form: `{"kind": "userPercent", "rule": {"value": 0..=100}}`. Only the
//! inner `rule` object is persisted. Decoding never fails: anything that does
//! not parse or validate comes back with `value = -1`, which callers must read
//! as "no effective rule" and never as a percentage.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The only supported rule kind.
pub const USER_PERCENT: &str = "userPercent";

/// Value carried by a rule that failed to decode.
pub const INVALID_PERCENT: i64 = -1;

/// Inner payload of a percent rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentValue {
    pub value: i64,
}

/// A `userPercent` rollout rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentRule {
    pub kind: String,
    pub rule: PercentValue,
}

impl PercentRule {
    pub fn user_percent(value: i64) -> Self {
        Self {
            kind: USER_PERCENT.to_string(),
            rule: PercentValue { value },
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.kind != USER_PERCENT {
            return Err(ValidationError::RuleKind(self.kind.clone()));
        }
        if !(0..=100).contains(&self.rule.value) {
            return Err(ValidationError::RuleValue(self.rule.value));
        }
        Ok(())
    }

    /// Serialize the inner payload for storage.
    pub fn encode(&self) -> String {
        serde_json::to_string(&self.rule).unwrap_or_default()
    }

    /// Rebuild a rule from its stored kind and payload.
    pub fn decode(kind: &str, rule: &str) -> Self {
        let mut decoded = Self::user_percent(INVALID_PERCENT);
        if kind == USER_PERCENT && !rule.is_empty() {
            if let Ok(value) = serde_json::from_str::<PercentValue>(rule) {
                decoded.rule = value;
            }
            if decoded.validate().is_err() {
                decoded.rule.value = INVALID_PERCENT;
            }
        }
        decoded
    }

    /// True when the rule carries a usable percentage.
    pub fn is_effective(&self) -> bool {
        self.rule.value != INVALID_PERCENT
    }
}

/// Render a stored rule as a JSON object for display. Unknown kinds become `{}`.
pub fn rule_object(kind: &str, rule: &str) -> serde_json::Value {
    match kind {
        USER_PERCENT => serde_json::to_value(PercentRule::decode(kind, rule).rule)
            .unwrap_or_else(|_| serde_json::json!({})),
        _ => serde_json::json!({}),
    }
}
