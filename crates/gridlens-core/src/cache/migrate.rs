//! Registered upgrades of stored payloads between format versions.

use super::blob::CURRENT_FORMAT_VERSION;
use serde_json::{Map, Value};

type Payload = Map<String, Value>;

/// One step from `from` to `from + 1`. Returns the fields the step could not
/// reconstruct from what the older payload holds.
pub struct Migration {
    pub from: u32,
    pub description: &'static str,
    pub apply: fn(&mut Payload) -> Vec<&'static str>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        from: 1,
        description: "derive cumulative_rewards from rewards",
        apply: derive_cumulative_rewards,
    },
    Migration {
        from: 2,
        description: "introduce alarms (not recoverable from older payloads)",
        apply: mark_alarms_unknown,
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    /// Fields that stay missing after migration.
    pub underived: Vec<&'static str>,
}

impl MigrationReport {
    pub fn migrated(&self) -> bool {
        self.from != self.to
    }
}

/// Upgrades `payload` in place from version `from` to
/// [`CURRENT_FORMAT_VERSION`].
pub fn upgrade(payload: &mut Value, from: u32) -> Result<MigrationReport, String> {
    if from == 0 || from > CURRENT_FORMAT_VERSION {
        return Err(format!(
            "cannot migrate from format version {from} (known: 1..={CURRENT_FORMAT_VERSION})"
        ));
    }
    let obj = payload
        .as_object_mut()
        .ok_or_else(|| "payload is not a JSON object".to_string())?;

    let mut report = MigrationReport {
        from,
        to: from,
        underived: Vec::new(),
    };
    while report.to < CURRENT_FORMAT_VERSION {
        let step = MIGRATIONS
            .iter()
            .find(|m| m.from == report.to)
            .ok_or_else(|| format!("no migration registered from format version {}", report.to))?;
        tracing::debug!(
            event = "gridlens.cache.migrate_step",
            from = step.from,
            to = step.from + 1,
            "{}",
            step.description
        );
        report.underived.extend((step.apply)(obj));
        report.to += 1;
    }
    Ok(report)
}

fn derive_cumulative_rewards(payload: &mut Payload) -> Vec<&'static str> {
    let rewards: Option<Vec<f64>> = payload
        .get("rewards")
        .and_then(Value::as_array)
        .and_then(|arr| arr.iter().map(Value::as_f64).collect());

    match rewards {
        Some(rewards) => {
            let cumulative = crate::analytics::builder::running_sum(&rewards);
            payload.insert("cumulative_rewards".into(), serde_json::json!(cumulative));
            vec![]
        }
        None => vec!["cumulative_rewards"],
    }
}

fn mark_alarms_unknown(payload: &mut Payload) -> Vec<&'static str> {
    if payload.get("alarms").is_some_and(|v| !v.is_null()) {
        return vec![];
    }
    payload.insert("alarms".into(), Value::Null);
    vec!["alarms"]
}
