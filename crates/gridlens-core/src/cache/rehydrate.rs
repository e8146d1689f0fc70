//! Turns a decoded blob back into analytics fit for the memory tier.

use super::blob::{DecodedBlob, CURRENT_FORMAT_VERSION};
use super::key::CacheKey;
use super::migrate;
use crate::analytics::{EpisodeAnalytics, FootprintReport};
use crate::errors::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub from_version: u32,
    pub migrated: bool,
    /// Fields missing from the artifact; it is served anyway.
    pub drift: Vec<&'static str>,
    pub footprint: FootprintReport,
}

/// Migrates, validates and slims a decoded blob.
///
/// Runtime context is not attached here: producers must not carry it, and
/// consumers attach it once the analytics are restored.
pub fn restore(
    blob: DecodedBlob,
    key: &CacheKey,
) -> Result<(EpisodeAnalytics, LoadReport), StoreError> {
    let DecodedBlob {
        path,
        format_version,
        mut payload,
        ..
    } = blob;

    if format_version > CURRENT_FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            path,
            found: format_version,
            supported: CURRENT_FORMAT_VERSION,
        });
    }

    let migration = migrate::upgrade(&mut payload, format_version)
        .map_err(|reason| StoreError::CorruptArtifact {
            path: path.clone(),
            reason,
        })?;

    let mut analytics: EpisodeAnalytics =
        serde_json::from_value(payload).map_err(|e| StoreError::CorruptArtifact {
            path: path.clone(),
            reason: format!("payload does not match the analytics layout: {e}"),
        })?;

    if analytics.agent != key.agent || analytics.scenario != key.scenario {
        return Err(StoreError::CorruptArtifact {
            path,
            reason: format!(
                "blob holds {}/{} but is stored under {}",
                analytics.agent, analytics.scenario, key
            ),
        });
    }

    let mut drift = migration.underived.clone();
    if analytics.alarms.is_none() && !drift.contains(&"alarms") {
        drift.push("alarms");
    }
    if !drift.is_empty() {
        tracing::warn!(
            event = "gridlens.cache.format_drift",
            key = %key,
            path = %path.display(),
            from_version = format_version,
            missing = ?drift,
            "artifact was written by an older cache format and lacks {:?}; \
             delete the _cache directory and rebuild it with `gridlens warm`",
            drift
        );
    }

    let footprint = analytics.reduce_footprint();

    Ok((
        analytics,
        LoadReport {
            from_version: format_version,
            migrated: migration.migrated(),
            drift,
            footprint,
        },
    ))
}
