mod common;

use common::{agents_tree, builder, cache_dir};
use gridlens_core::cache::blob::{self, CURRENT_FORMAT_VERSION};
use gridlens_core::cache::CacheKey;
use gridlens_core::errors::StoreError;
use serde_json::json;
use tempfile::tempdir;

/// Bare payload as written before envelopes, cumulative rewards and alarms.
fn first_generation_payload(agent: &str, scenario: &str) -> serde_json::Value {
    json!({
        "agent": agent,
        "scenario": scenario,
        "timestamps": ["2019-01-06T00:00:00", "2019-01-06T00:05:00"],
        "rewards": [1.5, 2.0],
        "actions": [{"timestep": 1, "subs_modified": ["sub_4"], "lines_modified": []}],
        "flows": {"0_4_2": [0.5, 1.1]},
        "loads": {},
        "productions": {},
        "kpis": {
            "steps_played": 2,
            "steps_available": 5,
            "total_reward": 3.5,
            "action_count": 1,
            "overflow_count": 1
        }
    })
}

#[test]
fn legacy_blob_loads_with_drift_and_is_rewritten() -> anyhow::Result<()> {
    let dir = tempdir()?;
    agents_tree(dir.path(), 1);
    let key = CacheKey::new("a0", "000");
    let root = cache_dir(dir.path());
    let legacy = key.legacy_blob_path(&root);
    std::fs::create_dir_all(legacy.parent().unwrap())?;
    std::fs::write(&legacy, first_generation_payload("a0", "000").to_string())?;

    let store = builder(dir.path()).build();
    let artifact = store.get(&key)?;

    assert_eq!(artifact.analytics.rewards, vec![1.5, 2.0]);
    assert_eq!(artifact.analytics.cumulative_rewards, vec![1.5, 3.5]);
    assert!(artifact.analytics.alarms.is_none());
    assert!(artifact.analytics.alarm_count().is_none());
    assert_eq!(store.stats().builds, 0);
    assert_eq!(store.stats().migrations, 1);

    assert!(!legacy.exists());
    let upgraded = blob::read(&root, &key)?.expect("rewritten blob");
    assert_eq!(upgraded.format_version, CURRENT_FORMAT_VERSION);
    assert!(!upgraded.legacy_location);
    Ok(())
}

#[test]
fn legacy_location_wins_over_compressed_blob() -> anyhow::Result<()> {
    let dir = tempdir()?;
    agents_tree(dir.path(), 1);
    let key = CacheKey::new("a0", "001");
    let stores = builder(dir.path());
    stores.producer().ensure_persisted(&key)?;

    let root = cache_dir(dir.path());
    std::fs::write(
        key.legacy_blob_path(&root),
        first_generation_payload("a0", "001").to_string(),
    )?;

    let artifact = stores.build().get(&key)?;
    assert_eq!(artifact.analytics.n_steps(), 2);
    Ok(())
}

#[test]
fn newer_format_is_rejected() -> anyhow::Result<()> {
    let dir = tempdir()?;
    agents_tree(dir.path(), 1);
    let key = CacheKey::new("a0", "000");
    let root = cache_dir(dir.path());
    let payload = first_generation_payload("a0", "000");
    let envelope = json!({
        "format_version": CURRENT_FORMAT_VERSION + 1,
        "agent": "a0",
        "scenario": "000",
        "created_at": "2026-01-01T00:00:00Z",
        "payload_sha256": blob::payload_sha256(&payload.to_string()),
        "payload": payload,
    });
    let path = key.blob_path(&root);
    std::fs::create_dir_all(path.parent().unwrap())?;
    std::fs::write(&path, zstd::encode_all(envelope.to_string().as_bytes(), 3)?)?;

    let err = builder(dir.path()).build().get(&key).unwrap_err();
    assert!(
        matches!(err, StoreError::UnsupportedVersion { found, .. } if found == CURRENT_FORMAT_VERSION + 1)
    );
    Ok(())
}

#[test]
fn blob_stored_under_the_wrong_key_is_corrupt() -> anyhow::Result<()> {
    let dir = tempdir()?;
    agents_tree(dir.path(), 1);
    let key = CacheKey::new("a0", "000");
    let legacy = key.legacy_blob_path(&cache_dir(dir.path()));
    std::fs::create_dir_all(legacy.parent().unwrap())?;
    std::fs::write(&legacy, first_generation_payload("someone_else", "000").to_string())?;

    let err = builder(dir.path()).build().get(&key).unwrap_err();
    assert!(matches!(err, StoreError::CorruptArtifact { .. }));
    Ok(())
}
