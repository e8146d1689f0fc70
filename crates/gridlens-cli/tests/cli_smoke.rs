use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_episode(root: &Path, agent: &str, scenario: &str, played: u64, reward: f64) {
    let dir = root.join(agent).join(scenario);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("episode_meta.json"),
        format!(
            r#"{{"nb_timestep_played": {played}, "chronics_max_timestep": 4, "cumulative_reward": {reward}}}"#
        ),
    )
    .unwrap();
    let mut steps = String::new();
    for t in 0..played {
        steps.push_str(&format!(
            r#"{{"timestamp": "2019-01-06T00:{:02}:00", "reward": 1.0, "rho": {{"0_4_2": {}}}, "action": {{"subs_modified": ["sub_{}"]}}}}"#,
            t * 5,
            0.6 + 0.3 * t as f64,
            t
        ));
        steps.push('\n');
    }
    fs::write(dir.join("steps.jsonl"), steps).unwrap();
}

fn write_spaces(dir: &Path) {
    let space = r#"{"name_line": ["0_4_2"], "name_sub": ["sub_0", "sub_1", "sub_2"]}"#;
    fs::write(dir.join("dict_observation_space.json"), space).unwrap();
    fs::write(dir.join("dict_action_space.json"), space).unwrap();
}

/// Two agents on scenario 000, one of them also on 001.
fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let agents = dir.path().join("agents");
    write_episode(&agents, "greedy", "000", 3, 3.0);
    write_episode(&agents, "greedy", "001", 4, 4.0);
    write_episode(&agents, "donothing", "000", 3, 5.0);
    write_spaces(&agents.join("greedy"));
    write_spaces(&agents.join("donothing"));
    dir
}

fn gridlens(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gridlens").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("GRIDLENS_CONFIG")
        .env_remove("GRIDLENS_AGENTS_DIR")
        .env_remove("GRIDLENS_WORKERS")
        .env("GRIDLENS_LOG", "warn")
        .arg("--agents-dir")
        .arg(dir.path().join("agents"));
    cmd
}

#[test]
fn version_prints_package_version() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("gridlens")
        .unwrap()
        .current_dir(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn index_ranks_agents_and_fills_missing_cells() {
    let dir = fixture();

    gridlens(&dir)
        .arg("index")
        .assert()
        .success()
        .stdout(contains("2 agents, 2 scenarios"))
        .stdout(contains("donothing").and(contains("out of 2")));

    let out = gridlens(&dir)
        .args(["index", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    // equal steps, higher reward wins
    assert_eq!(json["best_agents"]["000"]["agent"], "donothing");
    assert_eq!(json["best_agents"]["001"]["agent"], "greedy");
}

#[test]
fn warm_reports_pairs_an_agent_never_ran() {
    let dir = fixture();

    gridlens(&dir)
        .args(["warm", "--workers", "2"])
        .assert()
        .code(1)
        .stdout(contains("4 tasks: 3 persisted"))
        .stdout(contains("FAIL donothing/001"));
}

#[test]
fn cached_episodes_are_reported_and_shown() {
    let dir = fixture();

    gridlens(&dir)
        .args(["warm", "--agent", "greedy"])
        .assert()
        .success()
        .stdout(contains("2 tasks: 2 persisted"));

    gridlens(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(contains("2/3 episodes cached"));

    gridlens(&dir)
        .args(["show", "greedy", "001"])
        .assert()
        .success()
        .stdout(contains("4 / 4 (100% survived)"))
        .stdout(contains("sub_0, sub_1, sub_2, sub_3"))
        .stdout(contains("0_4_2"));

    gridlens(&dir)
        .arg("clear")
        .assert()
        .code(1)
        .stderr(contains("--purge"));

    gridlens(&dir).args(["clear", "--purge"]).assert().success();
    assert!(!dir.path().join("agents").join("_cache").exists());
}

#[test]
fn show_unknown_episode_exits_with_no_data() {
    let dir = fixture();

    gridlens(&dir)
        .args(["show", "greedy", "999"])
        .assert()
        .code(3)
        .stderr(contains("no data"));
}

#[test]
fn missing_metadata_is_a_config_error() {
    let dir = fixture();
    fs::create_dir_all(dir.path().join("agents").join("greedy").join("002")).unwrap();

    gridlens(&dir)
        .arg("index")
        .assert()
        .code(2)
        .stderr(contains("missing episode metadata"));
}

#[test]
fn init_writes_a_loadable_config() {
    let dir = fixture();
    let cfg = dir.path().join("gridlens.yaml");

    Command::cargo_bin("gridlens")
        .unwrap()
        .current_dir(dir.path())
        .args(["init", "--out"])
        .arg(&cfg)
        .assert()
        .success();
    assert!(cfg.exists());

    // picked up from the working directory; agents_dir resolves next to it
    Command::cargo_bin("gridlens")
        .unwrap()
        .current_dir(dir.path())
        .env_remove("GRIDLENS_AGENTS_DIR")
        .args(["index", "--strict"])
        .assert()
        .success()
        .stdout(contains("2 agents"));
}

#[test]
fn strict_mode_rejects_unknown_config_fields() {
    let dir = fixture();
    let cfg = dir.path().join("custom.yaml");
    fs::write(&cfg, "agents_dir: agents\nn_cores: 4\n").unwrap();

    gridlens(&dir)
        .args(["--strict", "--config"])
        .arg(&cfg)
        .arg("index")
        .assert()
        .code(2)
        .stderr(contains("n_cores"));
}
