use std::path::Path;

use assert_cmd::Command;
use serde_json::json;
use tempfile::TempDir;

/// The binary with a clean environment rooted in `home`.
fn tapline(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tapline").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG")
        .env_remove("TAPLINE_RUN_DIR")
        .env_remove("TAPLINE_CACHE")
        .env_remove("TAPLINE_REPLANNING_CYCLE_LIMIT")
        .env_remove("TAPLINE_LOG_LEVEL");
    cmd
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_cache(dir: &Path, cache_id: &str, tool_version: &str, xpaths: &[&str]) {
    let cache_dir = dir.join("cache");
    std::fs::create_dir_all(&cache_dir).unwrap();
    let file = json!({
        "toolVersion": tool_version,
        "packageName": "todo-app",
        "packageVersion": "1.0.0",
        "cacheId": cache_id,
        "promptGroups": [{
            "prompt": "the first todo item",
            "usedCount": 1,
            "records": [{
                "type": "locate",
                "prompt": "the first todo item",
                "xpaths": xpaths,
            }]
        }]
    });
    std::fs::write(
        cache_dir.join(format!("{cache_id}.cache.json")),
        serde_json::to_vec_pretty(&file).unwrap(),
    )
    .unwrap();
}

#[test]
fn config_show_reflects_env_and_flags() {
    let home = TempDir::new().unwrap();
    let output = tapline(home.path())
        .env("TAPLINE_REPLANNING_CYCLE_LIMIT", "4")
        .args(["--run-dir", "runs", "--wait-for-timeout", "20s", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("Current configuration (defaults):"));
    assert!(text.contains("replanning_cycle_limit: 4"));
    assert!(text.contains("wait_for_timeout_ms: 20000"));
    assert!(text.contains("run_dir: runs"));
}

#[test]
fn config_file_is_picked_up_from_the_working_directory() {
    let home = TempDir::new().unwrap();
    std::fs::create_dir_all(home.path().join("config")).unwrap();
    std::fs::write(
        home.path().join("config/tapline.yaml"),
        "driver:\n  default_sleep_ms: 1200\n",
    )
    .unwrap();

    let output = tapline(home.path()).args(["config", "show"]).output().unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("config/tapline.yaml"));
    assert!(text.contains("default_sleep_ms: 1200"));
}

#[test]
fn cache_inspect_and_clear() {
    let home = TempDir::new().unwrap();
    let run_dir = home.path().join("run");
    write_cache(&run_dir, "todo-1", "0.1.0", &["//ul/li[1]"]);

    let output = tapline(home.path())
        .args(["--run-dir", "run", "cache", "inspect", "todo-1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Cache todo-1"));
    assert!(text.contains("package: todo-app@1.0.0"));
    assert!(text.contains("locate  //ul/li[1]"));

    tapline(home.path())
        .args(["--run-dir", "run", "cache", "clear", "todo-1"])
        .assert()
        .success();
    assert!(!run_dir.join("cache/todo-1.cache.json").exists());

    tapline(home.path())
        .args(["--run-dir", "run", "cache", "inspect", "todo-1"])
        .assert()
        .failure();
}

#[test]
fn cache_lint_passes_clean_files_and_fails_bad_ones() {
    let home = TempDir::new().unwrap();
    write_cache(home.path(), "good-1", "0.1.0", &["//button"]);
    write_cache(home.path(), "bad-1", "0.0.3", &[]);

    let good = tapline(home.path())
        .args(["cache", "lint", "cache/good-1.cache.json"])
        .output()
        .unwrap();
    assert!(good.status.success());
    assert!(stdout(&good).contains(": ok"));

    let bad = tapline(home.path())
        .args(["cache", "lint", "cache/bad-1.cache.json"])
        .output()
        .unwrap();
    assert!(!bad.status.success());
    let text = stdout(&bad);
    assert!(text.contains("0.0.3"));
    assert!(text.contains("no xpaths"));
}

#[test]
fn plan_check_prints_the_task_queue() {
    let home = TempDir::new().unwrap();
    let plan = home.path().join("plan.json");
    std::fs::write(
        &plan,
        serde_json::to_vec(&json!([
            {"type": "Input", "param": {"value": "milk", "locate": {"prompt": "new todo field"}}},
            {"type": "KeyboardPress", "param": {"key": "Enter"}},
            {"type": "Sleep"}
        ]))
        .unwrap(),
    )
    .unwrap();

    let output = tapline(home.path())
        .args(["plan", "check", "plan.json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains("Locate/Locate -> locate"));
    assert!(text.contains("Action/Input"));
    assert!(text.contains("Action/KeyboardPress"));
    assert!(text.contains("\"timeMs\":3000"));
    assert!(text.contains("4 task(s)"));

    std::fs::write(&plan, br#"[{"type": "Teleport"}]"#).unwrap();
    tapline(home.path())
        .args(["plan", "check", "plan.json"])
        .assert()
        .failure();
}
