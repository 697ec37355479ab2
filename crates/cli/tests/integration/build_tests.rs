use predicates::prelude::*;

use super::common::TestEnv;

const TEXTS_GRAPH: &str = r#"
- default: texts
- id: texts
  in:
    - source: src
      files: "*.txt"
"#;

const UPPER_GRAPH: &str = r#"
- id: upper
  in:
    - source: src
  run:
    cmd: ["/bin/sh", "-c", "tr a-z A-Z < \"$in/a.txt\" > \"$out/A.TXT\""]
"#;

fn with_sources(graph: &str) -> TestEnv {
  let env = TestEnv::with_graph(graph);
  env.write_file("src/a.txt", "alpha\n");
  env.write_file("src/b.md", "beta\n");
  env
}

#[test]
fn build_default_task_links_outputs() {
  let env = with_sources(TEXTS_GRAPH);

  env
    .fftt_cmd()
    .args(["build", "--tag", "first"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Built texts"));

  let out = env.tag_dir("first").join("texts");
  assert_eq!(std::fs::read_to_string(out.join("a.txt")).unwrap(), "alpha\n");
  assert!(!out.join("b.md").exists());

  let latest = env.path().join("out").join("latest").join("texts").join("a.txt");
  assert_eq!(std::fs::read_to_string(latest).unwrap(), "alpha\n");
}

#[test]
fn build_runs_command_then_uses_memo() {
  let env = with_sources(UPPER_GRAPH);

  let first = env.build_json(&["upper", "--tag", "one"]);
  assert_eq!(first["outcomes"]["upper"], "executed");
  let out = env.tag_dir("one").join("upper").join("A.TXT");
  assert_eq!(std::fs::read_to_string(out).unwrap(), "ALPHA\n");

  let second = env.build_json(&["upper", "--tag", "two"]);
  assert_eq!(second["outcomes"]["upper"], "cached");
  assert_eq!(first["hash"], second["hash"]);

  let forced = env.build_json(&["upper", "--tag", "three", "--no-cache"]);
  assert_eq!(forced["outcomes"]["upper"], "executed");
}

#[test]
fn environment_disables_cache() {
  let env = with_sources(UPPER_GRAPH);
  env.build_json(&["upper", "--tag", "one"]);

  let output = env
    .fftt_cmd()
    .env("FFTT_NO_CACHE", "1")
    .args(["build", "upper", "--tag", "two", "-o", "json"])
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();
  let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
  assert_eq!(summary["outcomes"]["upper"], "executed");
}

#[test]
fn failing_command_fails_build() {
  let env = TestEnv::with_graph(
    r#"
- id: broken
  run:
    cmd: ["/bin/sh", "-c", "exit 3"]
"#,
  );

  env
    .fftt_cmd()
    .args(["build", "broken"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Build of broken failed"))
    .stderr(predicate::str::contains("status 3"));
}

#[test]
fn cycle_is_reported() {
  let env = TestEnv::with_graph("- id: a\n  in: b\n- id: b\n  in: a\n");

  env
    .fftt_cmd()
    .args(["build", "a"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("cyclic dependency"));
}

#[test]
fn missing_build_file_fails() {
  let env = TestEnv::with_graph("- id: a\n");

  env
    .fftt_cmd()
    .args(["build", "a", "-f", "missing.yaml"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Build file not found"));
}

#[test]
fn task_required_without_default() {
  let env = TestEnv::with_graph("- id: a\n");

  env
    .fftt_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("No task given"));
}

#[test]
fn invalid_graph_is_rejected() {
  let env = TestEnv::with_graph("- id: a\n  in: missing\n");

  env
    .fftt_cmd()
    .args(["build", "a"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load build file"));
}
