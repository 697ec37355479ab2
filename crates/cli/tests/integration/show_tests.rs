use predicates::prelude::*;

use super::common::TestEnv;

const GRAPH: &str = r#"
- id: docs
  in:
    - source: docs
"#;

fn built() -> (TestEnv, String) {
  let env = TestEnv::with_graph(GRAPH);
  env.write_file("docs/readme.txt", "read me\n");
  env.write_file("docs/guide/intro.txt", "intro\n");
  let summary = env.build_json(&["docs", "--tag", "t"]);
  let hash = summary["hash"].as_str().unwrap().to_string();
  (env, hash)
}

#[test]
fn show_lists_tree() {
  let (env, hash) = built();

  env
    .fftt_cmd()
    .args(["show", &hash])
    .assert()
    .success()
    .stdout(predicate::str::contains("guide/intro.txt"))
    .stdout(predicate::str::contains("readme.txt"));
}

#[test]
fn show_prints_file_contents() {
  let (env, hash) = built();

  let listing = env
    .fftt_cmd()
    .args(["show", &hash, "-o", "json"])
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();
  let listing: serde_json::Value = serde_json::from_slice(&listing).unwrap();
  let file = listing["readme.txt"].as_str().unwrap();

  env.fftt_cmd().args(["show", file]).assert().success().stdout("read me\n");
}

#[test]
fn checkout_prints_mount_path() {
  let (env, hash) = built();

  let output = env
    .fftt_cmd()
    .args(["checkout", &hash])
    .assert()
    .success()
    .get_output()
    .stdout
    .clone();
  let path = String::from_utf8(output).unwrap();
  let path = std::path::PathBuf::from(path.trim());

  assert!(path.ends_with(format!("mnt/{}", hash)));
  assert_eq!(std::fs::read_to_string(path.join("guide/intro.txt")).unwrap(), "intro\n");
}

#[test]
fn unknown_hash_fails() {
  let (env, _) = built();

  env
    .fftt_cmd()
    .args(["show", "F-0000"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to read"));

  env
    .fftt_cmd()
    .args(["checkout", "nonsense"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Invalid hash"));
}
