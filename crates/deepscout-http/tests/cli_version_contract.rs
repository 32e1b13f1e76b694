#[test]
fn deepscout_version_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("deepscout");
    let out = std::process::Command::new(bin)
        .args(["version"])
        .env_remove("DEEPSCOUT_ENV_FILE")
        .output()
        .expect("run deepscout version");

    assert!(out.status.success(), "deepscout version failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse version json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["name"].as_str(), Some("deepscout"));
    assert!(!v["version"].as_str().unwrap_or("").is_empty());
}

#[test]
fn deepscout_version_text_output() {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("deepscout"));
    cmd.args(["version", "--output", "text"])
        .env_remove("DEEPSCOUT_ENV_FILE")
        .assert()
        .success()
        .stdout(predicates::str::starts_with("deepscout "));
}

#[test]
fn research_requires_a_query() {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("deepscout"));
    cmd.args(["research"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("<QUERY>"));
}
