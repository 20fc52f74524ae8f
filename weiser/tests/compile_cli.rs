// weiser/tests/compile_cli.rs

use assert_cmd::Command;
use std::io::Write;

fn write_config(dir: &std::path::Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("checks.yaml");
    let mut file = std::fs::File::create(&path).expect("create config");
    file.write_all(content.as_bytes()).expect("write config");
    path
}

const VALID: &str = r#"
version: 1
datasources:
  - name: default
    type: postgresql
    host: db.internal
    db_name: analytics
connections:
  - type: metricstore
    db_type: duckdb
checks:
  - name: orders_count
    dataset: orders
    type: row_count
    condition: gt
    threshold: 0
  - name: customers_contact
    dataset: customers
    type: not_empty
    dimensions: [email, phone]
    condition: le
    threshold: 0
"#;

#[test]
fn test_compile_prints_leaf_sql() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path(), VALID);

    let mut cmd = Command::cargo_bin("weiser").expect("binary builds");
    cmd.arg("compile")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicates::str::contains("SELECT COUNT(*) FROM \"orders\""))
        .stdout(predicates::str::contains("customers_contact_email_not_empty"));
}

#[test]
fn test_compile_fails_on_invalid_check() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(
        dir.path(),
        r#"
version: 1
datasources:
  - name: default
    type: postgresql
    host: db.internal
connections:
  - type: metricstore
    db_type: duckdb
checks:
  - name: broken_sum
    dataset: orders
    type: sum
    condition: gt
    threshold: 0
"#,
    );

    let mut cmd = Command::cargo_bin("weiser").expect("binary builds");
    cmd.arg("compile").arg(&config).assert().failure();
}

#[test]
fn test_unresolved_template_variable_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(
        dir.path(),
        "version: 1\nslack_url: \"{{ WEISER_TEST_UNSET_VARIABLE }}\"\n",
    );

    let mut cmd = Command::cargo_bin("weiser").expect("binary builds");
    cmd.arg("compile").arg(&config).assert().failure();
}
