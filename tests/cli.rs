mod common;

use std::fs;

use assert_cmd::Command;
use common::{TestWorkspace, sales_csv};
use predicates::prelude::*;
use predicates::str::contains;

fn csv_stack() -> Command {
    Command::cargo_bin("csv-stack").expect("binary exists")
}

#[test]
fn sniff_prints_agreed_dialect() {
    let workspace = TestWorkspace::new();
    workspace.write_clean();
    let pattern = workspace.path().join("sales-clean-*.csv");

    csv_stack()
        .args(["sniff", "-i", pattern.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("sales-clean-feb.csv"))
        .stdout(contains("Agreed dialect: delimiter ',', has_header true, skip_rows 0"));
}

#[test]
fn sniff_fails_on_mixed_delimiters() {
    let workspace = TestWorkspace::new();
    let comma = workspace.write("comma.csv", &sales_csv(1, b',', false));
    let semicolon = workspace.write("semicolon.csv", &sales_csv(2, b';', false));

    csv_stack()
        .args([
            "sniff",
            "-i",
            comma.to_str().unwrap(),
            "-i",
            semicolon.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("Inconsistent delimiters"));
}

#[test]
fn columns_reports_unique_columns() {
    let workspace = TestWorkspace::new();
    workspace.write_colmismatch();
    let pattern = workspace.path().join("*.csv");

    csv_stack()
        .args(["columns", "-i", pattern.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("All files have equal columns: false"))
        .stdout(contains("Unique columns: profit2"));
}

#[test]
fn columns_json_serializes_catalog() {
    let workspace = TestWorkspace::new();
    workspace.write_clean();
    let pattern = workspace.path().join("*.csv");

    let output = csv_stack()
        .args(["columns", "-i", pattern.to_str().unwrap(), "--format", "json"])
        .output()
        .expect("run columns");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["is_all_equal"], serde_json::Value::Bool(true));
    assert_eq!(
        report["columns_all"],
        serde_json::json!(["date", "sales", "cost", "profit"])
    );
}

#[test]
fn preview_shows_renames_and_rows() {
    let workspace = TestWorkspace::new();
    workspace.write_colmismatch();
    let pattern = workspace.path().join("*.csv");

    csv_stack()
        .args([
            "preview",
            "-i",
            pattern.to_str().unwrap(),
            "--rename",
            "profit2=bonus",
            "--no-filepath",
        ])
        .assert()
        .success()
        .stdout(contains("Selected columns: date, sales, cost, profit, bonus"))
        .stdout(contains("sales-colmismatch-mar.csv  bonus"));
}

#[test]
fn combine_writes_selected_columns() {
    let workspace = TestWorkspace::new();
    workspace.write_colmismatch();
    let pattern = workspace.path().join("*.csv");
    let output = workspace.path().join("out").join("combined.csv");

    csv_stack()
        .args([
            "combine",
            "-i",
            pattern.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--common",
            "--no-filepath",
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("combined output");
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("date,sales,cost,profit,filename"));
    assert_eq!(lines.count(), 30);
}

#[test]
fn combine_reads_settings_from_config() {
    let workspace = TestWorkspace::new();
    workspace.write_colmismatch();
    let pattern = workspace.path().join("*.csv");
    let config = workspace.write(
        "settings.yaml",
        "sep: \",\"\nhas_header: true\nskip_rows: 0\ncolumns_select: [date, profit2]\nadd_filename: false\nadd_filepath: false\n",
    );
    let output = workspace.path().join("combined.tsv");

    csv_stack()
        .args([
            "combine",
            "-i",
            pattern.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("combined output");
    assert!(contents.starts_with("date\tprofit2\n"));
    assert!(contents.contains("2011-03-10\t240"));
}

#[test]
fn combine_rejects_duplicate_columns() {
    let workspace = TestWorkspace::new();
    workspace.write_clean();
    let pattern = workspace.path().join("*.csv");
    let output = workspace.path().join("combined.csv");

    csv_stack()
        .args([
            "combine",
            "-i",
            pattern.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-C",
            "date,sales,date",
        ])
        .assert()
        .failure()
        .stderr(contains("Duplicate entries in column selection: 'date'"));
    assert!(!output.exists());
}

#[test]
fn combine_aligns_into_directory() {
    let workspace = TestWorkspace::new();
    workspace.write_colmismatch();
    let pattern = workspace.path().join("*.csv");
    let aligned = workspace.path().join("aligned");

    csv_stack()
        .args([
            "combine",
            "-i",
            pattern.to_str().unwrap(),
            "--align-dir",
            aligned.to_str().unwrap(),
            "--align-prefix",
            "fixed-",
        ])
        .assert()
        .success();

    for month in common::MONTHS {
        let path = aligned.join(format!("fixed-sales-colmismatch-{month}.csv"));
        let contents = fs::read_to_string(&path).expect("aligned copy");
        assert!(contents.starts_with("date,sales,cost,profit,profit2,filepath,filename\n"));
    }
}

#[test]
fn combine_requires_an_output() {
    let workspace = TestWorkspace::new();
    workspace.write_clean();
    let pattern = workspace.path().join("*.csv");

    csv_stack()
        .args(["combine", "-i", pattern.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("--output").or(contains("--align-dir")));
}

#[test]
fn unmatched_glob_is_reported() {
    let workspace = TestWorkspace::new();
    let pattern = workspace.path().join("nothing-*.csv");

    csv_stack()
        .args(["columns", "-i", pattern.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("No files match"));
}
