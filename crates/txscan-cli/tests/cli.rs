use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const BAYER_BUY: &str = "DADAT - Bankhaus
Kauf
Titel: DE000BAY0017 Bayer AG
Namens-Aktien o.N.
Zugang: 2 Stk
Zu Lasten IBAN AT27 1234 1234 1234 1234 -107,26 EUR
";

const UNKNOWN: &str = "Some unrelated letter
with no statement content
";

fn txscan(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("txscan").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

fn write_default_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.json");
    fs::write(&path, "{}").unwrap();
    path
}

#[test]
fn process_prints_committed_buy_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_default_config(dir.path());
    let input = dir.path().join("bayer.txt");
    fs::write(&input, BAYER_BUY).unwrap();

    let output = txscan(&config).arg("process").arg(&input).output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["items"][0]["status"], "committed");
    assert_eq!(report["items"][0]["draft"]["amount"], 10726);
    assert_eq!(report["items"][0]["draft"]["currency"], "EUR");
}

#[test]
fn process_writes_csv_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_default_config(dir.path());
    let input = dir.path().join("bayer.txt");
    let out = dir.path().join("bayer.csv");
    fs::write(&input, BAYER_BUY).unwrap();

    txscan(&config)
        .args(["process", "--format", "csv", "--output"])
        .arg(&out)
        .arg(&input)
        .assert()
        .success();

    let csv = fs::read_to_string(&out).unwrap();
    assert!(csv.starts_with("document,status,kind"));
    assert!(csv.contains("committed,buy"));
}

#[test]
fn process_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_default_config(dir.path());

    txscan(&config)
        .arg("process")
        .arg(dir.path().join("missing.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn process_warns_on_unrecognized_document() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_default_config(dir.path());
    let input = dir.path().join("letter.txt");
    fs::write(&input, UNKNOWN).unwrap();

    txscan(&config)
        .arg("process")
        .arg(&input)
        .assert()
        .success()
        .stderr(predicate::str::contains("not recognized"));
}

#[test]
fn batch_writes_outputs_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_default_config(dir.path());
    let inputs = dir.path().join("in");
    let outputs = dir.path().join("out");
    fs::create_dir(&inputs).unwrap();
    fs::write(inputs.join("bayer.txt"), BAYER_BUY).unwrap();
    fs::write(inputs.join("letter.txt"), UNKNOWN).unwrap();

    txscan(&config)
        .args(["batch", "--summary", "-j", "2", "--output-dir"])
        .arg(&outputs)
        .arg(inputs.join("*.txt").display().to_string())
        .assert()
        .success()
        .stdout(predicate::str::contains("Processed 2 files"))
        .stdout(predicate::str::contains("not recognized"));

    assert!(outputs.join("bayer.json").exists());
    assert!(outputs.join("letter.json").exists());

    let summary = fs::read_to_string(outputs.join("summary.csv")).unwrap();
    assert!(summary.contains("bayer.txt,success"));
    assert!(summary.contains("letter.txt,unrecognized"));
}

#[test]
fn batch_fails_without_matches() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_default_config(dir.path());

    txscan(&config)
        .arg("batch")
        .arg(dir.path().join("*.txt").display().to_string())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No matching files"));
}

#[test]
fn formats_list_names_builtin_converters() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_default_config(dir.path());

    txscan(&config)
        .args(["formats", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DADAT"))
        .stdout(predicate::str::contains("GENO Broker GmbH"))
        .stdout(predicate::str::contains("Kontoauszug"));
}

#[test]
fn formats_detect_identifies_trade_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_default_config(dir.path());
    let input = dir.path().join("bayer.txt");
    fs::write(&input, BAYER_BUY).unwrap();

    txscan(&config)
        .args(["formats", "detect"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Kauf/Verkauf"));
}

#[test]
fn config_set_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("nested").join("config.json");

    txscan(&config).args(["config", "init"]).assert().success();
    txscan(&config)
        .args(["config", "set", "extraction.default_rounding", "half_down"])
        .assert()
        .success();
    txscan(&config)
        .args(["config", "get", "extraction.default_rounding"])
        .assert()
        .success()
        .stdout(predicate::str::contains("half_down"));
}

#[test]
fn config_set_rejects_unknown_key() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_default_config(dir.path());

    txscan(&config)
        .args(["config", "set", "extraction.unknown", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration key not found"));
}
