mod common;

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use rstest::rstest;
use solar_deploy_sim::config::ScenarioConfig;
use solar_deploy_sim::io::export::HEADER;

#[rstest]
#[case("baseline")]
#[case("high_carbon_price")]
#[case("tight_grid")]
fn scenario_files_match_built_in_presets(#[case] name: &str) {
    let from_file = ScenarioConfig::from_toml_file(&common::scenario_path(name))
        .expect("bundled scenario should parse");
    let preset = ScenarioConfig::from_preset(name).expect("preset should exist");
    assert_eq!(from_file, preset, "scenarios/{name}.toml drifted from the preset");
}

#[test]
fn preset_run_via_cli_prints_records_and_summary() {
    let output = run_cli(&["--preset", "baseline", "--end-year", "2027"]);
    assert!(
        output.status.success(),
        "run failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    let years: Vec<&str> = stdout
        .lines()
        .filter(|l| l.starts_with("year="))
        .collect();
    assert_eq!(years.len(), 3, "stdout:\n{stdout}");
    assert!(years[0].starts_with("year=2025 "));
    assert!(years[2].starts_with("year=2027 "));
    assert!(stdout.contains("--- Run Summary ---"));
}

#[test]
fn scenario_file_run_via_cli() {
    let path = common::scenario_path("tight_grid");
    let output = run_cli(&["--scenario", path.to_str().expect("utf-8 path"), "-q"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("year=2030 "));
}

#[test]
fn cli_writes_csv_and_json_reports() {
    let csv = temp_path("solar_deploy_sim_cli.csv");
    let json = temp_path("solar_deploy_sim_cli.json");

    let output = run_cli(&[
        "--preset",
        "high_carbon_price",
        "--start-year",
        "2025",
        "--end-year",
        "2026",
        "--csv-out",
        csv.to_str().expect("utf-8 path"),
        "--json-out",
        json.to_str().expect("utf-8 path"),
    ]);
    assert!(
        output.status.success(),
        "run failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let csv_text = fs::read_to_string(&csv).expect("csv should exist");
    let mut lines = csv_text.lines();
    assert_eq!(lines.next(), Some(HEADER));
    assert!(lines.all(|l| l.starts_with("2025,") || l.starts_with("2026,")));

    let json_text = fs::read_to_string(&json).expect("json should exist");
    let value: serde_json::Value = serde_json::from_str(&json_text).expect("json should parse");
    let years: Vec<i64> = value
        .as_array()
        .expect("top level should be an array")
        .iter()
        .filter_map(|r| r["year"].as_i64())
        .collect();
    assert_eq!(years, vec![2025, 2026]);

    let _ = fs::remove_file(csv);
    let _ = fs::remove_file(json);
}

#[test]
fn conflicting_scenario_and_preset_fail() {
    let output = run_cli(&["--scenario", "a.toml", "--preset", "baseline"]);
    assert!(!output.status.success());
}

#[test]
fn unknown_preset_fails() {
    let output = run_cli(&["--preset", "no_such_preset"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown preset"));
}

#[test]
fn inverted_years_fail_validation() {
    let output = run_cli(&["--start-year", "2031", "--end-year", "2030"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("simulation.start_year"));
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_solar-deploy-sim"))
        .args(args)
        .output()
        .expect("solar-deploy-sim process should run")
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}_{name}", std::process::id()))
}
