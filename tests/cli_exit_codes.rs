use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;
use tpx_lib::TpxOutput;

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/record.json")
}

/// Runs `tpx` isolated from any user-level config file.
fn run_tpx(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tpx"))
        .args(args)
        .env("XDG_CONFIG_HOME", home)
        .env("HOME", home)
        .env_remove("RUST_LOG")
        .env_remove("TPX_WORKER_CONCURRENCY")
        .output()
        .expect("run tpx")
}

fn parse_json(stdout: &[u8]) -> serde_json::Value {
    serde_json::from_slice(stdout).expect("output should be JSON")
}

#[test]
fn preview_exits_zero_and_lists_sections() {
    let dir = TempDir::new().expect("tempdir");
    let record = fixture();

    let output = run_tpx(
        dir.path(),
        &["preview", "--record", record.to_str().unwrap(), "--format", "json"],
    );

    assert_eq!(output.status.code(), Some(0));
    let body: TpxOutput = serde_json::from_slice(&output.stdout).expect("preview output");
    match body {
        TpxOutput::Preview(preview) => {
            assert_eq!(preview.record_id, "R-1001");
            let names: Vec<&str> = preview.sections.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(
                names,
                vec!["cover", "bom", "measurements", "fit", "colorways", "construction", "care"]
            );
            assert!(preview.sections.iter().all(|s| s.html.is_some()));
        }
        _ => panic!("expected preview output"),
    }
}

#[test]
fn preview_writes_html_files_when_asked() {
    let dir = TempDir::new().expect("tempdir");
    let html_dir = dir.path().join("html");
    let record = fixture();

    let output = run_tpx(
        dir.path(),
        &[
            "preview",
            "--record",
            record.to_str().unwrap(),
            "--section",
            "bom",
            "--html-dir",
            html_dir.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    let html = std::fs::read_to_string(html_dir.join("bom.html")).expect("bom.html");
    assert!(html.contains("Waxed cotton"));
    let body = parse_json(&output.stdout);
    assert_eq!(body["sections"][0]["name"], "bom");
    assert!(body["sections"][0].get("html").is_none());
}

#[test]
fn preview_exits_two_for_unknown_section() {
    let dir = TempDir::new().expect("tempdir");
    let record = fixture();

    let output = run_tpx(
        dir.path(),
        &["preview", "--record", record.to_str().unwrap(), "--section", "sleeves"],
    );

    assert_eq!(output.status.code(), Some(2));
    let body = parse_json(&output.stdout);
    assert_eq!(body["mode"], "error");
    assert_eq!(body["error"]["code"], "CONFIG_ERROR");
    assert_eq!(body["error"]["retryable"], false);
}

#[test]
fn export_exits_two_for_missing_record() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("missing.json");

    let output = run_tpx(
        dir.path(),
        &["export", "--record", missing.to_str().unwrap(), "--format", "json"],
    );

    assert_eq!(output.status.code(), Some(2));
    let body = parse_json(&output.stdout);
    assert_eq!(body["error"]["code"], "RECORD_ERROR");
}

#[test]
fn export_exits_two_for_zero_concurrency() {
    let dir = TempDir::new().expect("tempdir");
    let record = fixture();

    let output = run_tpx(
        dir.path(),
        &[
            "export",
            "--record",
            record.to_str().unwrap(),
            "--concurrency",
            "0",
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let body = parse_json(&output.stdout);
    assert_eq!(body["error"]["code"], "CONFIG_ERROR");
}

#[test]
fn invalid_config_file_is_fatal() {
    let dir = TempDir::new().expect("tempdir");
    let cfg_path = dir.path().join("tpx.toml");
    std::fs::write(&cfg_path, "[images]\nquality = 0\n").expect("write config");
    let record = fixture();

    let output = run_tpx(
        dir.path(),
        &[
            "preview",
            "--record",
            record.to_str().unwrap(),
            "--config",
            cfg_path.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let body = parse_json(&output.stdout);
    assert!(body["message"]
        .as_str()
        .is_some_and(|m| m.contains("images.quality")));
}

#[test]
fn pretty_errors_keep_json_shape_off_a_terminal() {
    let dir = TempDir::new().expect("tempdir");

    let output = run_tpx(
        dir.path(),
        &["export", "--record", "nope.yaml", "--format", "pretty"],
    );

    assert_eq!(output.status.code(), Some(2));
    let body = parse_json(&output.stdout);
    assert_eq!(body["mode"], "error");
    assert!(body["error"]["remediation"].is_string());
}
