#![forbid(unsafe_code)]

use std::process::Command;

fn temp_dir(test_name: &str) -> std::path::PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("pf_mcp_cli_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn cli_help_exits_zero_and_does_not_create_a_store() {
    let exe = env!("CARGO_BIN_EXE_pf_mcp");
    let dir = temp_dir("help");

    let output = Command::new(exe)
        .arg("--help")
        .current_dir(&dir)
        .output()
        .expect("run pf_mcp --help");

    assert!(
        output.status.success(),
        "expected zero exit (stderr={})",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("USAGE:"), "help must include USAGE");
    assert!(stdout.contains("--remote-dir"));
    assert!(
        !dir.join(".pf_sync").exists(),
        "--help should not create the default store"
    );
}

#[test]
fn cli_version_exits_zero_and_includes_pkg_version() {
    let exe = env!("CARGO_BIN_EXE_pf_mcp");
    let output = Command::new(exe)
        .arg("-V")
        .output()
        .expect("run pf_mcp -V");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "version output must include crate version (got={stdout})"
    );
}

#[test]
fn unknown_flags_fail_before_touching_storage() {
    let exe = env!("CARGO_BIN_EXE_pf_mcp");
    let dir = temp_dir("bad_flag");
    let output = Command::new(exe)
        .arg("--turbo")
        .current_dir(&dir)
        .output()
        .expect("run pf_mcp --turbo");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--turbo"));
    assert!(!dir.join(".pf_sync").exists());
}

#[test]
fn settings_file_with_unknown_keys_is_refused() {
    let exe = env!("CARGO_BIN_EXE_pf_mcp");
    let dir = temp_dir("yaml_unknown_key");
    std::fs::write(dir.join("pf_sync.yaml"), "turbo: true\n").expect("write settings");

    let output = Command::new(exe)
        .arg("--storage-dir")
        .arg(&dir)
        .env_remove("PF_SYNC_REMOTE_DIR")
        .output()
        .expect("run pf_mcp");

    assert!(!output.status.success(), "unknown settings keys must be rejected");
    assert!(String::from_utf8_lossy(&output.stderr).contains("turbo"));
}
