use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn glyphcast(config_dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_glyphcast"));
    command
        .env("GLYPHCAST_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn charsets_lists_the_catalog() {
    let root = TempDir::new().unwrap();
    let output = glyphcast(root.path())
        .arg("charsets")
        .output()
        .expect("failed to run glyphcast charsets");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for id in ["standard", "detailed", "emoji"] {
        assert!(stdout.contains(id), "missing {id} in:\n{stdout}");
    }
    assert_eq!(stdout.lines().count(), 8);
}

#[test]
fn config_merges_file_and_flags() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("config.toml"),
        "[render]\ncolumns = 200\ncharset = \"blocks\"\n",
    )
    .unwrap();

    let output = glyphcast(root.path())
        .args(["--charset", "dots", "config"])
        .output()
        .expect("failed to run glyphcast config");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("columns = 200"), "{stdout}");
    assert!(stdout.contains("charset = \"dots\""), "{stdout}");
}

#[test]
fn invalid_config_file_is_reported() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("config.toml"), "[render]\nblend = 3.0\n").unwrap();

    let output = glyphcast(root.path())
        .arg("config")
        .output()
        .expect("failed to run glyphcast config");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("render.blend"), "{stderr}");
}

#[test]
fn running_without_media_fails() {
    let root = TempDir::new().unwrap();
    let status = glyphcast(root.path())
        .status()
        .expect("failed to run glyphcast");

    assert!(!status.success());
}
