use std::{
    io::{BufRead, BufReader},
    process::{Command as StdCommand, Stdio},
};

use assert_cmd::Command;
use predicates::prelude::*;

/// A `beam` command whose configuration lives in `config_home`.
fn beam(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("beam").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env_remove("BEAM_MODE")
        .env_remove("BEAM_RELAY_ENDPOINT")
        .env_remove("BEAM_RELAY_TOKEN");
    cmd
}

#[test]
fn inspect_rejects_garbage_as_invalid_code() {
    let home = tempfile::tempdir().unwrap();
    beam(home.path())
        .args(["inspect", "not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid code"));

    beam(home.path())
        .args(["inspect", r#"{"files":[]}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid code"));
}

#[test]
fn inspect_describes_a_direct_code() {
    let home = tempfile::tempdir().unwrap();
    let code = r#"{"mode":"DIRECT","sessionHostId":"10.0.0.7:4000","files":[{"name":"a.txt","size":10,"mimeType":"text/plain","sequenceIndex":0}]}"#;
    beam(home.path())
        .args(["inspect", code])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mode: direct"))
        .stdout(predicate::str::contains("Host: 10.0.0.7:4000"))
        .stdout(predicate::str::contains("#0 a.txt 10 bytes text/plain"));
}

#[test]
fn config_path_follows_xdg_config_home() {
    let home = tempfile::tempdir().unwrap();
    let expected = home.path().join("beam").join("config.toml");
    beam(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.display().to_string()));
}

#[test]
fn config_show_applies_environment_overrides() {
    let home = tempfile::tempdir().unwrap();
    beam(home.path())
        .args(["config", "show"])
        .env("BEAM_MODE", "relay")
        .env("BEAM_RELAY_ENDPOINT", "https://api.example.com/upload")
        .assert()
        .success()
        .stdout(predicate::str::contains("default_mode = \"relay\""))
        .stdout(predicate::str::contains("https://api.example.com/upload"));
}

#[test]
fn relay_send_without_endpoint_is_refused() {
    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("a.png");
    std::fs::write(&file, b"png").unwrap();

    beam(home.path())
        .args(["send", "--mode", "relay"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("relay.endpoint"));
}

#[test]
fn files_travel_between_two_processes() {
    let home = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let first = home.path().join("first.txt");
    let second = home.path().join("second.bin");
    std::fs::write(&first, b"hello from beam").unwrap();
    std::fs::write(&second, vec![7u8; 4096]).unwrap();

    let mut sender = StdCommand::new(assert_cmd::cargo::cargo_bin("beam"))
        .env("XDG_CONFIG_HOME", home.path())
        .env("HOME", home.path())
        .env_remove("BEAM_MODE")
        .args(["send", "--mode", "direct", "--bind", "127.0.0.1:0"])
        .args(["--advertise", "127.0.0.1"])
        .arg(&first)
        .arg(&second)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // keep reading end open until the sender exits
    let mut lines = BufReader::new(sender.stdout.take().unwrap()).lines();
    let code = lines
        .by_ref()
        .map(|line| line.unwrap())
        .find_map(|line| line.strip_prefix("Code: ").map(str::to_string))
        .expect("sender printed no code");

    beam(home.path())
        .args(["receive", code.as_str(), "--out"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved"));

    assert!(sender.wait().unwrap().success());
    drop(lines);
    assert_eq!(
        std::fs::read(out.path().join("first.txt")).unwrap(),
        b"hello from beam"
    );
    assert_eq!(
        std::fs::read(out.path().join("second.bin")).unwrap(),
        vec![7u8; 4096]
    );
}
