
use fixtures::*;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use rsrc::CoffResourceObject;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn rsrc() -> Command {
    Command::new(assert_cmd::cargo_bin!("rsrc"))
}

#[test]
fn test_it_prints_usage_without_manifest() {
    let d = tempdir().unwrap();

    let mut cmd = rsrc();
    cmd.current_dir(d.path());

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--manifest"));

    assert!(!d.path().join("rsrc.syso").exists());
}

#[test]
fn test_it_writes_default_output_name() {
    let d = tempdir().unwrap();
    let manifest = sample_manifest();

    let mut cmd = rsrc();
    cmd.current_dir(d.path())
        .args(["--manifest", manifest.to_str().unwrap()]);

    cmd.assert().success();

    let out = fs::read(d.path().join("rsrc.syso")).unwrap();
    let obj = CoffResourceObject::parse(&out).unwrap();
    assert_eq!(obj.manifest().unwrap().data, fs::read(&manifest).unwrap());
}

#[test]
fn test_it_respects_output_flag() {
    let d = tempdir().unwrap();
    let f = d.path().join("app_windows_amd64.syso");

    let mut cmd = rsrc();
    cmd.args([
        "--manifest",
        sample_manifest().to_str().unwrap(),
        "-o",
        &f.to_string_lossy(),
        "--arch",
        "amd64",
    ]);

    cmd.assert().success();

    let obj = CoffResourceObject::parse(&fs::read(&f).unwrap()).unwrap();
    assert_eq!(obj.header.machine, 0x8664);
}

#[test]
fn test_it_names_missing_manifest() {
    let d = tempdir().unwrap();
    let f = d.path().join("out.syso");

    let mut cmd = rsrc();
    cmd.args([
        "--manifest",
        "does-not-exist.manifest",
        "-o",
        &f.to_string_lossy(),
    ]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("does-not-exist.manifest"));

    assert!(!f.exists());
}

#[test]
fn test_it_rejects_invalid_icon() {
    let d = tempdir().unwrap();
    let f = d.path().join("out.syso");
    let ico = d.path().join("broken.ico");
    fs::write(&ico, b"\x00\x00\x02\x00\x01\x00").unwrap();

    let mut cmd = rsrc();
    cmd.args([
        "--manifest",
        sample_manifest().to_str().unwrap(),
        "--ico",
        &ico.to_string_lossy(),
        "-o",
        &f.to_string_lossy(),
    ]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("broken.ico"));

    assert!(!f.exists());
}

#[test]
fn test_it_accepts_valid_icon() {
    let d = tempdir().unwrap();
    let f = d.path().join("out.syso");

    let mut cmd = rsrc();
    cmd.args([
        "--manifest",
        sample_manifest().to_str().unwrap(),
        "--ico",
        sample_icon().to_str().unwrap(),
        "-o",
        &f.to_string_lossy(),
    ]);

    cmd.assert().success();
    assert!(f.exists());
}

#[test]
fn test_it_rejects_unknown_arch() {
    let d = tempdir().unwrap();

    let mut cmd = rsrc();
    cmd.current_dir(d.path()).args([
        "--manifest",
        sample_manifest().to_str().unwrap(),
        "--arch",
        "mips",
    ]);

    cmd.assert().failure();
    assert!(!d.path().join("rsrc.syso").exists());
}

#[test]
fn test_it_accepts_single_dash_long_flags() {
    let d = tempdir().unwrap();
    let f = d.path().join("rsrc_windows_386.syso");

    let mut cmd = rsrc();
    cmd.args([
        "-manifest",
        sample_manifest().to_str().unwrap(),
        "-o",
        &f.to_string_lossy(),
    ]);

    cmd.assert().success();

    let obj = CoffResourceObject::parse(&fs::read(&f).unwrap()).unwrap();
    assert_eq!(obj.header.machine, 0x014c);
}
