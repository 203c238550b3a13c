// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::process::Command;

fn rombridge() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rombridge"))
}

#[test]
fn test_reset_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("config.bin");

    let reset = rombridge()
        .args(["config", "reset", "--image"])
        .arg(&image)
        .output()
        .unwrap();
    assert!(reset.status.success());
    assert_eq!(std::fs::metadata(&image).unwrap().len(), 4096);

    let shown = rombridge()
        .args(["config", "show", "--image"])
        .arg(&image)
        .output()
        .unwrap();
    assert!(shown.status.success());
    let table = String::from_utf8_lossy(&shown.stdout);
    assert!(table.contains("HOSTNAME"));
    assert!(table.contains("sidecart"));
    assert!(table.contains("CONFIGURATOR"));
}

#[test]
fn test_show_missing_image_lists_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let shown = rombridge()
        .args(["config", "show", "--image"])
        .arg(dir.path().join("never-written.bin"))
        .output()
        .unwrap();
    assert!(shown.status.success());
    assert!(String::from_utf8_lossy(&shown.stdout).contains("BOOT_FEATURE"));
}
