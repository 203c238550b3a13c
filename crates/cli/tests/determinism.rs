// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::process::Command;

#[test]
fn test_determinism_smoke() {
    let runs = 3;
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sd/roms")).unwrap();
    let image: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    std::fs::write(dir.path().join("sd/roms/game.img"), &image).unwrap();

    let script_path = dir.path().join("host.yaml");
    std::fs::write(
        &script_path,
        r#"
schema_version: "1.0"
inputs:
  sd_root: "sd"
limits:
  max_iterations_per_step: 10
steps:
  - command: get_sd_data
  - command: list_roms
  - command: load_rom
    index: 1
"#,
    )
    .unwrap();

    let mut results: Vec<serde_json::Value> = Vec::new();
    for i in 0..runs {
        let result_path = dir.path().join(format!("run_{}.json", i));
        let output = Command::new(env!("CARGO_BIN_EXE_rombridge"))
            .args(["run", "--seed", "7", "--script"])
            .arg(&script_path)
            .arg("--output")
            .arg(&result_path)
            .output()
            .expect("Failed to execute command");
        assert!(output.status.success(), "run {} failed", i);

        let content = std::fs::read_to_string(&result_path).unwrap();
        results.push(serde_json::from_str(&content).unwrap());
    }

    let first = &results[0];
    assert_eq!(first["boot_feature"], "ROM_EMULATOR");
    for (i, other) in results.iter().enumerate().skip(1) {
        assert_eq!(first, other, "run {} diverged", i);
    }
}
