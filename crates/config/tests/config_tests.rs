// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use rombridge_config::{
    keys, ConfigBackend, ConfigStore, DeviceProfile, FileBackend, HostAssertion, HostScript,
    CONFIG_FLASH_SIZE,
};
use std::io::Write;

#[test]
fn test_file_backend_persists_sector() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.bin");
    let mut backend = FileBackend::new(&path);

    // Nothing stored yet: defaults.
    let mut store = ConfigStore::load_from(&mut backend).unwrap();
    assert_eq!(store.get_str(keys::BOOT_FEATURE), Some("CONFIGURATOR"));

    store.put_string(keys::HOSTNAME, "mega-ste").unwrap();
    store.put_integer(keys::WIFI_SCAN_SECONDS, 45).unwrap();
    store.persist(&mut backend).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, CONFIG_FLASH_SIZE);

    let reloaded = ConfigStore::load_from(&mut FileBackend::new(&path)).unwrap();
    assert_eq!(reloaded.get_str(keys::HOSTNAME), Some("mega-ste"));
    assert_eq!(reloaded.get_int(keys::WIFI_SCAN_SECONDS), Some(45));

    backend.erase().unwrap();
    assert!(!path.exists());
    backend.erase().unwrap();
}

#[test]
fn test_garbage_sector_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.bin");
    std::fs::write(&path, vec![0xFF; CONFIG_FLASH_SIZE]).unwrap();
    let store = ConfigStore::load_from(&mut FileBackend::new(&path)).unwrap();
    assert_eq!(store.len(), ConfigStore::defaults().len());
}

#[test]
fn test_profile_from_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        f,
        r#"
schema_version: "1.0"
name: "bench-board"
rom:
  base: 0x20020000
  bank_size: "64KiB"
shared_window: "4KiB"
network_poll_interval: 4
rom_extensions: ["img"]
"#
    )
    .unwrap();
    let profile = DeviceProfile::from_file(f.path()).unwrap();
    assert_eq!(profile.name, "bench-board");
    assert_eq!(profile.network_poll_interval, 4);
    assert_eq!(profile.rom_extensions, vec!["img"]);
    assert_eq!(profile.window_size().unwrap(), 4096);
    // Unset fields keep their defaults.
    assert_eq!(profile.floppy_extensions, DeviceProfile::default().floppy_extensions);
}

#[test]
fn test_profile_rejects_misaligned_rom3() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        f,
        r#"
name: "odd"
rom:
  base: 0x20021000
  bank_size: "64KiB"
"#
    )
    .unwrap();
    let err = DeviceProfile::from_file(f.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("64KiB boundary"));
}

#[test]
fn test_script_from_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        f,
        r#"
schema_version: "1.0"
inputs:
  sd_root: "card"
limits:
  max_iterations_per_step: 10
network:
  networks:
    - ssid: "home"
  password: "secret"
steps:
  - command: connect_network
    ssid: "home"
    password: "secret"
  - command: get_ip_data
assertions:
  - config_value:
      key: "WIFI_SSID"
      value: "home"
"#
    )
    .unwrap();
    let script = HostScript::from_file(f.path()).unwrap();
    assert_eq!(script.steps[0].ssid.as_deref(), Some("home"));
    assert_eq!(script.network.password.as_deref(), Some("secret"));
    assert!(matches!(
        script.assertions[0],
        HostAssertion::ConfigValue(_)
    ));
}

#[test]
fn test_script_without_steps_rejected() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        f,
        r#"
schema_version: "1.0"
inputs:
  sd_root: "card"
limits:
  max_iterations_per_step: 10
steps: []
"#
    )
    .unwrap();
    let err = HostScript::from_file(f.path()).unwrap_err();
    assert!(err.to_string().contains("no steps"));
}
