// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Host scripts drive the configurator from the computer side: a list of
//! protocol commands plus the network fixtures the firmware will see.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScriptInputs {
    /// Directory that plays the role of the microSD card.
    pub sd_root: String,
    /// Configuration flash image. Created with defaults when missing.
    #[serde(default)]
    pub config_image: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScriptLimits {
    /// Loop iterations allowed for a deferred command to echo its token.
    pub max_iterations_per_step: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScriptNetwork {
    pub ssid: String,
    #[serde(default)]
    pub bssid: String,
    #[serde(default)]
    pub auth_mode: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct NetworkFixtures {
    #[serde(default)]
    pub networks: Vec<ScriptNetwork>,
    /// Password accepted by the simulated access points. Any password is
    /// accepted when unset.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ipv4: Option<String>,
    /// URL to fixture file (relative to the script).
    #[serde(default)]
    pub http: BTreeMap<String, String>,
    /// Tag reported by the release endpoint.
    #[serde(default)]
    pub latest_release: Option<String>,
}

/// One host request. Only the fields the command uses are read.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct HostStep {
    pub command: String,
    #[serde(default)]
    pub index: Option<u16>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub letter: Option<char>,
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth_mode: Option<u16>,
    #[serde(default)]
    pub floppy: Option<FloppyStep>,
    #[serde(default)]
    pub token: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct FloppyStep {
    pub name: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default = "default_template")]
    pub template: u16,
    #[serde(default = "default_tracks")]
    pub tracks: u16,
    #[serde(default = "default_sectors")]
    pub sectors: u16,
    #[serde(default = "default_sides")]
    pub sides: u16,
    #[serde(default)]
    pub overwrite: bool,
}

fn default_template() -> u16 {
    1
}
fn default_tracks() -> u16 {
    80
}
fn default_sectors() -> u16 {
    9
}
fn default_sides() -> u16 {
    2
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BootFeatureAssertion {
    pub boot_feature: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ResponseContainsAssertion {
    pub response_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigValueDetails {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigValueAssertion {
    pub config_value: ConfigValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum HostAssertion {
    BootFeature(BootFeatureAssertion),
    ResponseContains(ResponseContainsAssertion),
    ConfigValue(ConfigValueAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct HostScript {
    pub schema_version: String,
    pub inputs: ScriptInputs,
    pub limits: ScriptLimits,
    #[serde(default)]
    pub network: NetworkFixtures,
    pub steps: Vec<HostStep>,
    #[serde(default)]
    pub assertions: Vec<HostAssertion>,
}

impl HostScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open host script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Host Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.inputs.sd_root.trim().is_empty() {
            anyhow::bail!("Input 'sd_root' path cannot be empty");
        }

        if self.limits.max_iterations_per_step == 0 {
            anyhow::bail!("Limit 'max_iterations_per_step' must be greater than zero");
        }

        if self.steps.is_empty() {
            anyhow::bail!("Script has no steps");
        }

        for (i, step) in self.steps.iter().enumerate() {
            if step.command.trim().is_empty() {
                anyhow::bail!("Step {} has an empty 'command'", i);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_script() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  sd_root: "sd"
  config_image: "config.bin"
limits:
  max_iterations_per_step: 20
network:
  networks:
    - ssid: "home"
      auth_mode: 3
  http:
    "http://roms.sidecart.xyz/roms.json": "roms.json"
steps:
  - command: list_roms
  - command: load_rom
    index: 1
  - command: create_floppy
    floppy:
      name: "blank"
assertions:
  - boot_feature: "ROM_EMULATOR"
  - response_contains: "a.img"
  - config_value:
      key: "BOOT_FEATURE"
      value: "ROM_EMULATOR"
"#;
        let script: HostScript = serde_yaml::from_str(yaml).unwrap();
        assert!(script.validate().is_ok());
        assert_eq!(script.steps.len(), 3);
        assert_eq!(script.steps[1].index, Some(1));
        let floppy = script.steps[2].floppy.as_ref().unwrap();
        assert_eq!((floppy.tracks, floppy.sectors, floppy.sides), (80, 9, 2));
        assert_eq!(script.network.networks[0].auth_mode, 3);
        assert_eq!(script.assertions.len(), 3);
        assert!(matches!(
            script.assertions[2],
            HostAssertion::ConfigValue(_)
        ));
    }

    #[test]
    fn test_invalid_version() {
        let yaml = r#"
schema_version: "2.0"
inputs:
  sd_root: "sd"
limits:
  max_iterations_per_step: 5
steps:
  - command: list_roms
"#;
        let script: HostScript = serde_yaml::from_str(yaml).unwrap();
        let err = script.validate().unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  sd_root: "sd"
limits:
  max_iterations_per_step: 0
steps:
  - command: list_roms
"#;
        let script: HostScript = serde_yaml::from_str(yaml).unwrap();
        let err = script.validate().unwrap_err();
        assert!(err.to_string().contains("max_iterations_per_step"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  sd_root: "sd"
limits:
  max_iterations_per_step: 5
steps:
  - command: list_roms
    bogus: 1
"#;
        assert!(serde_yaml::from_str::<HostScript>(yaml).is_err());
    }
}
