// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use rombridge_config::{ConfigStore, DeviceProfile, FileBackend, HostAssertion, HostScript};
use rombridge_core::services::{Clock, SystemClock};
use rombridge_core::sim::ManualClock;
use rombridge_core::BootOutcome;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

mod dir_storage;
mod session;

use session::{plan_step, resolve_script_path, Session, SessionReport, StepRecord};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Cartridge coprocessor configurator, driven from the host side",
    long_about = None
)]
struct Cli {
    /// Enable protocol-level tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deterministic, CI-friendly run of a host script (YAML).
    Run(RunArgs),

    /// Inspect or reset a configuration flash image.
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the host script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Device profile (YAML). Overrides the one named by the script.
    #[arg(short = 'p', long)]
    profile: Option<PathBuf>,

    /// Write the run result (JSON) to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for the values published in the shared window
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Sleep for real between loop iterations instead of advancing a
    /// simulated clock
    #[arg(long)]
    realtime: bool,
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the stored table.
    Show {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Overwrite the image with the factory defaults.
    Reset {
        #[arg(short, long)]
        image: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct RunResult {
    result_schema_version: String,
    status: String,
    steps_executed: usize,
    loop_iterations: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    boot: Option<BootOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    boot_feature: Option<String>,
    steps: Vec<StepRecord>,
    assertions: Vec<AssertionResult>,
    flash_hash: String,
    config: RunConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AssertionResult {
    assertion: HostAssertion,
    passed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunConfig {
    script: PathBuf,
    profile: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_script(args),
        Commands::Config(args) => run_config(args),
    }
}

fn run_config(args: ConfigArgs) -> ExitCode {
    match args.command {
        ConfigCommands::Show { image } => {
            match ConfigStore::load_from(&mut FileBackend::new(&image)) {
                Ok(store) => {
                    print!("{}", store.table());
                    ExitCode::from(EXIT_PASS)
                }
                Err(e) => {
                    error!("Failed to read {:?}: {:#}", image, e);
                    ExitCode::from(EXIT_CONFIG_ERROR)
                }
            }
        }
        ConfigCommands::Reset { image } => {
            match ConfigStore::defaults().persist(&mut FileBackend::new(&image)) {
                Ok(()) => {
                    info!("Wrote default configuration to {:?}", image);
                    ExitCode::from(EXIT_PASS)
                }
                Err(e) => {
                    error!("Failed to write {:?}: {:#}", image, e);
                    ExitCode::from(EXIT_RUNTIME_ERROR)
                }
            }
        }
    }
}

fn load_profile(
    args: &RunArgs,
    script: &HostScript,
) -> anyhow::Result<(DeviceProfile, Option<PathBuf>)> {
    let path = args.profile.clone().or_else(|| {
        script
            .inputs
            .profile
            .as_ref()
            .map(|p| resolve_script_path(&args.script, p))
    });
    match path {
        Some(path) => Ok((DeviceProfile::from_file(&path)?, Some(path))),
        None => Ok((DeviceProfile::default(), None)),
    }
}

fn run_script(args: RunArgs) -> ExitCode {
    let script = match HostScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => return config_error(&args, None, e),
    };

    let (profile, profile_path) = match load_profile(&args, &script) {
        Ok(p) => p,
        Err(e) => return config_error(&args, None, e),
    };

    let planned = match script
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| plan_step(step, i))
        .collect::<anyhow::Result<Vec<_>>>()
    {
        Ok(p) => p,
        Err(e) => return config_error(&args, profile_path, e),
    };

    let clock: Arc<dyn Clock> = if args.realtime {
        Arc::new(SystemClock::default())
    } else {
        Arc::new(ManualClock::new())
    };

    let session = match Session::prepare(&args.script, &script, &profile, clock, args.seed) {
        Ok(s) => s,
        Err(e) => return config_error(&args, profile_path, e),
    };

    info!(steps = planned.len(), script = ?args.script, "Running host script");
    let report = match session.run(&planned) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_result(&args, &error_result(&args, profile_path, msg));
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    let assertions: Vec<AssertionResult> = script
        .assertions
        .iter()
        .map(|assertion| AssertionResult {
            assertion: assertion.clone(),
            passed: evaluate(assertion, &report),
        })
        .collect();
    let passed = assertions.iter().all(|a| a.passed);
    for failed in assertions.iter().filter(|a| !a.passed) {
        error!(assertion = ?failed.assertion, "Assertion failed");
    }

    let result = RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: if passed { "pass" } else { "fail" }.to_string(),
        steps_executed: report.steps.len(),
        loop_iterations: report.iterations,
        message: None,
        boot: report.outcome,
        boot_feature: report.boot_feature(),
        assertions,
        flash_hash: report.flash_hash.clone(),
        steps: report.steps,
        config: RunConfig {
            script: args.script.clone(),
            profile: profile_path,
        },
    };
    write_result(&args, &result);

    if passed {
        info!("Host script passed");
        ExitCode::from(EXIT_PASS)
    } else {
        ExitCode::from(EXIT_ASSERT_FAIL)
    }
}

fn evaluate(assertion: &HostAssertion, report: &SessionReport) -> bool {
    match assertion {
        HostAssertion::BootFeature(a) => {
            report.boot_feature().as_deref() == Some(a.boot_feature.as_str())
        }
        HostAssertion::ResponseContains(a) => report.steps.iter().any(|s| {
            s.response
                .as_deref()
                .is_some_and(|r| r.contains(&a.response_contains))
        }),
        HostAssertion::ConfigValue(a) => report
            .config
            .find(&a.config_value.key)
            .is_some_and(|e| e.value.as_str() == a.config_value.value),
    }
}

fn error_result(args: &RunArgs, profile: Option<PathBuf>, message: String) -> RunResult {
    RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        steps_executed: 0,
        loop_iterations: 0,
        message: Some(message),
        boot: None,
        boot_feature: None,
        steps: vec![],
        assertions: vec![],
        flash_hash: String::new(),
        config: RunConfig {
            script: args.script.clone(),
            profile,
        },
    }
}

fn config_error(args: &RunArgs, profile: Option<PathBuf>, e: anyhow::Error) -> ExitCode {
    let msg = format!("{:#}", e);
    error!("{}", msg);
    write_result(args, &error_result(args, profile, msg));
    ExitCode::from(EXIT_CONFIG_ERROR)
}

fn write_result(args: &RunArgs, result: &RunResult) {
    let Some(path) = &args.output else { return };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!("Failed to create output directory {:?}: {}", parent, e);
            return;
        }
    }
    match std::fs::File::create(path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, result) {
                error!("Failed to write {:?}: {}", path, e);
            }
        }
        Err(e) => error!("Failed to create {:?}: {}", path, e),
    }
}
