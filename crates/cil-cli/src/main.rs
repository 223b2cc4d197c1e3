//! `cil` – command line front end for the conditional imitation engine.
//!
//! ```text
//! cil init-weights --out weights.cil --seed 7
//! cil inspect --weights weights.cil
//! cil infer --frame frame.bgr --frame-width 800 --frame-height 600 --speed 4.2 --command 5
//! cil config --write
//! ```
//!
//! Command output (JSON) goes to stdout; logs and status lines go to stderr.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use cil_hal::{CameraFrame, PixelLayout, normalize_frame};
use cil_perception::ParamSet;
use cil_runtime::branch::branch_for;
use cil_runtime::{ImitationAgent, InferenceEngine, infer_batch_with_timeout};
use cil_types::{CilError, Command, CommandCode, ControlCommand, Observation};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "cil", version)]
#[command(about = "Conditional imitation learning inference", long_about = None)]
struct Cli {
    /// Config file to use instead of `~/.cil/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a freshly initialised parameter set.
    InitWeights {
        /// Output path; defaults to the configured weights path.
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Summarise a parameter set and check it against the configured network.
    Inspect {
        #[arg(long)]
        weights: Option<PathBuf>,
    },

    /// Run one inference on a raw frame and print the control as JSON.
    Infer {
        #[arg(long)]
        weights: Option<PathBuf>,

        /// Raw interleaved pixel bytes, BGR unless `--rgb`.
        #[arg(long)]
        frame: PathBuf,

        #[arg(long)]
        frame_width: u32,

        #[arg(long)]
        frame_height: u32,

        #[arg(long)]
        rgb: bool,

        #[arg(long)]
        speed: f32,

        /// Navigation command code (2 follow lane, 3 left, 4 right, 5 straight).
        #[arg(long, allow_hyphen_values = true)]
        command: CommandCode,
    },

    /// Print the effective configuration.
    Config {
        /// Also write it to the config file.
        #[arg(long)]
        write: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Cil(#[from] CilError),

    #[error("{0}")]
    Config(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}

fn main() -> ExitCode {
    let _guard = cil_runtime::init_tracing("cil");
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let cfg = config::load(cli.config.as_deref()).map_err(CliError::Config)?;

    match cli.command {
        Commands::InitWeights { out, seed } => {
            let path = out.unwrap_or_else(|| cfg.weights_path.clone());
            let params = init_weights(&cfg, &path, seed)?;
            eprintln!(
                "  {} {} parameters written to {}",
                "✓".green().bold(),
                params.parameter_count(),
                path.display().to_string().bold()
            );
        }
        Commands::Inspect { weights } => {
            let path = weights.unwrap_or_else(|| cfg.weights_path.clone());
            print_json(&inspect(&cfg, &path)?)?;
        }
        Commands::Infer {
            weights,
            frame,
            frame_width,
            frame_height,
            rgb,
            speed,
            command,
        } => {
            let path = weights.unwrap_or_else(|| cfg.weights_path.clone());
            let layout = if rgb { PixelLayout::Rgb } else { PixelLayout::Bgr };
            let data =
                std::fs::read(&frame).map_err(|source| CliError::Io { path: frame, source })?;
            let frame = CameraFrame::new(frame_width, frame_height, layout, data)?;
            print_json(&infer(&cfg, &path, &frame, speed, command)?)?;
        }
        Commands::Config { write } => {
            if write {
                let path = cli.config.clone().unwrap_or_else(config::config_path);
                config::save_to(&cfg, &path).map_err(CliError::Config)?;
                eprintln!(
                    "  {} Config saved to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                );
            }
            print_json(&cfg)?;
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn init_weights(cfg: &Config, path: &Path, seed: u64) -> Result<ParamSet, CliError> {
    let params = ParamSet::initialise(&cfg.engine.network_spec(), seed)?;
    params.save(path)?;
    info!(path = %path.display(), seed, "initialised weights");
    Ok(params)
}

#[derive(Debug, Serialize)]
struct Inspection {
    name: String,
    format_version: u32,
    tensors: usize,
    parameters: usize,
    image_width: usize,
    image_height: usize,
    /// `None` when the set fits the configured network.
    mismatch: Option<String>,
    commands: Vec<CommandRoute>,
}

/// Canonical raw code of a navigation command and the branch it selects.
#[derive(Debug, Serialize)]
struct CommandRoute {
    code: CommandCode,
    command: Command,
    branch: String,
}

fn inspect(cfg: &Config, path: &Path) -> Result<Inspection, CliError> {
    let params = ParamSet::load(path)?;
    let mismatch = params.validate(&cfg.engine.network_spec()).err().map(|e| e.to_string());
    Ok(Inspection {
        name: params.name.clone(),
        format_version: params.format_version,
        tensors: params.tensors.len(),
        parameters: params.parameter_count(),
        image_width: cfg.engine.image_width,
        image_height: cfg.engine.image_height,
        mismatch,
        commands: Command::ALL
            .into_iter()
            .map(|command| CommandRoute {
                code: command.code(),
                command,
                branch: branch_for(command).to_string(),
            })
            .collect(),
    })
}

/// Runs through the agent, or through the deadline wrapper when
/// `batch_timeout_ms` is configured.
fn infer(
    cfg: &Config,
    weights: &Path,
    frame: &CameraFrame,
    speed: f32,
    command: CommandCode,
) -> Result<ControlCommand, CliError> {
    let agent = ImitationAgent::from_weights(weights, &cfg.engine)?;

    let Some(timeout) = cfg.engine.batch_timeout() else {
        return Ok(agent.run_step(speed, command, frame)?);
    };

    let engine = Arc::clone(agent.engine());
    let (width, height) = engine.image_size();
    let obs = Observation::new(normalize_frame(frame, width, height)?, speed, command);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(CliError::Runtime)?;
    let mut controls = runtime.block_on(infer_batch_with_timeout(engine, vec![obs], timeout))?;
    controls.pop().ok_or_else(|| {
        CliError::Cil(CilError::Worker("empty result for a single observation".into()))
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Smallest image the standard conv stack accepts is 77x77.
    fn small_config(dir: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.weights_path = dir.join("weights.cil");
        cfg.engine.image_width = 80;
        cfg.engine.image_height = 80;
        cfg.engine.workers = 2;
        cfg
    }

    fn bgr_frame() -> CameraFrame {
        let (w, h) = (40u32, 30u32);
        let data = (0..w * h * 3).map(|i| (i % 251) as u8).collect();
        CameraFrame::new(w, h, PixelLayout::Bgr, data).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_infer_arguments() {
        let cli = Cli::try_parse_from([
            "cil",
            "infer",
            "--frame",
            "f.bgr",
            "--frame-width",
            "800",
            "--frame-height",
            "600",
            "--speed",
            "4.5",
            "--command",
            "5",
            "--rgb",
        ])
        .unwrap();
        match cli.command {
            Commands::Infer {
                frame_width,
                frame_height,
                rgb,
                command,
                weights,
                ..
            } => {
                assert_eq!((frame_width, frame_height), (800, 600));
                assert!(rgb);
                assert_eq!(command, 5);
                assert!(weights.is_none());
            }
            _ => panic!("expected infer"),
        }
    }

    #[test]
    fn init_weights_defaults_seed_to_zero() {
        let cli = Cli::try_parse_from(["cil", "init-weights", "--out", "w.cil"]).unwrap();
        assert!(matches!(cli.command, Commands::InitWeights { seed: 0, .. }));
    }

    #[test]
    fn init_then_inspect_reports_a_matching_set() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = small_config(dir.path());
        let written = init_weights(&cfg, &cfg.weights_path, 3).unwrap();

        let report = inspect(&cfg, &cfg.weights_path).unwrap();
        assert_eq!(report.name, "init-3");
        assert_eq!(report.parameters, written.parameter_count());
        assert_eq!(report.tensors, written.tensors.len());
        assert!(report.mismatch.is_none());
        let codes: Vec<_> = report.commands.iter().map(|r| (r.code, r.branch.as_str())).collect();
        assert_eq!(
            codes,
            vec![(2, "follow_lane"), (3, "left"), (4, "right"), (5, "straight")]
        );

        let mut other = cfg.clone();
        other.engine.image_width = 200;
        other.engine.image_height = 88;
        assert!(inspect(&other, &cfg.weights_path).unwrap().mismatch.is_some());
    }

    #[test]
    fn infer_produces_a_bounded_control() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = small_config(dir.path());
        init_weights(&cfg, &cfg.weights_path, 11).unwrap();

        let control = infer(&cfg, &cfg.weights_path, &bgr_frame(), 2.0, 5).unwrap();
        assert!((-1.0..=1.0).contains(&control.steer));
        assert!((0.0..=1.0).contains(&control.throttle));
        assert!((0.0..=1.0).contains(&control.brake));
        assert!(!control.hand_brake && !control.reverse);
    }

    #[test]
    fn infer_with_deadline_matches_direct_path() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = small_config(dir.path());
        init_weights(&cfg, &cfg.weights_path, 12).unwrap();
        let direct = infer(&cfg, &cfg.weights_path, &bgr_frame(), 8.0, 3).unwrap();

        let mut timed = cfg.clone();
        timed.engine.batch_timeout_ms = Some(60_000);
        let via_deadline = infer(&timed, &cfg.weights_path, &bgr_frame(), 8.0, 3).unwrap();
        assert_eq!(direct, via_deadline);
    }

    #[test]
    fn infer_rejects_unknown_command() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = small_config(dir.path());
        init_weights(&cfg, &cfg.weights_path, 13).unwrap();
        let err = infer(&cfg, &cfg.weights_path, &bgr_frame(), 1.0, 1).unwrap_err();
        assert!(matches!(err, CliError::Cil(CilError::UnknownCommand(1))));
    }

    #[test]
    fn infer_without_weights_is_a_load_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = small_config(dir.path());
        let err = infer(&cfg, &cfg.weights_path, &bgr_frame(), 1.0, 2).unwrap_err();
        assert!(matches!(err, CliError::Cil(CilError::Load(_))));
    }
}
