//! Configuration resolution for the generator
//!
//! Settings follow a CLI → environment → TOML → default priority order.
//! The inference server command is the one knob with no compiled
//! default, so resolution fails with pointers to all three sources when
//! it is missing.

use crate::error::{GeneratorError, Result};
use crate::models::difficulty::DifficultySelector;
use crate::models::song::{self, Model, RANDOM_ENVIRONMENT};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default lighting intensity knob position
pub const DEFAULT_LIGHTS_INTENSITY: u8 = 9;
/// Beatmap schema version written when none is configured
pub const DEFAULT_FORMAT_VERSION: &str = "2.0.0";

/// Command-line interface
///
/// Tiered options are `Option` here; defaults are applied during
/// [`Settings::resolve`] so a TOML value can still win over a compiled
/// default.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "mapsynth",
    about = "Generate playable beatmap bundles from audio files",
    version
)]
pub struct Cli {
    /// Audio files and/or directories to process
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory finished bundles are written to
    #[arg(long, env = "MAPSYNTH_OUT_DIR")]
    pub out_dir: Option<PathBuf>,

    /// Scratch directory for in-progress jobs
    #[arg(long, env = "MAPSYNTH_WORKING_DIR")]
    pub working_dir: Option<PathBuf>,

    /// Difficulty tier to generate (easy, normal, hard, expert, expertplus, all)
    #[arg(long)]
    pub difficulty: Option<DifficultySelector>,

    /// Note-generation model
    #[arg(long, value_enum)]
    pub model: Option<Model>,

    /// Stage environment name, or RANDOM for a per-song pick
    #[arg(long)]
    pub environment: Option<String>,

    /// Lighting intensity, 1 (sparse) to 10 (busy)
    #[arg(long)]
    pub lights_intensity: Option<u8>,

    /// Beatmap schema version string
    #[arg(long)]
    pub format_version: Option<String>,

    /// Seed for deterministic per-song choices
    #[arg(long)]
    pub seed: Option<u64>,

    /// Maximum concurrent jobs (default: memory-aware core count)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Program that starts the inference server
    #[arg(long)]
    pub server_cmd: Option<String>,

    /// Extra argument appended to the server command (repeatable)
    #[arg(long = "server-arg")]
    pub server_args: Vec<String>,

    /// Explicit cover image used for every bundle
    #[arg(long)]
    pub album_art: Option<PathBuf>,

    /// Also check for zip archives when deciding a song is already done
    #[arg(long)]
    pub zip: bool,

    /// TOML config file path
    #[arg(long, env = "MAPSYNTH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// TOML configuration file contents
///
/// All fields optional; absent fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub out_dir: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub difficulty: Option<String>,
    pub model: Option<Model>,
    pub environment: Option<String>,
    pub lights_intensity: Option<u8>,
    pub format_version: Option<String>,
    pub seed: Option<u64>,
    pub jobs: Option<usize>,
    pub server_command: Option<Vec<String>>,
}

impl TomlConfig {
    /// Load from an explicit path (error if missing) or the default
    /// platform location (silently absent)
    pub fn load(explicit: Option<&Path>) -> Result<TomlConfig> {
        let path = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(GeneratorError::Config(format!(
                        "config file not found: {}",
                        p.display()
                    )));
                }
                p.to_path_buf()
            }
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(TomlConfig::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| GeneratorError::Config(format!("read {}: {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| GeneratorError::Config(format!("parse {}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Default config file location for the platform
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mapsynth").join("config.toml"))
}

/// Fully resolved runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub inputs: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub working_dir: PathBuf,
    pub difficulty: DifficultySelector,
    pub model: Model,
    /// Either a concrete environment name or `RANDOM`
    pub environment: String,
    pub lights_intensity: u8,
    pub format_version: String,
    /// Base seed; per-job seeds are derived from it by index
    pub seed: u64,
    /// Explicit worker-count override
    pub jobs: Option<usize>,
    /// Program plus arguments that start the inference server
    pub server_command: Vec<String>,
    pub album_art: Option<PathBuf>,
    pub zip_output: bool,
}

impl Settings {
    /// Resolve settings from the CLI, process environment, and TOML
    pub fn resolve(cli: Cli) -> Result<Settings> {
        let toml_config = TomlConfig::load(cli.config.as_deref())?;
        let env_server_cmd = std::env::var("MAPSYNTH_SERVER_CMD").ok();
        Self::from_sources(cli, toml_config, env_server_cmd)
    }

    /// Pure resolution step, split out so tests can inject sources
    pub fn from_sources(
        cli: Cli,
        toml_config: TomlConfig,
        env_server_cmd: Option<String>,
    ) -> Result<Settings> {
        let server_command = resolve_server_command(
            cli.server_cmd.as_deref(),
            &cli.server_args,
            env_server_cmd.as_deref(),
            toml_config.server_command.as_deref(),
        )?;

        let difficulty = match cli.difficulty {
            Some(d) => d,
            None => match &toml_config.difficulty {
                Some(raw) => raw
                    .parse::<DifficultySelector>()
                    .map_err(GeneratorError::Config)?,
                None => DifficultySelector::All,
            },
        };

        let environment = cli
            .environment
            .or(toml_config.environment)
            .unwrap_or_else(|| RANDOM_ENVIRONMENT.to_string());
        if !environment.eq_ignore_ascii_case(RANDOM_ENVIRONMENT)
            && !song::ENVIRONMENTS.contains(&environment.as_str())
        {
            return Err(GeneratorError::Config(format!(
                "unknown environment '{}' (use RANDOM or one of: {})",
                environment,
                song::ENVIRONMENTS.join(", ")
            )));
        }

        let lights_intensity = cli
            .lights_intensity
            .or(toml_config.lights_intensity)
            .unwrap_or(DEFAULT_LIGHTS_INTENSITY);
        if !(1..=10).contains(&lights_intensity) {
            return Err(GeneratorError::Config(format!(
                "lights intensity must be between 1 and 10, got {}",
                lights_intensity
            )));
        }

        let jobs = cli.jobs.or(toml_config.jobs);
        if jobs == Some(0) {
            return Err(GeneratorError::Config(
                "--jobs must be at least 1".to_string(),
            ));
        }

        let out_dir = cli
            .out_dir
            .or(toml_config.out_dir)
            .unwrap_or_else(default_out_dir);
        let working_dir = cli
            .working_dir
            .or(toml_config.working_dir)
            .unwrap_or_else(|| std::env::temp_dir().join("mapsynth"));

        Ok(Settings {
            inputs: cli.inputs,
            out_dir,
            working_dir,
            difficulty,
            model: cli.model.or(toml_config.model).unwrap_or(Model::Random),
            environment,
            lights_intensity,
            format_version: cli
                .format_version
                .or(toml_config.format_version)
                .unwrap_or_else(|| DEFAULT_FORMAT_VERSION.to_string()),
            seed: cli.seed.or(toml_config.seed).unwrap_or_else(rand::random),
            jobs,
            server_command,
            album_art: cli.album_art,
            zip_output: cli.zip,
        })
    }

    /// Minimum seconds between primary lighting changes, derived from
    /// the intensity knob (higher knob, shorter interval)
    pub fn color_swap_offset_seconds(&self) -> f64 {
        11.5 - f64::from(self.lights_intensity)
    }
}

/// OS-dependent default output directory
fn default_out_dir() -> PathBuf {
    dirs::audio_dir()
        .map(|d| d.join("mapsynth"))
        .unwrap_or_else(|| PathBuf::from("mapsynth-out"))
}

/// Resolve the inference server launch command
///
/// Priority: CLI → environment → TOML. Repeatable `--server-arg`
/// values are appended to whichever source wins.
fn resolve_server_command(
    cli_cmd: Option<&str>,
    cli_args: &[String],
    env_cmd: Option<&str>,
    toml_cmd: Option<&[String]>,
) -> Result<Vec<String>> {
    let mut sources = Vec::new();
    if cli_cmd.map(|c| !c.trim().is_empty()).unwrap_or(false) {
        sources.push("command line");
    }
    if env_cmd.map(|c| !c.trim().is_empty()).unwrap_or(false) {
        sources.push("environment");
    }
    if toml_cmd.map(|c| !c.is_empty()).unwrap_or(false) {
        sources.push("TOML");
    }
    if sources.len() > 1 {
        warn!(
            "Inference server command found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    let mut command: Vec<String> = if let Some(cmd) = cli_cmd.filter(|c| !c.trim().is_empty()) {
        vec![cmd.to_string()]
    } else if let Some(cmd) = env_cmd.filter(|c| !c.trim().is_empty()) {
        cmd.split_whitespace().map(str::to_string).collect()
    } else if let Some(cmd) = toml_cmd.filter(|c| !c.is_empty()) {
        cmd.to_vec()
    } else {
        return Err(GeneratorError::Config(
            "inference server command not configured. Please configure using one of:\n\
             1. Command line: --server-cmd python --server-arg beatmap_api.py\n\
             2. Environment: MAPSYNTH_SERVER_CMD=\"python beatmap_api.py\"\n\
             3. TOML config: ~/.config/mapsynth/config.toml (server_command = [\"python\", \"beatmap_api.py\"])"
                .to_string(),
        ));
    };

    command.extend(cli_args.iter().cloned());
    Ok(command)
}
