//! beatcut CLI
//!
//! Offline tooling around the composition engine. Every command reads and
//! writes plain JSON so it can sit in a shell pipeline.
//!
//! ## Commands
//!
//! - `validate`: Check a media pool and audio profile against the input invariants
//! - `synthesize`: Build one beat-aligned timeline
//! - `refine`: Fold refinement commands into synthesis params
//! - `translate`: Turn free-text feedback into refinement commands
//! - `verify-artifact`: Check a recorded composition against its digest
//! - `config`: Print the effective engine configuration

use anyhow::{Context, Result};
use beatcut_core::config::LogConfig;
use beatcut_core::{
    apply_commands, parse_commands, read_composition_artifact, synthesize, AudioRhythmProfile,
    EngineConfig, RuleBasedTranslator, ScoredMediaAsset, SynthesisParams,
};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "beatcut")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Beat-aligned timeline composition", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration file (TOML)
    #[arg(short, long, global = true, env = "BEATCUT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a media pool and audio profile without synthesizing
    Validate {
        /// Media pool (JSON array of scored assets)
        #[arg(short, long)]
        pool: PathBuf,

        /// Audio rhythm profile (JSON)
        #[arg(short, long)]
        audio: PathBuf,
    },

    /// Synthesize one timeline from a pool and an audio profile
    Synthesize {
        /// Media pool (JSON array of scored assets)
        #[arg(short, long)]
        pool: PathBuf,

        /// Audio rhythm profile (JSON)
        #[arg(short, long)]
        audio: PathBuf,

        /// Target duration in seconds
        #[arg(short, long)]
        target: f64,

        /// Synthesis params (JSON); defaults come from the config
        #[arg(long)]
        params: Option<PathBuf>,

        /// Write the outcome here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Apply refinement commands to synthesis params
    Refine {
        /// Media pool, used to check exclusions
        #[arg(short, long)]
        pool: PathBuf,

        /// Current synthesis params (JSON); defaults come from the config
        #[arg(long)]
        params: Option<PathBuf>,

        /// Refinement commands (JSON array)
        #[arg(short = 'm', long)]
        commands: PathBuf,
    },

    /// Translate free-text feedback into refinement commands
    Translate {
        /// Feedback text, e.g. "pacing feels slow, use crossfades"
        #[arg(short, long)]
        feedback: String,
    },

    /// Verify a recorded composition artifact against its digest
    VerifyArtifact {
        /// Request ID of the recorded composition
        #[arg(short, long)]
        request: String,

        /// Artifacts root directory
        #[arg(short, long, default_value = ".beatcut/compositions")]
        dir: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log = LogConfig {
        level: if cli.verbose {
            "debug".to_string()
        } else {
            config.log.level.clone()
        },
        json: cli.json || config.log.json,
    };
    beatcut_core::init_tracing(&log);

    match cli.command {
        Commands::Validate { pool, audio } => cmd_validate(&pool, &audio),
        Commands::Synthesize {
            pool,
            audio,
            target,
            params,
            out,
        } => cmd_synthesize(
            &config,
            &pool,
            &audio,
            target,
            params.as_deref(),
            out.as_deref(),
        ),
        Commands::Refine {
            pool,
            params,
            commands,
        } => cmd_refine(&config, &pool, params.as_deref(), &commands),
        Commands::Translate { feedback } => cmd_translate(&feedback),
        Commands::VerifyArtifact { request, dir } => cmd_verify_artifact(&request, &dir),
        Commands::Config => cmd_config(&config),
    }
}

/// File (if any), then `BEATCUT_*` env overrides, then validation.
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(p) => EngineConfig::load(p)
            .with_context(|| format!("Failed to load config from {:?}", p))?,
        None => EngineConfig::default(),
    };
    config
        .apply_env()
        .context("Invalid BEATCUT_* environment override")?;
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {} from {:?}", what, path))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Invalid {} JSON in {:?}", what, path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn params_or_default(config: &EngineConfig, path: Option<&Path>) -> Result<SynthesisParams> {
    match path {
        Some(p) => read_json(p, "params"),
        None => Ok(config.synthesis.params()),
    }
}

/// Validate pool and audio
fn cmd_validate(pool_path: &Path, audio_path: &Path) -> Result<()> {
    let pool: Vec<ScoredMediaAsset> = read_json(pool_path, "pool")?;
    let audio: AudioRhythmProfile = read_json(audio_path, "audio profile")?;

    beatcut_core::domain::validate_pool(&pool).context("Media pool rejected")?;
    audio.validate().context("Audio profile rejected")?;

    let required = pool.iter().filter(|a| a.required).count();
    println!(
        "OK: {} assets ({} required), {} beats at {:.1} BPM over {:.2}s",
        pool.len(),
        required,
        audio.beats.len(),
        audio.tempo_bpm,
        audio.duration
    );
    Ok(())
}

/// Synthesize a timeline
fn cmd_synthesize(
    config: &EngineConfig,
    pool_path: &Path,
    audio_path: &Path,
    target: f64,
    params_path: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let pool: Vec<ScoredMediaAsset> = read_json(pool_path, "pool")?;
    let audio: AudioRhythmProfile = read_json(audio_path, "audio profile")?;
    let params = params_or_default(config, params_path)?;

    let outcome = synthesize(&pool, &audio, target, &params).context("Synthesis failed")?;
    let timeline = outcome.timeline();
    let fingerprint = timeline.fingerprint()?;
    info!(
        segments = timeline.segments.len(),
        total_duration = timeline.total_duration,
        fingerprint = %fingerprint,
        "synthesized timeline"
    );
    if let Some(shortfall) = outcome.shortfall() {
        eprintln!("warning: {}", shortfall);
    }

    match output {
        Some(path) => {
            let json = serde_json::to_vec_pretty(&outcome)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write timeline to {:?}", path))?;
            println!(
                "Wrote {} segments ({:.2}s) to {:?}",
                timeline.segments.len(),
                timeline.total_duration,
                path
            );
            Ok(())
        }
        None => print_json(&outcome),
    }
}

/// Apply refinement commands
fn cmd_refine(
    config: &EngineConfig,
    pool_path: &Path,
    params_path: Option<&Path>,
    commands_path: &Path,
) -> Result<()> {
    let pool: Vec<ScoredMediaAsset> = read_json(pool_path, "pool")?;
    let params = params_or_default(config, params_path)?;
    let raw: Vec<serde_json::Value> = read_json(commands_path, "commands")?;

    let (commands, mut warnings) = parse_commands(&raw);
    let outcome = apply_commands(&params, &commands, &pool);
    warnings.extend(outcome.warnings);
    for warning in &warnings {
        eprintln!("warning: {}", warning);
    }
    info!(
        parsed = commands.len(),
        applied = outcome.applied.len(),
        warnings = warnings.len(),
        "refinement applied"
    );
    print_json(&outcome.params)
}

/// Translate feedback
fn cmd_translate(feedback: &str) -> Result<()> {
    let commands = RuleBasedTranslator::new().translate_text(feedback);
    if commands.is_empty() {
        eprintln!("No refinement commands recognised in feedback");
    }
    print_json(&commands)
}

/// Verify a recorded artifact
fn cmd_verify_artifact(request_id: &str, dir: &Path) -> Result<()> {
    let result = read_composition_artifact(request_id, dir)
        .with_context(|| format!("Failed to verify composition {}", request_id))?;
    println!(
        "Verified composition {}: {} after {} iteration(s), score {:.2}",
        result.request_id,
        result.outcome.label(),
        result.iterations_used,
        result.evaluation.overall_score
    );
    Ok(())
}

/// Print effective config
fn cmd_config(config: &EngineConfig) -> Result<()> {
    let text = toml::to_string_pretty(config).context("Failed to render config")?;
    print!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_synthesize_args() {
        let cli = Cli::try_parse_from([
            "beatcut",
            "synthesize",
            "--pool",
            "pool.json",
            "--audio",
            "audio.json",
            "--target",
            "60",
        ])
        .unwrap();
        match cli.command {
            Commands::Synthesize { target, params, .. } => {
                assert_eq!(target, 60.0);
                assert!(params.is_none());
            }
            _ => panic!("expected synthesize"),
        }
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.controller.max_iterations, 3);
    }

    #[test]
    fn test_read_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        std::fs::write(&path, b"not json").unwrap();
        let err = read_json::<Vec<ScoredMediaAsset>>(&path, "pool").unwrap_err();
        assert!(format!("{err}").contains("Invalid pool JSON"));
    }
}
