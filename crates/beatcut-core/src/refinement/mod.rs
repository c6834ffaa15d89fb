//! Refinement commands and their fold into `SynthesisParams`.
//!
//! Commands never touch a timeline. They only change the inputs of the next
//! synthesis, so re-synthesizing with the same params is idempotent.
//!
//! The fold is order independent: pacing multipliers multiply, energy biases
//! add, tags and exclusions are set unions, and transition adjustments that
//! disagree on style within one batch are all dropped.

pub mod translator;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{AssetId, ScoredMediaAsset, SynthesisParams, TransitionStyle};

pub use translator::RuleBasedTranslator;

/// Lower clamp for `speed_multiplier` and the transition multiplier.
pub const MIN_MULTIPLIER: f64 = 0.25;
/// Upper clamp for `speed_multiplier` and the transition multiplier.
pub const MAX_MULTIPLIER: f64 = 4.0;

/// A structured parameter mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefinementCommand {
    AdjustPacing {
        speed_multiplier: f64,
    },
    AdjustTransitions {
        style: TransitionStyle,
        #[serde(default = "unit_multiplier")]
        duration_multiplier: f64,
    },
    IncludeTag {
        tag: String,
    },
    ExcludeAsset {
        asset_id: AssetId,
    },
    RebalanceEnergy {
        bias: f64,
    },
}

fn unit_multiplier() -> f64 {
    1.0
}

/// Command kinds accepted by [`parse_commands`].
pub const COMMAND_KINDS: [&str; 5] = [
    "adjust_pacing",
    "adjust_transitions",
    "include_tag",
    "exclude_asset",
    "rebalance_energy",
];

impl RefinementCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdjustPacing { .. } => "adjust_pacing",
            Self::AdjustTransitions { .. } => "adjust_transitions",
            Self::IncludeTag { .. } => "include_tag",
            Self::ExcludeAsset { .. } => "exclude_asset",
            Self::RebalanceEnergy { .. } => "rebalance_energy",
        }
    }
}

/// Why a command was dropped. Never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum RefinementWarning {
    /// The command cannot be honored as asked.
    Conflict {
        command: RefinementCommand,
        reason: String,
    },
    /// The translator produced a kind this engine does not know.
    Unknown { kind: String },
    /// The command is well-formed but its values are out of range, or it
    /// could not be decoded at all.
    Invalid { reason: String },
}

impl fmt::Display for RefinementWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { command, reason } => {
                write!(f, "conflicting {} dropped: {reason}", command.kind())
            }
            Self::Unknown { kind } => write!(f, "unknown command kind '{kind}' dropped"),
            Self::Invalid { reason } => write!(f, "invalid command dropped: {reason}"),
        }
    }
}

/// Result of folding a batch of commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub params: SynthesisParams,
    pub applied: Vec<RefinementCommand>,
    pub warnings: Vec<RefinementWarning>,
}

/// Fold `commands` into a copy of `params`.
///
/// `pool` is the request's asset view; excluding a required or unknown asset
/// is reported as a conflict and ignored.
pub fn apply_commands(
    params: &SynthesisParams,
    commands: &[RefinementCommand],
    pool: &[ScoredMediaAsset],
) -> RefinementOutcome {
    let mut next = params.clone();
    let mut applied = Vec::new();
    let mut warnings = Vec::new();

    let mut speeds: Vec<f64> = Vec::new();
    let mut biases: Vec<f64> = Vec::new();
    let mut transitions: Vec<&RefinementCommand> = Vec::new();

    for command in commands {
        match command {
            RefinementCommand::AdjustPacing { speed_multiplier } => {
                if !speed_multiplier.is_finite() || *speed_multiplier <= 0.0 {
                    warnings.push(RefinementWarning::Invalid {
                        reason: format!("speed_multiplier must be > 0, got {speed_multiplier}"),
                    });
                    continue;
                }
                speeds.push(*speed_multiplier);
                applied.push(command.clone());
            }
            RefinementCommand::RebalanceEnergy { bias: delta } => {
                if !delta.is_finite() || !(-1.0..=1.0).contains(delta) {
                    warnings.push(RefinementWarning::Invalid {
                        reason: format!("energy bias must be in [-1, 1], got {delta}"),
                    });
                    continue;
                }
                biases.push(*delta);
                applied.push(command.clone());
            }
            RefinementCommand::AdjustTransitions {
                duration_multiplier,
                ..
            } => {
                if !duration_multiplier.is_finite() || *duration_multiplier <= 0.0 {
                    warnings.push(RefinementWarning::Invalid {
                        reason: format!(
                            "duration_multiplier must be > 0, got {duration_multiplier}"
                        ),
                    });
                    continue;
                }
                transitions.push(command);
            }
            RefinementCommand::IncludeTag { tag } => {
                let tag = tag.trim();
                if tag.is_empty() {
                    warnings.push(RefinementWarning::Invalid {
                        reason: "empty tag".to_string(),
                    });
                    continue;
                }
                next.preferred_tags.insert(tag.to_string());
                applied.push(command.clone());
            }
            RefinementCommand::ExcludeAsset { asset_id } => {
                match pool.iter().find(|a| &a.id == asset_id) {
                    None => warnings.push(RefinementWarning::Conflict {
                        command: command.clone(),
                        reason: format!("asset {asset_id} is not in the pool"),
                    }),
                    Some(asset) if asset.required => {
                        warnings.push(RefinementWarning::Conflict {
                            command: command.clone(),
                            reason: format!("asset {asset_id} is required"),
                        })
                    }
                    Some(_) => {
                        next.excluded_assets.insert(asset_id.clone());
                        applied.push(command.clone());
                    }
                }
            }
        }
    }

    if !speeds.is_empty() {
        let speed: f64 = sorted(speeds).iter().product();
        next.speed_multiplier =
            (params.speed_multiplier * speed).clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);
    }
    if !biases.is_empty() {
        let bias: f64 = sorted(biases).iter().sum();
        next.energy_bias = (params.energy_bias + bias).clamp(-1.0, 1.0);
    }
    fold_transitions(&mut next, params, &transitions, &mut applied, &mut warnings);

    RefinementOutcome {
        params: next,
        applied,
        warnings,
    }
}

/// Float folds are only order independent over a fixed operand order.
fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}

fn fold_transitions(
    next: &mut SynthesisParams,
    params: &SynthesisParams,
    transitions: &[&RefinementCommand],
    applied: &mut Vec<RefinementCommand>,
    warnings: &mut Vec<RefinementWarning>,
) {
    let mut style: Option<TransitionStyle> = None;
    let mut multipliers: Vec<f64> = Vec::new();
    let mut disagree = false;
    for command in transitions {
        if let RefinementCommand::AdjustTransitions {
            style: s,
            duration_multiplier,
        } = command
        {
            disagree |= style.is_some_and(|prev| prev != *s);
            style = Some(*s);
            multipliers.push(*duration_multiplier);
        }
    }

    if disagree {
        warnings.extend(transitions.iter().map(|c| RefinementWarning::Conflict {
            command: (*c).clone(),
            reason: "transition styles disagree within one batch".to_string(),
        }));
        return;
    }
    if let Some(style) = style {
        let multiplier: f64 = sorted(multipliers).iter().product();
        next.transition_style = Some(style);
        next.transition_duration_multiplier = (params.transition_duration_multiplier
            * multiplier)
            .clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);
        applied.extend(transitions.iter().map(|c| (*c).clone()));
    }
}

/// Decode translator output into commands.
///
/// Values with an unrecognised `kind` become [`RefinementWarning::Unknown`];
/// values that fail to decode become [`RefinementWarning::Invalid`].
pub fn parse_commands(
    values: &[serde_json::Value],
) -> (Vec<RefinementCommand>, Vec<RefinementWarning>) {
    let mut commands = Vec::new();
    let mut warnings = Vec::new();
    for value in values {
        let Some(kind) = value.get("kind").and_then(|k| k.as_str()) else {
            warnings.push(RefinementWarning::Invalid {
                reason: format!("missing command kind in {value}"),
            });
            continue;
        };
        if !COMMAND_KINDS.contains(&kind) {
            warnings.push(RefinementWarning::Unknown {
                kind: kind.to_string(),
            });
            continue;
        }
        match serde_json::from_value::<RefinementCommand>(value.clone()) {
            Ok(command) => commands.push(command),
            Err(e) => warnings.push(RefinementWarning::Invalid {
                reason: format!("{kind}: {e}"),
            }),
        }
    }
    (commands, warnings)
}
