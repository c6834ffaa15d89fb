//! Synthesis parameters mutated by refinement commands.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::asset::AssetId;
use super::error::ValidationError;

pub const DEFAULT_BEATS_PER_CLIP: u32 = 4;
pub const DEFAULT_MIN_CLIP_DURATION: f64 = 0.5;
pub const DEFAULT_CLUSTER_GAP_SECS: f64 = 3600.0;
pub const DEFAULT_MAX_BLEND_WINDOW: f64 = 0.5;

/// Transition used at a segment's out point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    Cut,
    Crossfade,
    Fade,
}

impl std::fmt::Display for TransitionStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cut => write!(f, "cut"),
            Self::Crossfade => write!(f, "crossfade"),
            Self::Fade => write!(f, "fade"),
        }
    }
}

/// Inputs to one synthesizer invocation besides pool, audio and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisParams {
    pub speed_multiplier: f64,
    pub beats_per_clip: u32,
    pub min_clip_duration: f64,
    pub cluster_gap_secs: f64,
    /// Added to every energy sample before pacing.
    pub energy_bias: f64,
    pub preferred_tags: BTreeSet<String>,
    pub excluded_assets: BTreeSet<AssetId>,
    /// `None` keeps the crossfade default.
    pub transition_style: Option<TransitionStyle>,
    pub transition_duration_multiplier: f64,
    pub max_blend_window: f64,
    pub snap_to_beats: bool,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            beats_per_clip: DEFAULT_BEATS_PER_CLIP,
            min_clip_duration: DEFAULT_MIN_CLIP_DURATION,
            cluster_gap_secs: DEFAULT_CLUSTER_GAP_SECS,
            energy_bias: 0.0,
            preferred_tags: BTreeSet::new(),
            excluded_assets: BTreeSet::new(),
            transition_style: None,
            transition_duration_multiplier: 1.0,
            max_blend_window: DEFAULT_MAX_BLEND_WINDOW,
            snap_to_beats: false,
        }
    }
}

impl SynthesisParams {
    /// The transition placed between two segments.
    pub fn effective_transition(&self) -> TransitionStyle {
        self.transition_style.unwrap_or(TransitionStyle::Crossfade)
    }

    /// Keep exclusions and tag preferences, restore pacing and look from `base`.
    pub fn reset_look(&self, base: &SynthesisParams) -> SynthesisParams {
        SynthesisParams {
            excluded_assets: self.excluded_assets.clone(),
            preferred_tags: self.preferred_tags.clone(),
            ..base.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        fn positive(name: &'static str, v: f64) -> Result<(), ValidationError> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ValidationError::Param {
                    name,
                    reason: format!("must be finite and > 0, got {v}"),
                })
            }
        }

        positive("speed_multiplier", self.speed_multiplier)?;
        positive("min_clip_duration", self.min_clip_duration)?;
        positive("cluster_gap_secs", self.cluster_gap_secs)?;
        positive(
            "transition_duration_multiplier",
            self.transition_duration_multiplier,
        )?;
        if !self.max_blend_window.is_finite() || self.max_blend_window < 0.0 {
            return Err(ValidationError::Param {
                name: "max_blend_window",
                reason: format!("must be finite and >= 0, got {}", self.max_blend_window),
            });
        }
        if self.beats_per_clip == 0 {
            return Err(ValidationError::Param {
                name: "beats_per_clip",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.energy_bias.is_finite() || !(-1.0..=1.0).contains(&self.energy_bias) {
            return Err(ValidationError::Param {
                name: "energy_bias",
                reason: format!("must be in [-1, 1], got {}", self.energy_bias),
            });
        }
        Ok(())
    }
}
