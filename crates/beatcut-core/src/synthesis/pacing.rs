//! Energy-driven pacing over the beat grid.
//!
//! `clip = base * (1.5 - energy) * speed`, floored at the minimum clip
//! length, where `base = beat_period * beats_per_clip`. High energy gives
//! short clips, quiet passages hold longer.

use crate::domain::timeline::POSITION_EPSILON;
use crate::domain::{AudioRhythmProfile, SynthesisParams};

/// Base clip length in seconds before energy modulation.
pub fn base_clip_duration(audio: &AudioRhythmProfile, params: &SynthesisParams) -> f64 {
    audio.beat_period() * f64::from(params.beats_per_clip)
}

/// Clip length for one step.
pub fn clip_duration(base: f64, energy: f64, params: &SynthesisParams) -> f64 {
    (base * (1.5 - energy) * params.speed_multiplier).max(params.min_clip_duration)
}

/// Move the cut at `position + clip` onto the nearest beat when that beat is
/// within a quarter beat period and keeps the clip above the minimum.
pub fn snap_to_beat(
    audio: &AudioRhythmProfile,
    position: f64,
    clip: f64,
    params: &SynthesisParams,
) -> f64 {
    let end = position + clip;
    match audio.nearest_beat(end) {
        Some(beat)
            if (beat - end).abs() <= audio.beat_period() / 4.0
                && beat - position >= params.min_clip_duration =>
        {
            beat - position
        }
        _ => clip,
    }
}

/// Fit the step at `position` to the target.
///
/// An overlong step is trimmed to the remainder. A step that would leave less
/// than `min_clip` before the target is stretched to land on it instead.
pub fn land_on_target(position: f64, clip: f64, target: f64, min_clip: f64) -> f64 {
    let remaining = target - position;
    if remaining <= 0.0 {
        return clip;
    }
    if clip >= remaining || remaining - clip < min_clip {
        remaining
    } else {
        clip
    }
}

/// Whether the walk at `position` is done with the target.
///
/// A remainder shorter than `min_clip` counts as reached once anything has
/// been placed; it only arises after a short video ran out of source.
pub fn target_reached(position: f64, target: f64, min_clip: f64) -> bool {
    let remaining = target - position;
    remaining <= POSITION_EPSILON || (position > POSITION_EPSILON && remaining < min_clip)
}

/// Whether the beat grid still offers a cut point at or after `position`.
pub fn beats_remaining(audio: &AudioRhythmProfile, position: f64) -> bool {
    audio.beat_at_or_after(position - POSITION_EPSILON).is_some()
}

/// Step count of an asset-free walk to `target`.
pub fn estimate_steps(audio: &AudioRhythmProfile, target: f64, params: &SynthesisParams) -> usize {
    let base = base_clip_duration(audio, params);
    let mut position = 0.0;
    let mut steps = 0usize;
    while !target_reached(position, target, params.min_clip_duration)
        && beats_remaining(audio, position)
    {
        let energy = audio.energy_at(position, params.energy_bias);
        let mut clip = clip_duration(base, energy, params);
        if params.snap_to_beats {
            clip = snap_to_beat(audio, position, clip, params);
        }
        clip = land_on_target(position, clip, target, params.min_clip_duration);
        position += clip;
        steps += 1;
    }
    steps
}

/// Split `steps` across clusters.
///
/// Each cluster receives its required count, then the rest is shared by
/// largest remainder weighted by optional asset counts. A cluster never gets
/// more steps than it has assets unless `steps` exceeds the pool.
pub fn allocate_quotas(steps: usize, sizes: &[usize], required: &[usize]) -> Vec<usize> {
    let mut quotas: Vec<usize> = required.to_vec();
    let required_total: usize = required.iter().sum();
    let remaining = steps.saturating_sub(required_total);
    let weights: Vec<usize> = sizes
        .iter()
        .zip(required)
        .map(|(s, r)| s.saturating_sub(*r))
        .collect();
    let weight_total: usize = weights.iter().sum();
    if remaining == 0 || weight_total == 0 {
        return quotas;
    }

    let capped = remaining.min(weight_total);
    let mut given = 0usize;
    let mut remainders: Vec<(usize, usize)> = Vec::with_capacity(weights.len());
    for (i, &w) in weights.iter().enumerate() {
        let share = capped * w;
        quotas[i] += share / weight_total;
        given += share / weight_total;
        remainders.push((share % weight_total, i));
    }
    // Largest remainder first, earlier cluster on ties.
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, i) in remainders.iter().take(capped - given) {
        quotas[i] += 1;
    }
    quotas
}
