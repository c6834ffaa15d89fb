//! Beat-grid walk that turns a scored pool into a timeline.
//!
//! The walk is a pure function of `(pool, audio, target, params)`: no clocks,
//! no randomness, no hash-ordered iteration. Equal inputs give bit-identical
//! timelines.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    validate_pool, AssetId, AssetKind, AudioRhythmProfile, DurationShortfall, Result,
    ScoredMediaAsset, ShortfallKind, SynthesisParams, Timeline, TimelineSegment,
    TransitionStyle, ValidationError,
};
use crate::metrics::METRICS;
use crate::obs;

use super::cluster::cluster_assets;
use super::pacing::{
    allocate_quotas, base_clip_duration, beats_remaining, clip_duration, estimate_steps,
    land_on_target, snap_to_beat, target_reached,
};
use super::select::Selector;

/// Result of one synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SynthesisOutcome {
    /// Within ±10% of the target.
    Complete { timeline: Timeline },
    /// Best effort; the shortfall is also recorded in the timeline metadata.
    Shortfall {
        timeline: Timeline,
        shortfall: DurationShortfall,
    },
}

impl SynthesisOutcome {
    pub fn timeline(&self) -> &Timeline {
        match self {
            Self::Complete { timeline } | Self::Shortfall { timeline, .. } => timeline,
        }
    }

    pub fn into_timeline(self) -> Timeline {
        match self {
            Self::Complete { timeline } | Self::Shortfall { timeline, .. } => timeline,
        }
    }

    pub fn shortfall(&self) -> Option<&DurationShortfall> {
        match self {
            Self::Complete { .. } => None,
            Self::Shortfall { shortfall, .. } => Some(shortfall),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    TargetReached,
    BeatsExhausted,
    OutOfMaterial,
}

/// Validate every input the walk depends on.
pub fn validate_inputs(
    pool: &[ScoredMediaAsset],
    audio: &AudioRhythmProfile,
    target_duration: f64,
    params: &SynthesisParams,
) -> std::result::Result<(), ValidationError> {
    audio.validate()?;
    validate_pool(pool)?;
    params.validate()?;
    if !target_duration.is_finite() || target_duration <= 0.0 {
        return Err(ValidationError::TargetDuration(target_duration));
    }
    Ok(())
}

/// Synthesize a beat-aligned timeline.
///
/// # Errors
///
/// Returns `BeatcutError::InputInvariantViolation` for malformed audio,
/// assets, params or target. Missing the duration bound is not an error; it
/// yields [`SynthesisOutcome::Shortfall`].
///
/// A video shorter than its clip holds for its own length. The missing time
/// joins the next step's base and is scaled by that step's energy and speed.
pub fn synthesize(
    pool: &[ScoredMediaAsset],
    audio: &AudioRhythmProfile,
    target_duration: f64,
    params: &SynthesisParams,
) -> Result<SynthesisOutcome> {
    validate_inputs(pool, audio, target_duration, params)?;

    // Exclusions never remove required assets.
    let usable: Vec<&ScoredMediaAsset> = pool
        .iter()
        .filter(|a| a.required || !params.excluded_assets.contains(&a.id))
        .collect();
    let clusters = cluster_assets(&usable, params.cluster_gap_secs);

    let estimated = estimate_steps(audio, target_duration, params);
    let sizes: Vec<usize> = clusters.iter().map(|c| c.len()).collect();
    let required: Vec<usize> = clusters
        .iter()
        .map(|c| c.members.iter().filter(|&&m| usable[m].required).count())
        .collect();
    let quotas = allocate_quotas(estimated, &sizes, &required);

    let base = base_clip_duration(audio, params);
    let mut selector = Selector::new(&usable, &clusters, &params.preferred_tags);
    let mut segments: Vec<TimelineSegment> = Vec::new();
    let mut reused: Vec<AssetId> = Vec::new();
    let mut reused_seen: BTreeSet<&AssetId> = BTreeSet::new();
    let mut position = 0.0_f64;
    let mut carry = 0.0_f64;
    let mut cluster = 0usize;
    let mut taken = 0usize;
    let mut placed_past_target = false;

    let stop = loop {
        let reached = target_reached(position, target_duration, params.min_clip_duration);
        let beats_left = beats_remaining(audio, position);
        let required_only = reached || !beats_left;
        if required_only && selector.required_left() == 0 {
            break if reached {
                Stop::TargetReached
            } else {
                Stop::BeatsExhausted
            };
        }

        let pick = if required_only {
            selector.next_required(cluster)
        } else {
            while cluster + 1 < clusters.len() && taken >= quotas[cluster] {
                cluster += 1;
                taken = 0;
            }
            let in_quota = quotas.get(cluster).is_some_and(|&q| taken < q);
            let local = if in_quota {
                selector.candidate(cluster)
            } else {
                None
            };
            local.or_else(|| {
                selector
                    .least_used_cluster()
                    .and_then(|c| selector.candidate(c))
            })
        };
        let Some(idx) = pick else {
            break Stop::OutOfMaterial;
        };
        taken += 1;
        placed_past_target |= reached;

        let energy = audio.energy_at(position, params.energy_bias);
        let mut clip = clip_duration(base + carry, energy, params);
        carry = 0.0;
        if params.snap_to_beats {
            clip = snap_to_beat(audio, position, clip, params);
        }
        if !reached {
            clip = land_on_target(position, clip, target_duration, params.min_clip_duration);
        }

        let asset = usable[idx];
        let (duration, source_out) = match asset.kind {
            AssetKind::Image => (clip, None),
            AssetKind::Video if asset.duration < clip => {
                // Short source: hold what exists, carry the rest into the next base.
                carry = clip - asset.duration;
                (asset.duration, Some(asset.duration))
            }
            AssetKind::Video => (clip, Some(clip)),
        };

        if selector.record(idx, segments.len()) && reused_seen.insert(&asset.id) {
            reused.push(asset.id.clone());
        }
        segments.push(TimelineSegment {
            asset_id: asset.id.clone(),
            timeline_start: position,
            duration,
            source_in: 0.0,
            source_out,
            transition_out: TransitionStyle::Cut,
            blend_window: 0.0,
        });
        position += duration;
    };

    assign_transitions(&mut segments, params);

    let mut timeline = Timeline::new(segments, target_duration);
    timeline.metadata.reuse_permitted = !reused.is_empty();
    timeline.metadata.reused_assets = reused;
    timeline.metadata.cluster_count = clusters.len();

    debug!(
        estimated_steps = estimated,
        steps = timeline.segments.len(),
        stop = ?stop,
        "beat walk finished"
    );
    METRICS.inc_syntheses();

    if timeline.within_duration_bound() {
        obs::emit_timeline_synthesized(&timeline, None);
        return Ok(SynthesisOutcome::Complete { timeline });
    }

    let kind = if placed_past_target && timeline.total_duration > target_duration {
        ShortfallKind::RequiredOverrun
    } else if stop == Stop::BeatsExhausted {
        ShortfallKind::BeatsExhausted
    } else {
        ShortfallKind::InsufficientMaterial
    };
    let shortfall = DurationShortfall {
        target: target_duration,
        achieved: timeline.total_duration,
        kind,
    };
    timeline.metadata.shortfall = Some(shortfall.clone());
    obs::emit_timeline_synthesized(&timeline, Some(&shortfall));
    Ok(SynthesisOutcome::Shortfall {
        timeline,
        shortfall,
    })
}

/// Set out-transitions and blend windows.
///
/// The blend between `i` and `i + 1` is
/// `min(max_blend * multiplier, 0.5 * min(d_i, d_{i+1}))`; the last segment
/// always ends on a cut.
pub fn assign_transitions(segments: &mut [TimelineSegment], params: &SynthesisParams) {
    let style = params.effective_transition();
    let cap = params.max_blend_window * params.transition_duration_multiplier;
    let durations: Vec<f64> = segments.iter().map(|s| s.duration).collect();
    let last = segments.len().saturating_sub(1);

    for (i, seg) in segments.iter_mut().enumerate() {
        if i == last || style == TransitionStyle::Cut {
            seg.transition_out = TransitionStyle::Cut;
            seg.blend_window = 0.0;
            continue;
        }
        seg.transition_out = style;
        seg.blend_window = cap.min(0.5 * durations[i].min(durations[i + 1]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(duration: f64, energy: Vec<f64>) -> AudioRhythmProfile {
        let beats = (0..(duration * 2.0) as usize).map(|i| i as f64 * 0.5).collect();
        AudioRhythmProfile {
            duration,
            tempo_bpm: 120.0,
            beats,
            energy_curve: energy,
        }
    }

    fn images(n: usize) -> Vec<ScoredMediaAsset> {
        (0..n)
            .map(|i| ScoredMediaAsset::image(format!("img-{i}"), 0.5 + i as f64 * 0.01))
            .collect()
    }

    #[test]
    fn test_lands_on_target_with_enough_material() {
        let outcome =
            synthesize(&images(40), &audio(90.0, vec![0.5]), 60.0, &Default::default()).unwrap();
        let timeline = outcome.timeline();
        assert!(outcome.shortfall().is_none());
        assert!((timeline.total_duration - 60.0).abs() < 1e-9);
        assert_eq!(timeline.segments.len(), 30);
        assert!(!timeline.metadata.reuse_permitted);
    }

    #[test]
    fn test_short_video_carries_remainder() {
        let pool = vec![
            ScoredMediaAsset::video("short", 0.8, 0.9),
            ScoredMediaAsset::image("still", 0.5),
        ];
        let outcome =
            synthesize(&pool, &audio(30.0, vec![0.5]), 4.0, &Default::default()).unwrap();
        let segs = &outcome.timeline().segments;
        assert_eq!(segs[0].asset_id.as_str(), "short");
        assert!((segs[0].duration - 0.8).abs() < 1e-9);
        assert_eq!(segs[0].source_out, Some(0.8));
        // 1.2s of carry grows the next base from 2.0s to 3.2s, then lands on 4.0s.
        assert!((segs[1].duration - 3.2).abs() < 1e-9);
        assert!((outcome.timeline().total_duration - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_sliver_before_target_stretches_last_clip() {
        let outcome =
            synthesize(&images(20), &audio(90.0, vec![0.5]), 10.3, &Default::default()).unwrap();
        let timeline = outcome.timeline();
        assert!(outcome.shortfall().is_none());
        assert_eq!(timeline.segments.len(), 5);
        assert!((timeline.total_duration - 10.3).abs() < 1e-9);
        assert!((timeline.segments[4].duration - 2.3).abs() < 1e-9);
    }

    #[test]
    fn test_short_video_near_target_ends_the_walk() {
        let pool = vec![
            ScoredMediaAsset::image("a", 0.9),
            ScoredMediaAsset::image("b", 0.8),
            ScoredMediaAsset::video("short", 1.7, 0.7),
            ScoredMediaAsset::image("c", 0.6),
            ScoredMediaAsset::image("d", 0.5),
        ];
        let outcome =
            synthesize(&pool, &audio(30.0, vec![0.5]), 6.0, &Default::default()).unwrap();
        let ids: Vec<&str> = outcome
            .timeline()
            .segments
            .iter()
            .map(|s| s.asset_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "short"]);
        assert!(outcome.shortfall().is_none());
        assert!((outcome.timeline().total_duration - 5.7).abs() < 1e-9);
    }

    #[test]
    fn test_overrun_is_only_blamed_on_required_assets() {
        let mut pool = images(2);
        pool.extend((0..4).map(|i| ScoredMediaAsset::image(format!("must-{i}"), 0.1).required()));
        let outcome =
            synthesize(&pool, &audio(30.0, vec![0.5]), 2.0, &Default::default()).unwrap();
        let shortfall = outcome.shortfall().expect("overrun");
        assert_eq!(shortfall.kind, ShortfallKind::RequiredOverrun);
        assert_eq!(outcome.timeline().segments.len(), 4);
    }

    #[test]
    fn test_video_source_out_is_trimmed_to_clip() {
        let pool = vec![ScoredMediaAsset::video("long", 30.0, 0.9)];
        let outcome =
            synthesize(&pool, &audio(30.0, vec![0.5]), 2.0, &Default::default()).unwrap();
        let seg = &outcome.timeline().segments[0];
        assert_eq!(seg.source_in, 0.0);
        assert_eq!(seg.source_out, Some(2.0));
    }

    #[test]
    fn test_empty_pool_is_a_shortfall() {
        let outcome = synthesize(&[], &audio(30.0, vec![0.5]), 10.0, &Default::default()).unwrap();
        let shortfall = outcome.shortfall().expect("shortfall");
        assert_eq!(shortfall.kind, ShortfallKind::InsufficientMaterial);
        assert!(outcome.timeline().is_empty());
    }

    #[test]
    fn test_beats_running_out_is_reported() {
        let outcome =
            synthesize(&images(10), &audio(10.0, vec![0.5]), 60.0, &Default::default()).unwrap();
        let shortfall = outcome.shortfall().expect("shortfall");
        assert_eq!(shortfall.kind, ShortfallKind::BeatsExhausted);
        assert_eq!(
            outcome.timeline().metadata.shortfall.as_ref(),
            Some(shortfall)
        );
    }

    #[test]
    fn test_excluded_assets_are_skipped() {
        let mut params = SynthesisParams::default();
        params.excluded_assets.insert(AssetId::from("img-0"));
        let outcome = synthesize(&images(3), &audio(30.0, vec![0.5]), 6.0, &params).unwrap();
        assert_eq!(outcome.timeline().occurrences(&AssetId::from("img-0")), 0);
    }

    #[test]
    fn test_transitions_default_to_crossfade_with_capped_blend() {
        let outcome =
            synthesize(&images(5), &audio(30.0, vec![0.5]), 10.0, &Default::default()).unwrap();
        let segs = &outcome.timeline().segments;
        for seg in &segs[..segs.len() - 1] {
            assert_eq!(seg.transition_out, TransitionStyle::Crossfade);
            assert!((seg.blend_window - 0.5).abs() < 1e-9);
        }
        assert_eq!(segs.last().unwrap().transition_out, TransitionStyle::Cut);
    }

    #[test]
    fn test_blend_never_exceeds_half_shorter_segment() {
        let mut segs = vec![
            TimelineSegment {
                asset_id: AssetId::from("a"),
                timeline_start: 0.0,
                duration: 0.6,
                source_in: 0.0,
                source_out: None,
                transition_out: TransitionStyle::Cut,
                blend_window: 0.0,
            },
            TimelineSegment {
                asset_id: AssetId::from("b"),
                timeline_start: 0.6,
                duration: 3.0,
                source_in: 0.0,
                source_out: None,
                transition_out: TransitionStyle::Cut,
                blend_window: 0.0,
            },
        ];
        let params = SynthesisParams {
            transition_style: Some(TransitionStyle::Fade),
            transition_duration_multiplier: 4.0,
            ..Default::default()
        };
        assign_transitions(&mut segs, &params);
        assert_eq!(segs[0].transition_out, TransitionStyle::Fade);
        assert!((segs[0].blend_window - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_target_is_rejected() {
        let err = synthesize(&images(2), &audio(30.0, vec![0.5]), 0.0, &Default::default())
            .unwrap_err();
        assert!(err.to_string().contains("target duration"));
    }
}
