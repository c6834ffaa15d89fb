//! Timeline model: ordered, contiguous segments with transitions.

use serde::{Deserialize, Serialize};

use super::asset::AssetId;
use super::digest::digest_json;
use super::error::Result;
use super::params::TransitionStyle;

/// Relative tolerance of the duration bound (±10% of target).
pub const DURATION_TOLERANCE: f64 = 0.10;

/// Absolute slack when comparing accumulated float positions.
pub const POSITION_EPSILON: f64 = 1e-6;

/// One contiguous span of the output referencing a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    pub asset_id: AssetId,
    pub timeline_start: f64,
    pub duration: f64,
    pub source_in: f64,
    /// Trim point inside the source; `None` for stills.
    pub source_out: Option<f64>,
    pub transition_out: TransitionStyle,
    /// Render-time overlap with the next segment, 0 for cuts.
    pub blend_window: f64,
}

impl TimelineSegment {
    pub fn end(&self) -> f64 {
        self.timeline_start + self.duration
    }
}

/// Why a timeline misses the ±10% duration bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortfallKind {
    /// Every usable asset (including permitted reuse) was spent.
    InsufficientMaterial,
    /// The walk ran past the last beat.
    BeatsExhausted,
    /// Placing every required asset overran the target.
    RequiredOverrun,
}

/// Reported when a timeline falls outside the duration bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationShortfall {
    pub target: f64,
    pub achieved: f64,
    pub kind: ShortfallKind,
}

impl std::fmt::Display for DurationShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}: achieved {:.2}s of {:.2}s target",
            self.kind, self.achieved, self.target
        )
    }
}

/// Facts about how a timeline was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineMetadata {
    /// The pool was smaller than the step count, so assets repeat.
    pub reuse_permitted: bool,
    pub reused_assets: Vec<AssetId>,
    pub cluster_count: usize,
    /// Set by the controller when a shortfall timeline was used anyway.
    pub degraded: bool,
    pub shortfall: Option<DurationShortfall>,
}

/// Ordered sequence of segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub segments: Vec<TimelineSegment>,
    pub total_duration: f64,
    pub target_duration: f64,
    pub metadata: TimelineMetadata,
}

impl Timeline {
    pub fn new(segments: Vec<TimelineSegment>, target_duration: f64) -> Self {
        let total_duration = segments.iter().map(|s| s.duration).sum();
        Self {
            segments,
            total_duration,
            target_duration,
            metadata: TimelineMetadata::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `total_duration` is within ±10% of the target.
    pub fn within_duration_bound(&self) -> bool {
        (self.total_duration - self.target_duration).abs()
            <= DURATION_TOLERANCE * self.target_duration + POSITION_EPSILON
    }

    /// Number of segments that reference `id`.
    pub fn occurrences(&self, id: &AssetId) -> usize {
        self.segments.iter().filter(|s| &s.asset_id == id).count()
    }

    /// Asset ids in timeline order, duplicates included.
    pub fn asset_ids(&self) -> impl Iterator<Item = &AssetId> {
        self.segments.iter().map(|s| &s.asset_id)
    }

    /// The segment covering timeline position `t`.
    pub fn segment_at(&self, t: f64) -> Option<&TimelineSegment> {
        self.segments
            .iter()
            .find(|s| s.timeline_start <= t && t < s.end())
    }

    /// Gaps, overlaps and oversized blends, one message per problem.
    pub fn continuity_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if let Some(first) = self.segments.first() {
            if first.timeline_start.abs() > POSITION_EPSILON {
                issues.push(format!("first segment starts at {:.3}s", first.timeline_start));
            }
        }
        for (i, pair) in self.segments.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let gap = next.timeline_start - prev.end();
            if gap > POSITION_EPSILON {
                issues.push(format!("gap of {gap:.3}s after segment {i}"));
            } else if gap < -POSITION_EPSILON {
                issues.push(format!("overlap of {:.3}s after segment {i}", -gap));
            }
            let blend_cap = prev.duration.min(next.duration) / 2.0;
            if prev.blend_window > blend_cap + POSITION_EPSILON {
                issues.push(format!(
                    "blend window {:.3}s after segment {i} exceeds {blend_cap:.3}s",
                    prev.blend_window
                ));
            }
        }
        for (i, s) in self.segments.iter().enumerate() {
            if s.duration <= 0.0 {
                issues.push(format!("segment {i} has non-positive duration"));
            }
        }
        issues
    }

    /// SHA-256 of the canonical JSON form; equal timelines share it.
    pub fn fingerprint(&self) -> Result<String> {
        digest_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: &str, start: f64, duration: f64) -> TimelineSegment {
        TimelineSegment {
            asset_id: AssetId::from(id),
            timeline_start: start,
            duration,
            source_in: 0.0,
            source_out: None,
            transition_out: TransitionStyle::Cut,
            blend_window: 0.0,
        }
    }

    #[test]
    fn test_total_is_sum_of_durations() {
        let t = Timeline::new(vec![seg("a", 0.0, 2.0), seg("b", 2.0, 3.5)], 6.0);
        assert_eq!(t.total_duration, 5.5);
        assert!(t.within_duration_bound());
    }

    #[test]
    fn test_duration_bound() {
        let t = Timeline::new(vec![seg("a", 0.0, 5.0)], 6.0);
        assert!(!t.within_duration_bound());
    }

    #[test]
    fn test_continuity_reports_gap_and_overlap() {
        let t = Timeline::new(
            vec![seg("a", 0.0, 2.0), seg("b", 2.5, 1.0), seg("c", 3.0, 1.0)],
            4.0,
        );
        let issues = t.continuity_issues();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("gap"));
        assert!(issues[1].contains("overlap"));
    }

    #[test]
    fn test_oversized_blend_is_reported() {
        let mut a = seg("a", 0.0, 1.0);
        a.transition_out = TransitionStyle::Crossfade;
        a.blend_window = 0.8;
        let t = Timeline::new(vec![a, seg("b", 1.0, 4.0)], 5.0);
        assert_eq!(t.continuity_issues().len(), 1);
    }

    #[test]
    fn test_segment_at() {
        let t = Timeline::new(vec![seg("a", 0.0, 2.0), seg("b", 2.0, 3.0)], 5.0);
        assert_eq!(t.segment_at(2.0).unwrap().asset_id.as_str(), "b");
        assert_eq!(t.segment_at(1.9).unwrap().asset_id.as_str(), "a");
        assert!(t.segment_at(5.0).is_none());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Timeline::new(vec![seg("a", 0.0, 2.0)], 2.0);
        let b = a.clone();
        let c = Timeline::new(vec![seg("b", 0.0, 2.0)], 2.0);
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }
}
