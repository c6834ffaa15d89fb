//! Rhythm and energy profile of the soundtrack.

use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// Energy used when the extractor produced no curve.
pub const NEUTRAL_ENERGY: f64 = 0.5;

/// Beat grid, tempo and energy curve produced by the audio extractor.
///
/// Immutable once extracted; the synthesizer only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRhythmProfile {
    pub duration: f64,
    pub tempo_bpm: f64,
    pub beats: Vec<f64>,
    /// Samples in [0, 1] spread evenly over `[0, duration]`.
    pub energy_curve: Vec<f64>,
}

impl AudioRhythmProfile {
    /// Seconds per beat.
    pub fn beat_period(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    /// Energy at a timeline position using nearest-index lookup.
    ///
    /// The index is clamped to the curve, and `bias` is added before the
    /// result is clamped back into [0, 1].
    pub fn energy_at(&self, position: f64, bias: f64) -> f64 {
        let raw = match self.energy_curve.len() {
            0 => NEUTRAL_ENERGY,
            1 => self.energy_curve[0],
            n => {
                let last = (n - 1) as f64;
                let idx = (position / self.duration * last).round().clamp(0.0, last);
                self.energy_curve[idx as usize]
            }
        };
        (raw + bias).clamp(0.0, 1.0)
    }

    /// Index of the first beat at or after `position`, if any.
    pub fn beat_at_or_after(&self, position: f64) -> Option<usize> {
        let idx = self.beats.partition_point(|&b| b < position);
        (idx < self.beats.len()).then_some(idx)
    }

    /// Timestamp of the beat closest to `position`.
    pub fn nearest_beat(&self, position: f64) -> Option<f64> {
        let idx = self.beats.partition_point(|&b| b < position);
        let after = self.beats.get(idx).copied();
        let before = idx.checked_sub(1).and_then(|i| self.beats.get(i)).copied();
        match (before, after) {
            (Some(b), Some(a)) => Some(if position - b <= a - position { b } else { a }),
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ValidationError::AudioDuration(self.duration));
        }
        if !self.tempo_bpm.is_finite() || self.tempo_bpm <= 0.0 {
            return Err(ValidationError::Tempo(self.tempo_bpm));
        }
        for (index, &at) in self.beats.iter().enumerate() {
            if !at.is_finite() || at < 0.0 || at > self.duration {
                return Err(ValidationError::BeatOutOfBounds {
                    index,
                    at,
                    duration: self.duration,
                });
            }
            if index > 0 {
                let previous = self.beats[index - 1];
                if at <= previous {
                    return Err(ValidationError::BeatsNotIncreasing {
                        index,
                        at,
                        previous,
                    });
                }
            }
        }
        for (index, &value) in self.energy_curve.iter().enumerate() {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::EnergyOutOfRange { index, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(energy: Vec<f64>) -> AudioRhythmProfile {
        AudioRhythmProfile {
            duration: 10.0,
            tempo_bpm: 120.0,
            beats: (0..20).map(|i| i as f64 * 0.5).collect(),
            energy_curve: energy,
        }
    }

    #[test]
    fn test_energy_lookup_is_nearest_index() {
        let p = profile(vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(p.energy_at(0.0, 0.0), 0.0);
        assert_eq!(p.energy_at(2.4, 0.0), 0.25);
        assert_eq!(p.energy_at(5.0, 0.0), 0.5);
        assert_eq!(p.energy_at(10.0, 0.0), 1.0);
    }

    #[test]
    fn test_energy_lookup_clamps_past_end() {
        let p = profile(vec![0.2, 0.9]);
        assert_eq!(p.energy_at(42.0, 0.0), 0.9);
        assert_eq!(p.energy_at(-3.0, 0.0), 0.2);
    }

    #[test]
    fn test_energy_bias_is_clamped() {
        let p = profile(vec![0.8]);
        assert_eq!(p.energy_at(1.0, 0.5), 1.0);
        assert_eq!(p.energy_at(1.0, -1.0), 0.0);
    }

    #[test]
    fn test_empty_curve_is_neutral() {
        let p = profile(vec![]);
        assert_eq!(p.energy_at(3.0, 0.0), NEUTRAL_ENERGY);
    }

    #[test]
    fn test_non_increasing_beats_are_rejected() {
        let mut p = profile(vec![0.5]);
        p.beats = vec![0.0, 1.0, 1.0];
        assert!(matches!(
            p.validate(),
            Err(ValidationError::BeatsNotIncreasing { index: 2, .. })
        ));
    }

    #[test]
    fn test_beat_past_duration_is_rejected() {
        let mut p = profile(vec![0.5]);
        p.beats = vec![0.0, 11.0];
        assert!(matches!(
            p.validate(),
            Err(ValidationError::BeatOutOfBounds { index: 1, .. })
        ));
    }

    #[test]
    fn test_nearest_beat() {
        let p = profile(vec![0.5]);
        assert_eq!(p.nearest_beat(1.2), Some(1.0));
        assert_eq!(p.nearest_beat(1.3), Some(1.5));
        assert_eq!(p.beat_at_or_after(9.6), None);
        assert_eq!(p.beat_at_or_after(9.5), Some(19));
    }
}
