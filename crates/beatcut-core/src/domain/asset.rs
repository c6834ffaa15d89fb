//! Content-scored media assets and the lookup handed to renderers.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// Stable identifier of an asset within a pool.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Visual media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A media item annotated by the content-understanding oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMediaAsset {
    pub id: AssetId,
    pub kind: AssetKind,
    /// Source length in seconds; 0 for stills.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub capture_time: Option<DateTime<Utc>>,
    pub quality_score: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub required: bool,
    /// Where the renderer finds the source file.
    #[serde(default)]
    pub source_uri: String,
}

impl ScoredMediaAsset {
    pub fn image(id: impl Into<String>, quality_score: f64) -> Self {
        let id = id.into();
        Self {
            source_uri: format!("{id}.jpg"),
            id: AssetId(id),
            kind: AssetKind::Image,
            duration: 0.0,
            capture_time: None,
            quality_score,
            tags: BTreeSet::new(),
            required: false,
        }
    }

    pub fn video(id: impl Into<String>, duration: f64, quality_score: f64) -> Self {
        let id = id.into();
        Self {
            source_uri: format!("{id}.mp4"),
            id: AssetId(id),
            kind: AssetKind::Video,
            duration,
            capture_time: None,
            quality_score,
            tags: BTreeSet::new(),
            required: false,
        }
    }

    pub fn with_capture_time(mut self, at: DateTime<Utc>) -> Self {
        self.capture_time = Some(at);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Number of tags shared with `preferred`.
    pub fn tag_overlap(&self, preferred: &BTreeSet<String>) -> usize {
        self.tags.intersection(preferred).count()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.quality_score.is_finite() || !(0.0..=1.0).contains(&self.quality_score) {
            return Err(ValidationError::QualityOutOfRange {
                id: self.id.to_string(),
                score: self.quality_score,
            });
        }
        let duration_ok = match self.kind {
            AssetKind::Image => self.duration == 0.0,
            AssetKind::Video => self.duration.is_finite() && self.duration > 0.0,
        };
        if !duration_ok {
            return Err(ValidationError::AssetDuration {
                id: self.id.to_string(),
                kind: self.kind.to_string(),
                duration: self.duration,
            });
        }
        Ok(())
    }
}

/// Validate every asset and reject duplicate ids.
pub fn validate_pool(pool: &[ScoredMediaAsset]) -> Result<(), ValidationError> {
    let mut seen = BTreeSet::new();
    for asset in pool {
        asset.validate()?;
        if !seen.insert(&asset.id) {
            return Err(ValidationError::DuplicateAsset(asset.id.to_string()));
        }
    }
    Ok(())
}

/// What a renderer needs to resolve one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSource {
    pub kind: AssetKind,
    pub source_uri: String,
}

/// Asset metadata handed to the renderer, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLookup {
    entries: BTreeMap<AssetId, AssetSource>,
}

impl AssetLookup {
    /// Build a lookup restricted to the assets a timeline references.
    pub fn for_ids<'a>(
        pool: &[ScoredMediaAsset],
        ids: impl IntoIterator<Item = &'a AssetId>,
    ) -> Self {
        let wanted: BTreeSet<&AssetId> = ids.into_iter().collect();
        let entries = pool
            .iter()
            .filter(|a| wanted.contains(&a.id))
            .map(|a| {
                (
                    a.id.clone(),
                    AssetSource {
                        kind: a.kind,
                        source_uri: a.source_uri.clone(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: &AssetId) -> Option<&AssetSource> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
