//! Chronological clustering of the asset pool.

use crate::domain::ScoredMediaAsset;

/// A run of assets captured close together in time.
///
/// `members` index into the slice passed to [`cluster_assets`] and are in
/// chronological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Sort by capture time and split wherever adjacent captures are more than
/// `gap_secs` apart.
///
/// Assets without a capture time keep their pool order and form one trailing
/// cluster of their own.
pub fn cluster_assets(assets: &[&ScoredMediaAsset], gap_secs: f64) -> Vec<Cluster> {
    let mut order: Vec<usize> = (0..assets.len()).collect();
    // Stable: equal or missing timestamps keep pool order.
    order.sort_by(|&a, &b| match (assets[a].capture_time, assets[b].capture_time) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut untimed: Vec<usize> = Vec::new();

    for idx in order {
        let Some(at) = assets[idx].capture_time else {
            untimed.push(idx);
            continue;
        };
        if let Some(&prev) = current.last() {
            if let Some(prev_at) = assets[prev].capture_time {
                let gap = (at - prev_at).num_milliseconds() as f64 / 1000.0;
                if gap > gap_secs {
                    clusters.push(Cluster {
                        members: std::mem::take(&mut current),
                    });
                }
            }
        }
        current.push(idx);
    }
    if !current.is_empty() {
        clusters.push(Cluster { members: current });
    }
    if !untimed.is_empty() {
        clusters.push(Cluster { members: untimed });
    }
    clusters
}
