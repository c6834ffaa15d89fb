//! Per-step asset selection within clusters.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::domain::ScoredMediaAsset;

use super::cluster::Cluster;

/// Usage bookkeeping for one asset during a walk.
#[derive(Debug, Clone, Copy, Default)]
struct Usage {
    count: usize,
    last_step: Option<usize>,
}

/// Picks assets step by step while tracking usage.
///
/// Within a cluster only the least-used eligible assets are candidates, so no
/// asset repeats before every other asset of its cluster has appeared.
/// Required assets are placed exactly once.
pub struct Selector<'a> {
    assets: &'a [&'a ScoredMediaAsset],
    clusters: &'a [Cluster],
    preferred_tags: &'a BTreeSet<String>,
    usage: Vec<Usage>,
    last_picked: Option<usize>,
    required_left: usize,
}

impl<'a> Selector<'a> {
    pub fn new(
        assets: &'a [&'a ScoredMediaAsset],
        clusters: &'a [Cluster],
        preferred_tags: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            assets,
            clusters,
            preferred_tags,
            usage: vec![Usage::default(); assets.len()],
            last_picked: None,
            required_left: assets.iter().filter(|a| a.required).count(),
        }
    }

    pub fn required_left(&self) -> usize {
        self.required_left
    }

    pub fn use_count(&self, asset: usize) -> usize {
        self.usage[asset].count
    }

    fn eligible(&self, asset: usize) -> bool {
        !(self.assets[asset].required && self.usage[asset].count > 0)
    }

    /// Lowest use count among eligible members, if any member is eligible.
    pub fn min_use(&self, cluster: usize) -> Option<usize> {
        self.clusters[cluster]
            .members
            .iter()
            .filter(|&&m| self.eligible(m))
            .map(|&m| self.usage[m].count)
            .min()
    }

    /// Best candidate of `cluster` for the next step.
    pub fn candidate(&self, cluster: usize) -> Option<usize> {
        let min_use = self.min_use(cluster)?;
        let members = &self.clusters[cluster].members;
        let mut pool: Vec<(usize, usize)> = members
            .iter()
            .enumerate()
            .filter(|&(_, &m)| self.eligible(m) && self.usage[m].count == min_use)
            .map(|(pos, &m)| (pos, m))
            .collect();
        if pool.len() > 1 {
            if let Some(last) = self.last_picked {
                pool.retain(|&(_, m)| m != last);
            }
        }
        pool.into_iter()
            .min_by(|a, b| self.rank(*a, *b))
            .map(|(_, m)| m)
    }

    /// First unplaced required asset, scanning clusters from `from` onward
    /// and wrapping around.
    pub fn next_required(&self, from: usize) -> Option<usize> {
        let n = self.clusters.len();
        (0..n)
            .map(|offset| (from + offset) % n)
            .flat_map(|c| self.clusters[c].members.iter().copied())
            .find(|&m| self.assets[m].required && self.usage[m].count == 0)
    }

    /// Cluster with the least-used eligible asset, latest cluster on ties.
    pub fn least_used_cluster(&self) -> Option<usize> {
        (0..self.clusters.len())
            .rev()
            .filter_map(|c| self.min_use(c).map(|u| (u, c)))
            .min_by_key(|&(u, _)| u)
            .map(|(_, c)| c)
    }

    /// Record that `asset` fills `step`; returns whether it was a reuse.
    pub fn record(&mut self, asset: usize, step: usize) -> bool {
        let usage = &mut self.usage[asset];
        let reused = usage.count > 0;
        if usage.count == 0 && self.assets[asset].required {
            self.required_left -= 1;
        }
        usage.count += 1;
        usage.last_step = Some(step);
        self.last_picked = Some(asset);
        reused
    }

    /// Ordering of two `(cluster position, asset index)` candidates; lesser
    /// wins.
    fn rank(&self, (pos_a, a): (usize, usize), (pos_b, b): (usize, usize)) -> Ordering {
        let (asset_a, asset_b) = (self.assets[a], self.assets[b]);
        let req_a = asset_a.required && self.usage[a].count == 0;
        let req_b = asset_b.required && self.usage[b].count == 0;
        match (req_a, req_b) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (true, true) => return pos_a.cmp(&pos_b),
            (false, false) => {}
        }
        asset_b
            .quality_score
            .total_cmp(&asset_a.quality_score)
            .then_with(|| {
                asset_b
                    .tag_overlap(self.preferred_tags)
                    .cmp(&asset_a.tag_overlap(self.preferred_tags))
            })
            .then_with(|| self.usage[a].last_step.cmp(&self.usage[b].last_step))
            .then_with(|| pos_a.cmp(&pos_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_cluster(n: usize) -> Vec<Cluster> {
        vec![Cluster {
            members: (0..n).collect(),
        }]
    }

    #[test]
    fn test_required_first_then_quality() {
        let pool = [
            ScoredMediaAsset::image("low", 0.2),
            ScoredMediaAsset::image("high", 0.9),
            ScoredMediaAsset::image("req", 0.1).required(),
        ];
        let refs: Vec<&ScoredMediaAsset> = pool.iter().collect();
        let clusters = one_cluster(3);
        let tags = BTreeSet::new();
        let mut sel = Selector::new(&refs, &clusters, &tags);

        let mut order = Vec::new();
        for step in 0..3 {
            let pick = sel.candidate(0).unwrap();
            sel.record(pick, step);
            order.push(pool[pick].id.as_str());
        }
        assert_eq!(order, vec!["req", "high", "low"]);
        assert_eq!(sel.required_left(), 0);
    }

    #[test]
    fn test_preferred_tags_break_quality_ties() {
        let pool = [
            ScoredMediaAsset::image("plain", 0.5),
            ScoredMediaAsset::image("tagged", 0.5).with_tag("beach"),
        ];
        let refs: Vec<&ScoredMediaAsset> = pool.iter().collect();
        let clusters = one_cluster(2);
        let tags: BTreeSet<String> = ["beach".to_string()].into();
        let sel = Selector::new(&refs, &clusters, &tags);
        assert_eq!(sel.candidate(0), Some(1));
    }

    #[test]
    fn test_no_reuse_until_cluster_exhausted() {
        let pool = [
            ScoredMediaAsset::image("a", 0.9),
            ScoredMediaAsset::image("b", 0.5),
            ScoredMediaAsset::image("c", 0.1),
        ];
        let refs: Vec<&ScoredMediaAsset> = pool.iter().collect();
        let clusters = one_cluster(3);
        let tags = BTreeSet::new();
        let mut sel = Selector::new(&refs, &clusters, &tags);

        let mut reuses = Vec::new();
        for step in 0..7 {
            let pick = sel.candidate(0).unwrap();
            reuses.push(sel.record(pick, step));
        }
        assert_eq!(reuses[..3], [false, false, false]);
        assert!(reuses[3..].iter().all(|r| *r));
        assert_eq!(sel.use_count(0) + sel.use_count(1) + sel.use_count(2), 7);
        assert!(sel.use_count(2) >= 2);
    }

    #[test]
    fn test_required_assets_are_never_reused() {
        let pool = [ScoredMediaAsset::image("req", 0.9).required()];
        let refs: Vec<&ScoredMediaAsset> = pool.iter().collect();
        let clusters = one_cluster(1);
        let tags = BTreeSet::new();
        let mut sel = Selector::new(&refs, &clusters, &tags);
        let pick = sel.candidate(0).unwrap();
        sel.record(pick, 0);
        assert_eq!(sel.candidate(0), None);
    }

    #[test]
    fn test_avoids_back_to_back_repeat() {
        let pool = [
            ScoredMediaAsset::image("a", 0.9),
            ScoredMediaAsset::image("b", 0.1),
        ];
        let refs: Vec<&ScoredMediaAsset> = pool.iter().collect();
        let clusters = one_cluster(2);
        let tags = BTreeSet::new();
        let mut sel = Selector::new(&refs, &clusters, &tags);
        let mut picks = Vec::new();
        for step in 0..6 {
            let pick = sel.candidate(0).unwrap();
            sel.record(pick, step);
            picks.push(pick);
        }
        for pair in picks.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }
}
