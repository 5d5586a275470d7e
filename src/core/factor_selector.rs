use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClusterChoice;
use crate::core::factor_trend::FactorTrack;

const MAX_ITERATIONS: usize = 1000;
const SEED_PERCENTILES: [f64; 3] = [0.25, 0.50, 0.75];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub factor: f64,
    pub score: f64,
    pub cluster: ClusterChoice,
    /// Mean score of the cluster the factor landed in.
    pub centroid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSelection {
    pub factor: f64,
    pub score: f64,
    /// Set when clustering was skipped in favour of the argmax fallback.
    pub degenerate: bool,
    pub assignments: Vec<ClusterAssignment>,
}

/// Picks the factor that represents the configured performance cluster.
#[derive(Debug, Clone)]
pub struct FactorSelector {
    choice: ClusterChoice,
}

impl FactorSelector {
    pub fn new(choice: ClusterChoice) -> Self {
        Self { choice }
    }

    /// Select from live tracks, scoring each by its trailing mean performance.
    /// Returns `None` only when there are no tracks.
    pub fn select(&self, tracks: &[FactorTrack]) -> Option<FactorSelection> {
        let factors: Vec<f64> = tracks.iter().map(|t| t.factor).collect();
        let scores: Vec<f64> = tracks.iter().map(|t| t.score()).collect();
        self.select_scores(&factors, &scores)
    }

    /// Select from parallel `factors` / `scores` slices; factors must be ascending.
    pub fn select_scores(&self, factors: &[f64], scores: &[f64]) -> Option<FactorSelection> {
        if factors.is_empty() || factors.len() != scores.len() {
            return None;
        }

        let valid: Vec<(f64, f64)> = factors
            .iter()
            .zip(scores)
            .filter(|(_, s)| s.is_finite())
            .map(|(&f, &s)| (f, s))
            .collect();

        if valid.len() < 3 || distinct_count(&valid) < 3 {
            debug!(
                valid = valid.len(),
                "degenerate performance scores, using argmax factor"
            );
            return Some(argmax_selection(factors[0], &valid));
        }

        let values: Vec<f64> = valid.iter().map(|&(_, s)| s).collect();
        let (centroids, labels) = kmeans3(&values);

        // Rank clusters by centroid ascending: worst, average, best.
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| centroids[a].total_cmp(&centroids[b]));
        let mut rank_of = [0usize; 3];
        for (rank, &idx) in order.iter().enumerate() {
            rank_of[idx] = rank;
        }

        let assignments: Vec<ClusterAssignment> = valid
            .iter()
            .zip(&labels)
            .map(|(&(factor, score), &label)| ClusterAssignment {
                factor,
                score,
                cluster: rank_to_choice(rank_of[label]),
                centroid: centroids[label],
            })
            .collect();

        let members: Vec<&ClusterAssignment> = assignments
            .iter()
            .filter(|a| a.cluster == self.choice)
            .collect();

        if members.is_empty() {
            debug!(cluster = %self.choice, "requested cluster is empty, using argmax factor");
            let mut fallback = argmax_selection(factors[0], &valid);
            fallback.assignments = assignments;
            return Some(fallback);
        }

        let factor = members.iter().map(|a| a.factor).sum::<f64>() / members.len() as f64;
        let score = members[0].centroid;

        Some(FactorSelection {
            factor,
            score,
            degenerate: false,
            assignments,
        })
    }
}

fn rank_to_choice(rank: usize) -> ClusterChoice {
    match rank {
        0 => ClusterChoice::Worst,
        1 => ClusterChoice::Average,
        _ => ClusterChoice::Best,
    }
}

fn distinct_count(valid: &[(f64, f64)]) -> usize {
    let mut values: Vec<f64> = valid.iter().map(|&(_, s)| s).collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    values.len()
}

/// Factor with the highest score; the first (smallest) factor wins ties.
fn argmax_selection(default_factor: f64, valid: &[(f64, f64)]) -> FactorSelection {
    let best = valid.iter().fold(None, |best: Option<(f64, f64)>, &(f, s)| match best {
        Some((_, bs)) if bs >= s => best,
        _ => Some((f, s)),
    });
    let (factor, score) = best.unwrap_or((default_factor, 0.0));
    FactorSelection {
        factor,
        score,
        degenerate: true,
        assignments: Vec::new(),
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Deterministic 1-D k-means with three clusters seeded at the quartiles.
/// Returns the centroids and each value's cluster index.
fn kmeans3(values: &[f64]) -> ([f64; 3], Vec<usize>) {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut centroids = SEED_PERCENTILES.map(|p| percentile(&sorted, p));
    let mut labels: Vec<usize> = Vec::new();

    for _ in 0..MAX_ITERATIONS {
        let next: Vec<usize> = values.iter().map(|&v| nearest(&centroids, v)).collect();
        if next == labels {
            break;
        }
        labels = next;

        for (k, centroid) in centroids.iter_mut().enumerate() {
            let (sum, n) = values
                .iter()
                .zip(&labels)
                .filter(|(_, &l)| l == k)
                .fold((0.0, 0usize), |(s, n), (&v, _)| (s + v, n + 1));
            if n > 0 {
                *centroid = sum / n as f64;
            }
        }
    }

    (centroids, labels)
}

fn nearest(centroids: &[f64; 3], v: f64) -> usize {
    let mut best = 0;
    for k in 1..3 {
        if (v - centroids[k]).abs() < (v - centroids[best]).abs() {
            best = k;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACTORS: [f64; 6] = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5];

    #[test]
    fn fewer_than_three_distinct_scores_uses_argmax() {
        let sel = FactorSelector::new(ClusterChoice::Best);
        let scores = [0.5, 0.5, 0.5, 0.2, 0.2, 0.2];
        let out = sel.select_scores(&FACTORS, &scores).unwrap();
        assert!(out.degenerate);
        assert_eq!(out.factor, 1.0);
        assert!((out.score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn argmax_tie_breaks_on_smallest_factor() {
        let sel = FactorSelector::new(ClusterChoice::Worst);
        let scores = [0.1, 0.9, 0.9, 0.1, 0.1, 0.9];
        let out = sel.select_scores(&FACTORS, &scores).unwrap();
        assert!(out.degenerate);
        assert_eq!(out.factor, 1.5);
    }

    #[test]
    fn nan_scores_do_not_count_as_valid() {
        let sel = FactorSelector::new(ClusterChoice::Best);
        let scores = [f64::NAN, 0.3, f64::NAN, 0.7, f64::NAN, f64::INFINITY];
        let out = sel.select_scores(&FACTORS, &scores).unwrap();
        assert!(out.degenerate);
        assert_eq!(out.factor, 2.5);
    }

    #[test]
    fn all_nan_falls_back_to_first_factor() {
        let sel = FactorSelector::new(ClusterChoice::Best);
        let out = sel.select_scores(&FACTORS, &[f64::NAN; 6]).unwrap();
        assert!(out.degenerate);
        assert_eq!(out.factor, 1.0);
        assert_eq!(out.score, 0.0);
    }

    #[test]
    fn three_clear_groups_map_to_worst_average_best() {
        let scores = [-1.0, -1.1, 0.0, 0.1, 2.0, 2.1];

        let best = FactorSelector::new(ClusterChoice::Best)
            .select_scores(&FACTORS, &scores)
            .unwrap();
        assert!(!best.degenerate);
        assert!((best.factor - 3.25).abs() < 1e-9);
        assert!((best.score - 2.05).abs() < 1e-9);

        let avg = FactorSelector::new(ClusterChoice::Average)
            .select_scores(&FACTORS, &scores)
            .unwrap();
        assert!((avg.factor - 2.25).abs() < 1e-9);

        let worst = FactorSelector::new(ClusterChoice::Worst)
            .select_scores(&FACTORS, &scores)
            .unwrap();
        assert!((worst.factor - 1.25).abs() < 1e-9);
        assert!((worst.score - -1.05).abs() < 1e-9);

        let clusters: Vec<ClusterChoice> = best.assignments.iter().map(|a| a.cluster).collect();
        assert_eq!(
            clusters,
            vec![
                ClusterChoice::Worst,
                ClusterChoice::Worst,
                ClusterChoice::Average,
                ClusterChoice::Average,
                ClusterChoice::Best,
                ClusterChoice::Best,
            ]
        );
    }

    #[test]
    fn selection_stays_within_factor_bounds() {
        let patterns: [[f64; 6]; 4] = [
            [5.0, -3.0, 0.2, 0.4, 9.0, -7.0],
            [0.0, 0.1, 0.2, 0.3, 0.4, 0.5],
            [1e-9, 2e-9, 1e6, -1e6, 3.0, 3.0],
            [-0.5, -0.4, -0.3, -0.2, -0.1, 0.0],
        ];
        for choice in [ClusterChoice::Worst, ClusterChoice::Average, ClusterChoice::Best] {
            let sel = FactorSelector::new(choice);
            for scores in &patterns {
                let out = sel.select_scores(&FACTORS, scores).unwrap();
                assert!(out.factor >= FACTORS[0] && out.factor <= FACTORS[5]);
            }
        }
    }

    #[test]
    fn repeated_runs_are_identical() {
        let sel = FactorSelector::new(ClusterChoice::Average);
        let scores = [0.3, -0.2, 0.9, 0.05, 0.44, -0.6];
        let a = sel.select_scores(&FACTORS, &scores).unwrap();
        let b = sel.select_scores(&FACTORS, &scores).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn kmeans_seeds_at_quartiles() {
        let (centroids, labels) = kmeans3(&[1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 20.0]);
        assert_eq!(labels.len(), 7);
        // Groups {1,2,3}, {10,11,12}, {20}
        assert!((centroids[0] - 2.0).abs() < 1e-9);
        assert!((centroids[1] - 11.0).abs() < 1e-9);
        assert!((centroids[2] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn mismatched_inputs_return_none() {
        let sel = FactorSelector::new(ClusterChoice::Best);
        assert!(sel.select_scores(&[], &[]).is_none());
        assert!(sel.select_scores(&[1.0, 2.0], &[0.1]).is_none());
    }
}
