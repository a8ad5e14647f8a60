// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Similarity scoring between a detected region and a watchlist entry

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::watchlist::WatchlistEntry;
use super::{dominant_color_name, FeatureDescriptor, FeatureExtractor, Frame};

/// Tunable weights and nudges used by [`SimilarityScorer`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub histogram: f64,
    pub color: f64,
    pub edge: f64,
    /// Score of an entry that has no usable stored descriptor
    pub baseline: f64,
    pub color_match_bonus: f64,
    pub color_mismatch_penalty: f64,
    pub logo_bonus: f64,
    pub logo_penalty: f64,
    /// Edge density above which a region is assumed to carry a logo
    pub logo_edge_threshold: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            histogram: 0.6,
            color: 0.3,
            edge: 0.1,
            baseline: 0.1,
            color_match_bonus: 0.1,
            color_mismatch_penalty: 0.05,
            logo_bonus: 0.05,
            logo_penalty: 0.05,
            logo_edge_threshold: 0.15,
        }
    }
}

/// Everything the scorer needs to know about one detected region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionAppearance {
    pub descriptor: FeatureDescriptor,
    pub color_name: &'static str,
}

impl RegionAppearance {
    pub fn from_image(extractor: &FeatureExtractor, image: &Frame) -> Self {
        Self {
            descriptor: extractor.extract(image),
            color_name: dominant_color_name(image),
        }
    }
}

/// Pearson correlation of two histograms.
///
/// A flat histogram on either side has zero variance; the correlation is
/// then defined as 1.0.
pub fn histogram_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 1.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let da = x - mean_a;
        let db = y - mean_b;
        num += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = var_a * var_b;
    if denom.abs() > f64::EPSILON {
        num / denom.sqrt()
    } else {
        1.0
    }
}

/// Scores candidates against watchlist entries
#[derive(Debug, Clone, Default)]
pub struct SimilarityScorer {
    weights: ScoringWeights,
}

impl SimilarityScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Histogram correlation mapped from [-1, 1] to [0, 1]
    pub fn histogram_score(&self, a: &FeatureDescriptor, b: &FeatureDescriptor) -> f64 {
        ((histogram_correlation(&a.color_hist, &b.color_hist) + 1.0) / 2.0).clamp(0.0, 1.0)
    }

    /// Appearance score of two descriptors, `None` if their bin counts differ
    pub fn compare(&self, a: &FeatureDescriptor, b: &FeatureDescriptor) -> Option<f64> {
        if !a.comparable_with(b) {
            return None;
        }
        let hist_score = self.histogram_score(a, b);

        let color_distance = a
            .average_color
            .iter()
            .zip(&b.average_color)
            .map(|(x, y)| (*x as f64 - *y as f64).powi(2))
            .sum::<f64>()
            .sqrt();
        let color_score = (1.0 - color_distance / 255.0).max(0.0);
        let edge_score = (1.0 - (a.edge_density - b.edge_density).abs()).max(0.0);

        Some(
            self.weights.histogram * hist_score
                + self.weights.color * color_score
                + self.weights.edge * edge_score,
        )
    }

    /// Base score before categorical nudges
    pub fn base_score(&self, candidate: &FeatureDescriptor, entry: &WatchlistEntry) -> f64 {
        match &entry.descriptor {
            Some(stored) => match self.compare(candidate, stored) {
                Some(score) => score,
                None => {
                    debug!(
                        entry_id = entry.id,
                        candidate_bins = candidate.bins,
                        stored_bins = stored.bins,
                        "Stored descriptor has a different bin count, using baseline"
                    );
                    self.weights.baseline
                }
            },
            None => self.weights.baseline,
        }
    }

    /// Full score: appearance plus declared color and logo nudges.
    ///
    /// Unbounded below; typically within [0, 1.2].
    pub fn score(&self, region: &RegionAppearance, entry: &WatchlistEntry) -> f64 {
        let mut score = self.base_score(&region.descriptor, entry);

        let expected = entry.color_name.as_deref().map(str::trim).filter(|c| !c.is_empty());
        if let Some(expected) = expected {
            if region.color_name.eq_ignore_ascii_case(expected) {
                score += self.weights.color_match_bonus;
            } else {
                score -= self.weights.color_mismatch_penalty;
            }
        }

        if entry.has_logo {
            if region.descriptor.edge_density > self.weights.logo_edge_threshold {
                score += self.weights.logo_bonus;
            } else {
                score -= self.weights.logo_penalty;
            }
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn descriptor(hist: Vec<f64>, color: [u8; 3], edge: f64) -> FeatureDescriptor {
        let bins = (hist.len() as f64).sqrt() as usize;
        FeatureDescriptor {
            bins,
            color_hist: hist,
            average_color: color,
            edge_density: edge,
        }
    }

    fn appearance(descriptor: FeatureDescriptor, color_name: &'static str) -> RegionAppearance {
        RegionAppearance { descriptor, color_name }
    }

    #[test]
    fn test_correlation_bounds_and_symmetry() {
        let a = vec![1.0, 0.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0, 0.0];
        let c = vec![0.2, 0.4, 0.1, 0.3];
        assert!((histogram_correlation(&a, &a) - 1.0).abs() < 1e-12);
        assert_eq!(histogram_correlation(&a, &c), histogram_correlation(&c, &a));
        assert_eq!(histogram_correlation(&b, &c), histogram_correlation(&c, &b));
        assert!(histogram_correlation(&a, &b) < 0.0);
    }

    #[test]
    fn test_flat_histogram_correlation_is_one() {
        assert_eq!(histogram_correlation(&[0.5; 4], &[0.1, 0.2, 0.3, 0.4]), 1.0);
    }

    #[test]
    fn test_identical_descriptors_score_one() {
        let scorer = SimilarityScorer::default();
        let d = descriptor(vec![0.1, 0.7, 0.1, 0.7], [10, 20, 30], 0.2);
        let score = scorer.compare(&d, &d).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_symmetric() {
        let scorer = SimilarityScorer::default();
        let a = descriptor(vec![0.9, 0.1, 0.3, 0.0], [200, 10, 10], 0.05);
        let b = descriptor(vec![0.2, 0.5, 0.5, 0.7], [20, 120, 240], 0.4);
        assert_eq!(scorer.histogram_score(&a, &b), scorer.histogram_score(&b, &a));
        assert_eq!(scorer.compare(&a, &b), scorer.compare(&b, &a));
    }

    #[test]
    fn test_incomparable_bins() {
        let scorer = SimilarityScorer::default();
        let a = descriptor(vec![0.5; 4], [0, 0, 0], 0.0);
        let b = descriptor(vec![0.25; 16], [0, 0, 0], 0.0);
        assert_eq!(scorer.compare(&a, &b), None);

        let mut entry = WatchlistEntry::new(3, "van");
        entry.descriptor = Some(b);
        assert_eq!(scorer.base_score(&a, &entry), 0.1);
    }

    #[test]
    fn test_baseline_without_descriptor() {
        let scorer = SimilarityScorer::default();
        let region = appearance(descriptor(vec![1.0, 0.0, 0.0, 0.0], [1, 1, 1], 0.9), "black");

        let entry = WatchlistEntry::new(1, "anything");
        assert_eq!(scorer.score(&region, &entry), 0.1);

        let mut colored = WatchlistEntry::new(2, "black car");
        colored.color_name = Some("Black".into());
        assert!((scorer.score(&region, &colored) - 0.2).abs() < 1e-12);

        colored.color_name = Some("red".into());
        assert!((scorer.score(&region, &colored) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_blank_color_gets_no_nudge() {
        let scorer = SimilarityScorer::default();
        let region = appearance(descriptor(vec![1.0, 0.0, 0.0, 0.0], [1, 1, 1], 0.9), "black");
        let mut entry = WatchlistEntry::new(1, "unknown paint");
        for blank in ["", "   "] {
            entry.color_name = Some(blank.into());
            assert_eq!(scorer.score(&region, &entry), 0.1);
        }
    }

    #[test]
    fn test_logo_nudge() {
        let scorer = SimilarityScorer::default();
        let mut entry = WatchlistEntry::new(1, "branded truck");
        entry.has_logo = true;

        let detailed = appearance(descriptor(vec![0.5; 4], [0, 0, 0], 0.3), "black");
        let plain = appearance(descriptor(vec![0.5; 4], [0, 0, 0], 0.1), "black");
        assert!((scorer.score(&detailed, &entry) - 0.15).abs() < 1e-12);
        assert!((scorer.score(&plain, &entry) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_score_can_go_negative() {
        let scorer = SimilarityScorer::new(ScoringWeights {
            baseline: 0.0,
            ..ScoringWeights::default()
        });
        let mut entry = WatchlistEntry::new(1, "ghost");
        entry.color_name = Some("white".into());
        entry.has_logo = true;
        let region = appearance(descriptor(vec![0.5; 4], [0, 0, 0], 0.0), "black");
        assert!(scorer.score(&region, &entry) < 0.0);
    }

    #[test]
    fn test_region_appearance_from_image() {
        let image = Frame::from_pixel(16, 16, Rgb([250, 250, 250]));
        let region = RegionAppearance::from_image(&FeatureExtractor::new(4), &image);
        assert_eq!(region.color_name, "white");
        assert_eq!(region.descriptor.color_hist.len(), 16);
    }
}
