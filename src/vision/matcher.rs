// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Per-frame matching of detected regions against the watchlist

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::watchlist::WatchlistEntry;
use super::{
    DetectedRegion, FeatureDescriptor, FeatureExtractor, Frame, ObjectDetector, RegionAppearance,
    SimilarityScorer,
};

/// Outcome for one detected region.
///
/// `best_entry == None` only means no eligible entry beat the starting
/// score of 0.0; the region itself is not rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub region: DetectedRegion,
    pub best_entry: Option<WatchlistEntry>,
    pub score: f64,
    pub descriptor: FeatureDescriptor,
    pub color_name: String,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.best_entry.is_some()
    }
}

/// Pick the highest-scoring eligible entry.
///
/// Ties keep the first entry encountered. An entry must strictly beat
/// the running best, which starts at 0.0.
pub fn select_best<'a>(
    scorer: &SimilarityScorer,
    region: &DetectedRegion,
    appearance: &RegionAppearance,
    watchlist: &'a [WatchlistEntry],
) -> (Option<&'a WatchlistEntry>, f64) {
    let mut best: Option<&WatchlistEntry> = None;
    let mut best_score = 0.0;

    for entry in watchlist {
        if !entry.is_eligible_for(region) {
            continue;
        }
        let score = scorer.score(appearance, entry);
        trace!(entry_id = entry.id, score, class = %region.class_tag, "Scored entry");
        if score > best_score {
            best_score = score;
            best = Some(entry);
        }
    }

    (best, best_score)
}

/// Runs detection, feature extraction and scoring for a frame
#[derive(Debug)]
pub struct MatchSelector {
    detector: ObjectDetector,
    extractor: FeatureExtractor,
    scorer: SimilarityScorer,
    parallel: bool,
}

impl MatchSelector {
    pub fn new(detector: ObjectDetector, extractor: FeatureExtractor, scorer: SimilarityScorer) -> Self {
        Self {
            detector,
            extractor,
            scorer,
            parallel: true,
        }
    }

    /// Extract region features on the rayon pool
    pub fn with_parallel_features(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn detector(&self) -> &ObjectDetector {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut ObjectDetector {
        &mut self.detector
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// One result per detected region, in detection order
    pub fn find_matches(&self, frame: &Frame, watchlist: &[WatchlistEntry]) -> Vec<MatchResult> {
        let regions = self.detector.detect(frame);
        let appearances = self.appearances(frame, &regions);

        regions
            .into_iter()
            .zip(appearances)
            .map(|(region, appearance)| {
                let (best, score) = select_best(&self.scorer, &region, &appearance, watchlist);
                MatchResult {
                    best_entry: best.cloned(),
                    score,
                    descriptor: appearance.descriptor,
                    color_name: appearance.color_name.to_string(),
                    region,
                }
            })
            .collect()
    }

    fn appearances(&self, frame: &Frame, regions: &[DetectedRegion]) -> Vec<RegionAppearance> {
        let describe = |region: &DetectedRegion| {
            let roi = region.bbox.crop(frame);
            RegionAppearance::from_image(&self.extractor, &roi)
        };
        if self.parallel && regions.len() > 1 {
            regions.par_iter().map(describe).collect()
        } else {
            regions.iter().map(describe).collect()
        }
    }
}
