// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Appearance descriptors for image regions
//!
//! A descriptor summarizes a region by a hue/saturation histogram, its
//! mean color and the share of pixels that sit on an edge. Descriptors
//! are only comparable when they were built with the same bin count, so
//! the bin count travels with the descriptor in its encoded form.

use image::imageops;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Result, VigilError};
use super::Frame;

/// Default histogram bins per axis
pub const DEFAULT_BINS: usize = 16;

/// Canny hysteresis thresholds
pub const EDGE_LOW_THRESHOLD: f32 = 80.0;
pub const EDGE_HIGH_THRESHOLD: f32 = 160.0;

/// 8-bit hue range (degrees / 2)
const HUE_RANGE: f64 = 180.0;
const SAT_RANGE: f64 = 256.0;

/// Reference palette for naming the dominant color of a region
pub const BASIC_COLORS: &[(&str, [f64; 3])] = &[
    ("black", [0.0, 0.0, 0.0]),
    ("white", [255.0, 255.0, 255.0]),
    ("red", [220.0, 20.0, 60.0]),
    ("blue", [65.0, 105.0, 225.0]),
    ("green", [50.0, 205.0, 50.0]),
    ("yellow", [255.0, 215.0, 0.0]),
    ("orange", [255.0, 140.0, 0.0]),
    ("gray", [128.0, 128.0, 128.0]),
    ("silver", [192.0, 192.0, 192.0]),
    ("brown", [139.0, 69.0, 19.0]),
];

/// Numeric appearance summary of an image region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    /// Bins per histogram axis; `color_hist.len() == bins * bins`
    pub bins: usize,
    /// Hue x saturation histogram, row-major by hue, unit L2 norm
    pub color_hist: Vec<f64>,
    /// Mean (r, g, b), truncated
    pub average_color: [u8; 3],
    /// Fraction of edge pixels in [0, 1]
    pub edge_density: f64,
}

impl FeatureDescriptor {
    /// Encode as a generic JSON mapping for the storage layer
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("bins".into(), json!(self.bins));
        map.insert("color_hist".into(), json!(self.color_hist));
        map.insert("average_color".into(), json!(self.average_color));
        map.insert("edge_density".into(), json!(self.edge_density));
        map
    }

    /// Decode from a mapping produced by [`FeatureDescriptor::to_map`].
    ///
    /// Mappings written without a `bins` key are accepted when the
    /// histogram length is a perfect square.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let color_hist: Vec<f64> = match map.get("color_hist") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => return Err(VigilError::InvalidDescriptor("missing color_hist".into())),
        };

        let bins = match map.get("bins").and_then(Value::as_u64) {
            Some(bins) => usize::try_from(bins)
                .map_err(|_| VigilError::InvalidDescriptor(format!("bin count {bins} out of range")))?,
            None => infer_bins(color_hist.len()).ok_or_else(|| {
                VigilError::InvalidDescriptor(format!(
                    "histogram length {} is not a square bin count",
                    color_hist.len()
                ))
            })?,
        };
        if bins == 0 || bins.checked_mul(bins) != Some(color_hist.len()) {
            return Err(VigilError::InvalidDescriptor(format!(
                "histogram length {} does not match {} bins",
                color_hist.len(),
                bins
            )));
        }

        let average = map
            .get("average_color")
            .and_then(Value::as_array)
            .filter(|channels| channels.len() == 3)
            .ok_or_else(|| VigilError::InvalidDescriptor("average_color must have 3 channels".into()))?;
        let mut average_color = [0u8; 3];
        for (slot, channel) in average_color.iter_mut().zip(average) {
            let value = channel
                .as_f64()
                .ok_or_else(|| VigilError::InvalidDescriptor("average_color must be numeric".into()))?;
            *slot = value.clamp(0.0, 255.0) as u8;
        }

        let edge_density = map.get("edge_density").and_then(Value::as_f64).unwrap_or(0.0);

        Ok(Self {
            bins,
            color_hist,
            average_color,
            edge_density,
        })
    }

    /// True when histograms of both descriptors can be compared
    pub fn comparable_with(&self, other: &FeatureDescriptor) -> bool {
        self.bins == other.bins && self.color_hist.len() == other.color_hist.len()
    }
}

fn infer_bins(len: usize) -> Option<usize> {
    let root = (len as f64).sqrt().round() as usize;
    (root > 0 && root * root == len).then_some(root)
}

/// Computes descriptors with a fixed bin count
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    bins: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_BINS)
    }
}

impl FeatureExtractor {
    pub fn new(bins: usize) -> Self {
        Self { bins: bins.max(1) }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Build the full descriptor for a region image
    pub fn extract(&self, image: &Frame) -> FeatureDescriptor {
        FeatureDescriptor {
            bins: self.bins,
            color_hist: color_histogram(image, self.bins),
            average_color: average_color(image),
            edge_density: edge_density(image),
        }
    }
}

/// Convert an RGB pixel to 8-bit hue [0, 180) and saturation [0, 255]
pub fn rgb_to_hue_sat(pixel: [u8; 3]) -> (f64, f64) {
    let [r, g, b] = pixel.map(f64::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let sat = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
    if delta == 0.0 {
        return (0.0, sat);
    }

    let mut hue = if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    let hue = (hue / 2.0).round();
    (if hue >= HUE_RANGE { 0.0 } else { hue }, sat.round())
}

/// 2-D hue/saturation histogram with `bins` per axis, L2-normalized
pub fn color_histogram(image: &Frame, bins: usize) -> Vec<f64> {
    let bins = bins.max(1);
    let mut hist = vec![0.0f64; bins * bins];

    for pixel in image.pixels() {
        let (hue, sat) = rgb_to_hue_sat(pixel.0);
        let h_bin = ((hue * bins as f64 / HUE_RANGE) as usize).min(bins - 1);
        let s_bin = ((sat * bins as f64 / SAT_RANGE) as usize).min(bins - 1);
        hist[h_bin * bins + s_bin] += 1.0;
    }

    let norm = hist.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in hist.iter_mut() {
            *value /= norm;
        }
    }
    hist
}

fn mean_color(image: &Frame) -> Option<[f64; 3]> {
    let count = image.width() as u64 * image.height() as u64;
    if count == 0 {
        return None;
    }
    let mut sums = [0u64; 3];
    for pixel in image.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += channel as u64;
        }
    }
    Some(sums.map(|sum| sum as f64 / count as f64))
}

/// Per-channel mean, truncated to integers
pub fn average_color(image: &Frame) -> [u8; 3] {
    mean_color(image)
        .map(|mean| mean.map(|c| c as u8))
        .unwrap_or([0, 0, 0])
}

/// Ratio of Canny edge pixels to all pixels
pub fn edge_density(image: &Frame) -> f64 {
    let total = image.width() as u64 * image.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let gray = imageops::grayscale(image);
    let edges = imageproc::edges::canny(&gray, EDGE_LOW_THRESHOLD, EDGE_HIGH_THRESHOLD);
    let edge_pixels = edges.pixels().filter(|p| p.0[0] > 0).count();
    edge_pixels as f64 / total as f64
}

/// Name of the palette color nearest to the region's mean color
pub fn dominant_color_name(image: &Frame) -> &'static str {
    let mean = mean_color(image).unwrap_or([0.0; 3]);
    BASIC_COLORS
        .iter()
        .map(|(name, reference)| {
            let distance = mean
                .iter()
                .zip(reference)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            (*name, distance)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name)
        .unwrap_or("black")
}
