//! Frame-to-frame motion detection.
//!
//! `FrameComparator` keeps the reduced signal of the previous frame (its
//! encoded size, or its downscaled grayscale pixels) and measures each new
//! frame against it. The first frame only establishes the baseline.

mod cooldown;
pub mod pixel;

use anyhow::Result;
use image::GrayImage;
use std::fmt;

use crate::config::{MotionPolicy, MotionSettings};
use crate::frame::Frame;

pub use cooldown::{CooldownGate, GateDecision};
pub use pixel::PixelDiff;

/// One measurement against the previous frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MotionMetric {
    ByteDelta {
        delta: u64,
        threshold: u64,
    },
    PixelDiff {
        changed_pixels: u32,
        mean_delta: f32,
        threshold: u32,
    },
}

impl MotionMetric {
    /// Strictly greater than the threshold counts as motion.
    pub fn is_motion(&self) -> bool {
        match *self {
            Self::ByteDelta { delta, threshold } => delta > threshold,
            Self::PixelDiff {
                changed_pixels,
                threshold,
                ..
            } => changed_pixels > threshold,
        }
    }
}

impl fmt::Display for MotionMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByteDelta { delta, threshold } => {
                write!(f, "frame difference {} bytes (threshold: {})", delta, threshold)
            }
            Self::PixelDiff {
                changed_pixels,
                mean_delta,
                threshold,
            } => write!(
                f,
                "pixels changed {} (threshold: {}), avg change {:.1}",
                changed_pixels, threshold, mean_delta
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Comparison {
    /// No previous frame; this one becomes the baseline.
    Baseline,
    Measured(MotionMetric),
}

impl Comparison {
    pub fn is_motion(&self) -> bool {
        match self {
            Self::Baseline => false,
            Self::Measured(metric) => metric.is_motion(),
        }
    }
}

enum Signal {
    Size(usize),
    Pixels(GrayImage),
}

pub struct FrameComparator {
    settings: MotionSettings,
    previous: Option<Signal>,
}

impl FrameComparator {
    pub fn new(settings: MotionSettings) -> Self {
        Self {
            settings,
            previous: None,
        }
    }

    pub fn policy(&self) -> MotionPolicy {
        self.settings.policy
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    /// Measure `frame` against the previous one and make it the new baseline.
    ///
    /// Fails only when the pixel policy cannot decode the frame; the previous
    /// baseline is kept in that case.
    pub fn compare(&mut self, frame: &Frame) -> Result<Comparison> {
        match self.settings.policy {
            MotionPolicy::ByteSize => Ok(self.observe_size(frame.byte_len())),
            MotionPolicy::Pixel => {
                let gray = pixel::decode_for_comparison(frame.bytes())?;
                self.observe_gray(gray)
            }
        }
    }

    fn observe_size(&mut self, size: usize) -> Comparison {
        let previous = self.previous.replace(Signal::Size(size));
        match previous {
            Some(Signal::Size(prev)) => Comparison::Measured(MotionMetric::ByteDelta {
                delta: size.abs_diff(prev) as u64,
                threshold: self.settings.byte_threshold,
            }),
            _ => Comparison::Baseline,
        }
    }

    pub(crate) fn observe_gray(&mut self, gray: GrayImage) -> Result<Comparison> {
        let comparison = match &self.previous {
            Some(Signal::Pixels(prev)) => {
                let diff = pixel::diff_gray(&gray, prev, self.settings.pixel_delta_threshold)?;
                Comparison::Measured(MotionMetric::PixelDiff {
                    changed_pixels: diff.changed_pixels,
                    mean_delta: diff.mean_delta,
                    threshold: self.settings.pixel_count_threshold,
                })
            }
            _ => Comparison::Baseline,
        };
        self.previous = Some(Signal::Pixels(gray));
        Ok(comparison)
    }
}
