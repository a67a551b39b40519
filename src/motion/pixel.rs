//! Grayscale pixel differencing.
//!
//! Frames are decoded, downscaled to a fixed 320x240 and reduced to one
//! intensity channel before comparison, so the cost of a comparison does not
//! depend on the camera resolution and small sensor noise is averaged away.

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::GrayImage;

pub const COMPARE_WIDTH: u32 = 320;
pub const COMPARE_HEIGHT: u32 = 240;

/// Outcome of comparing two grayscale frames.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PixelDiff {
    /// Pixels whose intensity moved by more than the delta threshold.
    pub changed_pixels: u32,
    /// Mean absolute delta over the changed pixels (0 when none changed).
    pub mean_delta: f32,
}

/// Decode an encoded frame into the fixed-size grayscale comparison buffer.
pub fn decode_for_comparison(bytes: &[u8]) -> Result<GrayImage> {
    let image = image::load_from_memory(bytes).context("decode frame")?;
    Ok(image
        .resize_exact(COMPARE_WIDTH, COMPARE_HEIGHT, FilterType::Lanczos3)
        .to_luma8())
}

/// Count pixels whose absolute difference exceeds `delta_threshold`.
pub fn diff_gray(current: &GrayImage, previous: &GrayImage, delta_threshold: u8) -> Result<PixelDiff> {
    if current.dimensions() != previous.dimensions() {
        return Err(anyhow!(
            "frame dimensions differ: {:?} vs {:?}",
            current.dimensions(),
            previous.dimensions()
        ));
    }

    let mut changed: u32 = 0;
    let mut delta_sum: u64 = 0;
    for (a, b) in current.as_raw().iter().zip(previous.as_raw()) {
        let delta = a.abs_diff(*b);
        if delta > delta_threshold {
            changed += 1;
            delta_sum += delta as u64;
        }
    }

    let mean_delta = if changed > 0 {
        delta_sum as f32 / changed as f32
    } else {
        0.0
    };
    Ok(PixelDiff {
        changed_pixels: changed,
        mean_delta,
    })
}
