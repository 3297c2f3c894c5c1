//! Filter Engine
//!
//! Fixed catalog of per-pixel color transforms over BGRA buffers.
//!
//! Every pixel is independent, so rows are fanned out over rayon. The only
//! shared state is the cancellation flag, which is polled once per pixel.
//! Float formulas run in `f64`, clamp at 255 and narrow by truncation.

use crate::cancel::{CancelSignal, Cancelled};
use crate::pixel_buffer::{PixelBuffer, BLUE, CHANNELS, GREEN, RED};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Uniform attenuation applied by [`FilterKind::Blur`].
pub const BLUR_ATTENUATION: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum FilterKind {
    #[default]
    Grayscale,
    Sepia,
    Warm,
    Cold,
    /// Not a spatial blur: darkens every color channel by [`BLUR_ATTENUATION`].
    Blur,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown filter '{0}' (expected one of: Grayscale, Sepia, Warm, Cold, Blur)")]
pub struct UnknownFilter(pub String);

impl FilterKind {
    pub const ALL: [FilterKind; 5] = [
        FilterKind::Grayscale,
        FilterKind::Sepia,
        FilterKind::Warm,
        FilterKind::Cold,
        FilterKind::Blur,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Grayscale => "Grayscale",
            FilterKind::Sepia => "Sepia",
            FilterKind::Warm => "Warm",
            FilterKind::Cold => "Cold",
            FilterKind::Blur => "Blur",
        }
    }

    /// Lower-case name, used as the output file prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            FilterKind::Grayscale => "grayscale",
            FilterKind::Sepia => "sepia",
            FilterKind::Warm => "warm",
            FilterKind::Cold => "cold",
            FilterKind::Blur => "blur",
        }
    }

    /// Lenient selection used by front ends: unset or unrecognized names
    /// fall back to [`FilterKind::Grayscale`].
    pub fn from_name_or_default(name: Option<&str>) -> Self {
        name.and_then(|n| n.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FilterKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownFilter(s.to_string()))
    }
}

#[inline]
fn clamp_to_byte(v: f64) -> u8 {
    // `as` saturates at 0 and truncates toward zero.
    v.min(255.0) as u8
}

/// Applies `kind` to one BGRA pixel in place. Alpha is never touched.
///
/// All outputs are computed from the original b, g, r values.
#[inline]
pub fn transform_pixel(kind: FilterKind, px: &mut [u8]) {
    let b = px[BLUE];
    let g = px[GREEN];
    let r = px[RED];

    match kind {
        FilterKind::Grayscale => {
            let gray = ((r as u16 + g as u16 + b as u16) / 3) as u8;
            px[BLUE] = gray;
            px[GREEN] = gray;
            px[RED] = gray;
        }
        FilterKind::Sepia => {
            let (r, g, b) = (r as f64, g as f64, b as f64);
            px[BLUE] = clamp_to_byte(0.272 * r + 0.534 * g + 0.131 * b);
            px[GREEN] = clamp_to_byte(0.349 * r + 0.686 * g + 0.168 * b);
            px[RED] = clamp_to_byte(0.393 * r + 0.769 * g + 0.189 * b);
        }
        FilterKind::Warm => {
            px[BLUE] = clamp_to_byte(b as f64 * 0.9);
            px[RED] = clamp_to_byte(r as f64 * 1.1);
        }
        FilterKind::Cold => {
            px[BLUE] = clamp_to_byte(b as f64 * 1.1);
            px[RED] = clamp_to_byte(r as f64 * 0.9);
        }
        FilterKind::Blur => {
            px[BLUE] = clamp_to_byte(b as f64 * BLUR_ATTENUATION);
            px[GREEN] = clamp_to_byte(g as f64 * BLUR_ATTENUATION);
            px[RED] = clamp_to_byte(r as f64 * BLUR_ATTENUATION);
        }
    }
}

/// Transforms every row of `pixels` in parallel, leaving the bytes past
/// `row_bytes` in each row untouched. The signal is polled before each pixel.
fn filter_rows(
    pixels: &mut [u8],
    stride: usize,
    row_bytes: usize,
    kind: FilterKind,
    cancel: &CancelSignal,
) -> Result<(), Cancelled> {
    pixels
        .par_chunks_mut(stride)
        .try_for_each(|row| -> Result<(), Cancelled> {
            for px in row[..row_bytes].chunks_exact_mut(CHANNELS) {
                cancel.check()?;
                transform_pixel(kind, px);
            }
            Ok(())
        })
}

/// Produces a filtered copy of `source`.
///
/// `source` is only borrowed; the transform runs on a private copy that is
/// returned whole or, on cancellation, dropped. Callers never see a
/// partially filtered buffer.
pub fn apply(
    source: &PixelBuffer,
    kind: FilterKind,
    cancel: &CancelSignal,
) -> Result<PixelBuffer, Cancelled> {
    cancel.check()?;

    if source.is_empty() {
        return Ok(source.clone());
    }

    let mut pixels = source.as_bytes().to_vec();
    filter_rows(&mut pixels, source.stride(), source.row_bytes(), kind, cancel)?;

    tracing::trace!(
        filter = kind.name(),
        width = source.width(),
        height = source.height(),
        "Filter applied"
    );

    Ok(source.with_data(pixels))
}
