//! Binarization strategies and the ensemble that combines them.
//!
//! Every strategy maps pixels strictly above its threshold to 255 and the rest
//! to 0. Only the strategies registered in a [`ThresholdEnsemble`] take part in
//! the enhancement pipeline; the others are available on their own.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::separable_filter_equal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdMethod {
    /// Global threshold that maximizes between-class variance.
    Otsu,
    /// Pixel vs. Gaussian-weighted mean of its `block_size` neighbourhood minus `offset`.
    AdaptiveGaussian { block_size: u32, offset: f32 },
    /// Pixel vs. plain mean of its `block_size` neighbourhood minus `offset`.
    AdaptiveMean { block_size: u32, offset: f32 },
    /// Midpoint between two intensity percentiles.
    PercentileMidpoint { low: f32, high: f32 },
    Fixed(u8),
}

impl ThresholdMethod {
    pub fn apply(&self, gray: &GrayImage) -> GrayImage {
        match *self {
            ThresholdMethod::Otsu => otsu(gray),
            ThresholdMethod::AdaptiveGaussian { block_size, offset } => {
                adaptive_gaussian(gray, block_size, offset)
            }
            ThresholdMethod::AdaptiveMean { block_size, offset } => {
                adaptive_mean(gray, block_size, offset)
            }
            ThresholdMethod::PercentileMidpoint { low, high } => {
                percentile_midpoint(gray, low, high)
            }
            ThresholdMethod::Fixed(level) => fixed(gray, level),
        }
    }
}

/// Pixel-wise AND over the registered strategies: a pixel stays white only if
/// every strategy keeps it white.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdEnsemble {
    methods: Vec<ThresholdMethod>,
}

impl Default for ThresholdEnsemble {
    fn default() -> Self {
        Self::new(vec![
            ThresholdMethod::Otsu,
            ThresholdMethod::AdaptiveGaussian { block_size: 7, offset: 1.0 },
        ])
    }
}

impl ThresholdEnsemble {
    pub fn new(methods: Vec<ThresholdMethod>) -> Self {
        Self { methods }
    }

    pub fn methods(&self) -> &[ThresholdMethod] {
        &self.methods
    }

    /// An ensemble without strategies leaves the image untouched.
    pub fn apply(&self, gray: &GrayImage) -> GrayImage {
        let mut methods = self.methods.iter();
        let Some(first) = methods.next() else {
            return gray.clone();
        };
        let mut combined = first.apply(gray);
        for method in methods {
            let mask = method.apply(gray);
            for (dst, src) in combined.pixels_mut().zip(mask.pixels()) {
                dst[0] &= src[0];
            }
        }
        combined
    }
}

pub fn otsu(gray: &GrayImage) -> GrayImage {
    fixed(gray, otsu_level(gray))
}

pub fn fixed(gray: &GrayImage, level: u8) -> GrayImage {
    binarize(gray, |_, _, v| v as f32 > level as f32)
}

pub fn adaptive_gaussian(gray: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    local_threshold(gray, &gaussian_kernel(block_size), offset)
}

pub fn adaptive_mean(gray: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    let size = odd(block_size) as usize;
    local_threshold(gray, &vec![1.0 / size as f32; size], offset)
}

/// Pixel vs. its neighbourhood weighted by `kernel` along both axes. The blur
/// runs at `f32`; the local level is rounded before the comparison.
fn local_threshold(gray: &GrayImage, kernel: &[f32], offset: f32) -> GrayImage {
    let levels: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([gray.get_pixel(x, y)[0] as f32])
        });
    let local = separable_filter_equal(&levels, kernel);
    binarize(gray, |x, y, v| v as f32 > local.get_pixel(x, y)[0].round() - offset)
}

/// Threshold halfway between the `low` and `high` percentiles of the intensities.
pub fn percentile_midpoint(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let level = (percentile(gray, low) + percentile(gray, high)) / 2.0;
    binarize(gray, |_, _, v| v as f32 > level)
}

/// Linear-interpolated percentile over the pixel intensities (`pct` in 0–100).
pub fn percentile(gray: &GrayImage, pct: f32) -> f32 {
    let total = gray.pixels().len();
    if total == 0 {
        return 0.0;
    }
    let mut hist = [0usize; 256];
    for p in gray.pixels() {
        hist[p[0] as usize] += 1;
    }

    let rank = pct.clamp(0.0, 100.0) / 100.0 * (total - 1) as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let value_at = |index: usize| {
        let mut seen = 0;
        for (value, count) in hist.iter().enumerate() {
            seen += count;
            if seen > index {
                return value as f32;
            }
        }
        255.0
    };
    let (lo, hi) = (value_at(lower), value_at(upper));
    lo + (hi - lo) * (rank - lower as f32)
}

fn binarize<F>(gray: &GrayImage, keep: F) -> GrayImage
where
    F: Fn(u32, u32, u8) -> bool,
{
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Luma([if keep(x, y, v) { 255 } else { 0 }])
    })
}

fn odd(n: u32) -> u32 {
    if n % 2 == 0 {
        n + 1
    } else {
        n.max(1)
    }
}

/// Normalized Gaussian taps for a block of `block_size` pixels, with sigma
/// derived from the block size as `0.3 * ((size - 1) / 2 - 1) + 0.8`.
fn gaussian_kernel(block_size: u32) -> Vec<f32> {
    let size = odd(block_size) as usize;
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f32;
    let taps: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = taps.iter().sum();
    taps.into_iter().map(|t| t / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dark text-like strokes on a bright background with a lighting gradient.
    fn page() -> GrayImage {
        ImageBuffer::from_fn(40, 20, |x, y| {
            let background = 150 + (x * 2) as u8;
            Luma([if y % 5 == 2 && x % 7 < 4 { 20 } else { background }])
        })
    }

    fn is_binary(img: &GrayImage) -> bool {
        img.pixels().all(|p| p[0] == 0 || p[0] == 255)
    }

    #[test]
    fn fixed_levels() {
        let img: GrayImage =
            ImageBuffer::from_fn(3, 1, |x, _| Luma([[50u8, 150, 250][x as usize]]));
        let low = fixed(&img, 100);
        let high = fixed(&img, 200);
        assert_eq!(low.as_raw(), &vec![0, 255, 255]);
        assert_eq!(high.as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn otsu_separates_strokes_from_background() {
        let out = otsu(&page());
        assert!(is_binary(&out));
        assert_eq!(out.get_pixel(0, 2)[0], 0);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn adaptive_variants_are_binary_and_mark_strokes() {
        for out in [adaptive_gaussian(&page(), 7, 1.0), adaptive_mean(&page(), 11, 2.0)] {
            assert!(is_binary(&out));
            assert_eq!(out.get_pixel(1, 2)[0], 0);
        }
    }

    #[test]
    fn adaptive_threshold_keeps_flat_regions_white() {
        let flat: GrayImage = ImageBuffer::from_fn(9, 9, |_, _| Luma([120]));
        assert!(adaptive_gaussian(&flat, 7, 1.0).pixels().all(|p| p[0] == 255));
        assert!(adaptive_mean(&flat, 5, 1.0).pixels().all(|p| p[0] == 255));
        assert!(adaptive_mean(&flat, 5, 0.0).pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn gaussian_kernel_is_normalized_and_peaked() {
        let k = gaussian_kernel(7);
        assert_eq!(k.len(), 7);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(k[3] > k[2] && k[2] > k[1]);
    }

    #[test]
    fn percentile_of_ramp() {
        let img: GrayImage = ImageBuffer::from_fn(11, 1, |x, _| Luma([(x * 10) as u8]));
        assert_eq!(percentile(&img, 10.0), 10.0);
        assert_eq!(percentile(&img, 90.0), 90.0);
        assert_eq!(percentile(&img, 50.0), 50.0);
    }

    #[test]
    fn percentile_midpoint_splits_ramp() {
        let img: GrayImage = ImageBuffer::from_fn(11, 1, |x, _| Luma([(x * 10) as u8]));
        let out = percentile_midpoint(&img, 10.0, 90.0);
        assert_eq!(out.get_pixel(5, 0)[0], 0);
        assert_eq!(out.get_pixel(6, 0)[0], 255);
    }

    #[test]
    fn ensemble_is_pixelwise_and() {
        let img: GrayImage =
            ImageBuffer::from_fn(3, 1, |x, _| Luma([[50u8, 150, 250][x as usize]]));
        let ensemble =
            ThresholdEnsemble::new(vec![ThresholdMethod::Fixed(100), ThresholdMethod::Fixed(200)]);
        assert_eq!(ensemble.apply(&img), fixed(&img, 200));
    }

    #[test]
    fn default_ensemble_registers_otsu_and_gaussian() {
        assert_eq!(
            ThresholdEnsemble::default().methods(),
            &[
                ThresholdMethod::Otsu,
                ThresholdMethod::AdaptiveGaussian { block_size: 7, offset: 1.0 }
            ]
        );
    }

    #[test]
    fn empty_ensemble_is_identity() {
        let img = page();
        assert_eq!(ThresholdEnsemble::new(vec![]).apply(&img), img);
    }
}
