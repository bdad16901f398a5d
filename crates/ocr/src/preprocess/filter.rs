use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::{median_filter, Kernel};

/// Heavy center weight against a negative outer ring; sums to 16, so the
/// divisor of 8 doubles flat regions while steepening edges. Row-major 7×7.
#[rustfmt::skip]
const SHARPEN_KERNEL: [f32; 49] = [
    -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0,
    -1.0,  1.0,  1.0,  1.0,  1.0,  1.0, -1.0,
    -1.0,  1.0,  2.0,  2.0,  2.0,  1.0, -1.0,
    -1.0,  1.0,  2.0,  8.0,  2.0,  1.0, -1.0,
    -1.0,  1.0,  2.0,  2.0,  2.0,  1.0, -1.0,
    -1.0,  1.0,  1.0,  1.0,  1.0,  1.0, -1.0,
    -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0,
];
const SHARPEN_DIVISOR: f32 = 8.0;

/// Edge-preserving smoothing, then median, then a lighter smoothing pass.
pub(super) fn reduce_noise(gray: &GrayImage) -> GrayImage {
    let smoothed = bilateral(gray, 15, 80.0, 80.0);
    let despeckled = median_filter(&smoothed, 2, 2);
    bilateral(&despeckled, 9, 60.0, 60.0)
}

/// Borders replicate the edge pixel.
pub(super) fn sharpen(gray: &GrayImage) -> GrayImage {
    Kernel::new(&SHARPEN_KERNEL, 7, 7).filter(gray, |out: &mut u8, sum: f32| {
        *out = (sum / SHARPEN_DIVISOR).round().clamp(0.0, 255.0) as u8;
    })
}

/// Bilateral filter over a circular window of the given diameter.
/// `imageproc::filter::bilateral_filter` only takes square windows.
///
/// Weights are the product of a spatial Gaussian (`sigma_space`) and an
/// intensity-difference Gaussian (`sigma_color`); borders replicate the edge pixel.
pub(super) fn bilateral(
    gray: &GrayImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let (width, height) = gray.dimensions();
    let radius = (diameter / 2) as i64;

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let color_weights: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let mut window = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2.sqrt() <= radius as f32 {
                window.push((dx, dy, (r2 * space_coeff).exp()));
            }
        }
    }

    ImageBuffer::from_fn(width, height, |x, y| {
        let center = gray.get_pixel(x, y)[0] as i32;
        let mut acc = 0.0f32;
        let mut norm = 0.0f32;
        for &(dx, dy, space_weight) in &window {
            let sx = clamp_coord(x as i64 + dx, width);
            let sy = clamp_coord(y as i64 + dy, height);
            let v = gray.get_pixel(sx, sy)[0] as i32;
            let w = space_weight * color_weights[(v - center).unsigned_abs() as usize];
            acc += v as f32 * w;
            norm += w;
        }
        Luma([(acc / norm).round().clamp(0.0, 255.0) as u8])
    })
}

fn clamp_coord(c: i64, extent: u32) -> u32 {
    c.clamp(0, extent as i64 - 1) as u32
}
