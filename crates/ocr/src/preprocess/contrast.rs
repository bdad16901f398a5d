use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contrast::equalize_histogram;

const HIST_BINS: usize = 256;

/// Blend of three CLAHE variants (small, large and mid-sized text assumptions)
/// and a global histogram equalization.
/// Every blend stage is a convex combination.
pub(super) fn enhance_contrast(gray: &GrayImage) -> GrayImage {
    let fine = clahe(gray, 6.0, 4);
    let gentle = clahe(gray, 2.0, 12);
    let strong = clahe(gray, 8.0, 6);
    let equalized = equalize_histogram(gray);

    let blended = blend(&fine, 4.0 / 7.0, &gentle);
    let blended = blend(&blended, 7.0 / 9.0, &strong);
    blend(&blended, 8.0 / 9.0, &equalized)
}

/// `weight * a + (1 - weight) * b`, rounded and saturated.
pub(super) fn blend(a: &GrayImage, weight: f32, b: &GrayImage) -> GrayImage {
    ImageBuffer::from_fn(a.width(), a.height(), |x, y| {
        let v = a.get_pixel(x, y)[0] as f32 * weight + b.get_pixel(x, y)[0] as f32 * (1.0 - weight);
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Contrast-limited adaptive histogram equalization over a `tiles × tiles` grid.
///
/// Each tile's histogram is clipped at `clip_limit × mean bin height`, the excess
/// is spread evenly over all bins, and pixel values are bilinearly interpolated
/// between the lookup tables of the four nearest tile centers.
pub(super) fn clahe(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 || tiles == 0 {
        return gray.clone();
    }
    let tiles_x = tiles.min(width) as usize;
    let tiles_y = tiles.min(height) as usize;

    let x_bounds = tile_bounds(width, tiles_x);
    let y_bounds = tile_bounds(height, tiles_y);

    let mut luts = Vec::with_capacity(tiles_x * tiles_y);
    for &(y0, y1) in &y_bounds {
        for &(x0, x1) in &x_bounds {
            luts.push(tile_lut(gray, (x0, x1), (y0, y1), clip_limit));
        }
    }

    let tile_w = width as f32 / tiles_x as f32;
    let tile_h = height as f32 / tiles_y as f32;

    ImageBuffer::from_fn(width, height, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, fx) = neighbours((x as f32 + 0.5) / tile_w - 0.5, tiles_x);
        let (ty0, ty1, fy) = neighbours((y as f32 + 0.5) / tile_h - 0.5, tiles_y);

        let at = |tx: usize, ty: usize| luts[ty * tiles_x + tx][v] as f32;
        let top = at(tx0, ty0) * (1.0 - fx) + at(tx1, ty0) * fx;
        let bottom = at(tx0, ty1) * (1.0 - fx) + at(tx1, ty1) * fx;
        let out = top * (1.0 - fy) + bottom * fy;
        Luma([out.round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_bounds(extent: u32, tiles: usize) -> Vec<(u32, u32)> {
    (0..tiles)
        .map(|t| {
            let start = (t as u64 * extent as u64 / tiles as u64) as u32;
            let end = ((t as u64 + 1) * extent as u64 / tiles as u64) as u32;
            (start, end)
        })
        .collect()
}

/// Indices of the two tile centers around position `pos` (in tile units) and
/// the interpolation weight of the second one.
fn neighbours(pos: f32, tiles: usize) -> (usize, usize, f32) {
    let last = (tiles - 1) as f32;
    let clamped = pos.clamp(0.0, last);
    let lo = clamped.floor() as usize;
    let hi = (lo + 1).min(tiles - 1);
    (lo, hi, clamped - lo as f32)
}

fn tile_lut(
    gray: &GrayImage,
    (x0, x1): (u32, u32),
    (y0, y1): (u32, u32),
    clip_limit: f32,
) -> [u8; HIST_BINS] {
    let mut hist = [0u32; HIST_BINS];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) * (y1 - y0);
    let mut lut = [0u8; HIST_BINS];
    if area == 0 {
        return lut;
    }

    clip_histogram(&mut hist, clip_limit, area);

    let scale = 255.0 / area as f32;
    let mut cumulative = 0u32;
    for (bin, count) in hist.iter().enumerate() {
        cumulative += count;
        lut[bin] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

fn clip_histogram(hist: &mut [u32; HIST_BINS], clip_limit: f32, area: u32) {
    let limit = ((clip_limit * area as f32 / HIST_BINS as f32) as u32).max(1);

    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }

    let per_bin = excess / HIST_BINS as u32;
    let mut residual = excess % HIST_BINS as u32;
    for count in hist.iter_mut() {
        *count += per_bin;
    }
    if residual > 0 {
        let step = (HIST_BINS / residual as usize).max(1);
        let mut bin = 0;
        while bin < HIST_BINS && residual > 0 {
            hist[bin] += 1;
            residual -= 1;
            bin += step;
        }
    }
}
