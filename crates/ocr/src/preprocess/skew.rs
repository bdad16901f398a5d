use image::{GrayImage, Luma};
use imageproc::edges::canny;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};

// Low thresholds so faint print still yields edges.
const CANNY_LOW: f32 = 20.0;
const CANNY_HIGH: f32 = 80.0;
const HOUGH_VOTE_THRESHOLD: u32 = 30;
const HOUGH_SUPPRESSION_RADIUS: u32 = 8;

/// Lines further than this from the 0°/180° axis do not vote on the skew.
const BAND_DEGREES: f32 = 15.0;
const MIN_CORRECTION_DEGREES: f32 = 0.1;

/// Rotate `gray` to cancel the estimated skew. Returns an unrotated copy when
/// no line qualifies or the tilt is negligible.
pub(super) fn deskew(gray: &GrayImage) -> GrayImage {
    correct_skew(gray, estimate_skew(gray))
}

/// A positive skew leans near-vertical strokes like `/`, i.e. the page was
/// turned clockwise; the correction turns it back counter-clockwise.
fn correct_skew(gray: &GrayImage, skew: Option<f32>) -> GrayImage {
    match skew {
        Some(angle) if angle.abs() > MIN_CORRECTION_DEGREES => {
            tracing::debug!("Correcting skew of {angle:.2} degrees");
            rotate_about_center(gray, -angle.to_radians(), Interpolation::Bilinear, Luma([255u8]))
        }
        Some(_) => gray.clone(),
        None => {
            tracing::debug!("No usable lines for skew estimation");
            gray.clone()
        }
    }
}

/// Mean signed deviation (degrees) of the detected lines that fall inside the band.
///
/// Hough angles are those of the line normal, so the band around 0° and 180°
/// selects near-vertical strokes.
pub(super) fn estimate_skew(gray: &GrayImage) -> Option<f32> {
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let options = LineDetectionOptions {
        vote_threshold: HOUGH_VOTE_THRESHOLD,
        suppression_radius: HOUGH_SUPPRESSION_RADIUS,
    };
    mean_band_angle(&detect_lines(&edges, options))
}

fn mean_band_angle(lines: &[PolarLine]) -> Option<f32> {
    let angles: Vec<f32> = lines
        .iter()
        .filter_map(|l| band_deviation(l.angle_in_degrees as f32))
        .collect();
    if angles.is_empty() {
        return None;
    }
    Some(angles.iter().sum::<f32>() / angles.len() as f32)
}

/// Angles near 180° are folded to negative deviations so that 179° and 1°
/// cancel instead of averaging to 90°.
fn band_deviation(angle: f32) -> Option<f32> {
    if angle <= BAND_DEGREES {
        Some(angle)
    } else if angle >= 180.0 - BAND_DEGREES {
        Some(angle - 180.0)
    } else {
        None
    }
}
