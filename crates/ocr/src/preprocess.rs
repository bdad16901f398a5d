use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

mod contrast;
mod filter;
mod morphology;
mod skew;
pub mod threshold;

pub use threshold::{ThresholdEnsemble, ThresholdMethod};

/// Linear supersampling factor applied before any filtering.
pub const UPSCALE_FACTOR: u32 = 4;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Decode raw upload bytes (JPEG / PNG / WEBP / …) into a raster.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    Ok(image::load_from_memory(data)?)
}

/// Single-channel binarized raster ready for text recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancedImage(GrayImage);

impl EnhancedImage {
    pub fn new(gray: GrayImage) -> Self {
        Self(gray)
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_gray(self) -> GrayImage {
        self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Encode as PNG, the format recognition engines accept from memory.
    pub fn to_png(&self) -> Result<Vec<u8>, PreprocessError> {
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(self.0.clone())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| PreprocessError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

/// Fixed enhancement pipeline: upscale → grayscale → deskew → contrast
/// ensemble → denoise → sharpen → threshold ensemble → morphology.
///
/// Every stage after grayscale conversion is guarded: a stage that panics on
/// degenerate input is skipped and the previous image flows on.
#[derive(Debug, Clone, Default)]
pub struct ImageEnhancer {
    thresholds: ThresholdEnsemble,
}

impl ImageEnhancer {
    pub fn new(thresholds: ThresholdEnsemble) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ThresholdEnsemble {
        &self.thresholds
    }

    pub fn enhance(&self, raw: &DynamicImage) -> EnhancedImage {
        let gray = upscale(raw).to_luma8();

        let gray = guarded("skew correction", gray, skew::deskew);
        let gray = guarded("contrast", gray, contrast::enhance_contrast);
        let gray = guarded("noise reduction", gray, filter::reduce_noise);
        let gray = guarded("sharpen", gray, filter::sharpen);
        let gray = guarded("threshold", gray, |g| self.thresholds.apply(g));
        let gray = guarded("morphology", gray, morphology::clean_up);

        EnhancedImage(gray)
    }
}

fn upscale(img: &DynamicImage) -> DynamicImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    img.resize_exact(
        img.width() * UPSCALE_FACTOR,
        img.height() * UPSCALE_FACTOR,
        FilterType::CatmullRom,
    )
}

fn guarded<F>(stage: &str, input: GrayImage, f: F) -> GrayImage
where
    F: FnOnce(&GrayImage) -> GrayImage,
{
    if input.width() == 0 || input.height() == 0 {
        return input;
    }
    match catch_unwind(AssertUnwindSafe(|| f(&input))) {
        Ok(output) => output,
        Err(_) => {
            tracing::warn!("Enhancement stage '{stage}' failed; passing image through");
            input
        }
    }
}
