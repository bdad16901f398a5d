use facturo_core::RecognitionProfile;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::preprocess::EnhancedImage;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Recognition with '{profile}' timed out after {after:?}")]
    TimedOut { profile: String, after: Duration },
    #[error("Recognition unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One recognized word. `confidence` is 0–100, `None` when the engine reports none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub confidence: Option<f32>,
    pub bounding_box: BoundingBox,
}

/// Raw output of one engine run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub words: Vec<Word>,
}

/// Abstraction over an OCR backend.
/// Implementations receive the enhanced image and the profile to run it with.
pub trait OcrBackend: Send + Sync {
    fn recognize(
        &self,
        image: &EnhancedImage,
        profile: &RecognitionProfile,
    ) -> Result<Recognition, OcrError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set transcript for every profile, so the pipeline can be
/// exercised without Tesseract installed.
///
/// Word boxes are laid out on a fixed grid, one text line per row.
pub struct MockRecognizer {
    pub text: String,
    pub confidence: f32,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), confidence: 90.0 }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(
        &self,
        _image: &EnhancedImage,
        _profile: &RecognitionProfile,
    ) -> Result<Recognition, OcrError> {
        let words = self
            .text
            .lines()
            .enumerate()
            .flat_map(|(row, line)| {
                line.split_whitespace().enumerate().map(move |(col, token)| Word {
                    text: token.to_string(),
                    confidence: Some(self.confidence),
                    bounding_box: BoundingBox {
                        x: col as i32 * 100,
                        y: row as i32 * 40,
                        width: 90,
                        height: 30,
                    },
                })
            })
            .collect();
        Ok(Recognition { text: self.text.clone(), words })
    }
}

// ── Engine TSV output ─────────────────────────────────────────────────────────

/// Parse tesseract's TSV output into word entries.
///
/// Columns: level, page, block, paragraph, line, word, left, top, width, height,
/// conf, text. Only word-level rows (level 5) with non-empty text are kept; a
/// confidence of -1 is reported as missing.
pub fn parse_tsv(tsv: &str) -> Vec<Word> {
    tsv.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            let text = cols[11].trim();
            if text.is_empty() {
                return None;
            }
            let confidence = cols[10].trim().parse::<f32>().ok().filter(|c| *c >= 0.0);
            Some(Word {
                text: text.to_string(),
                confidence,
                bounding_box: BoundingBox {
                    x: cols[6].parse().ok()?,
                    y: cols[7].parse().ok()?,
                    width: cols[8].parse().ok()?,
                    height: cols[9].parse().ok()?,
                },
            })
        })
        .collect()
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{parse_tsv, OcrBackend, OcrError, Recognition};
    use crate::preprocess::EnhancedImage;
    use facturo_core::RecognitionProfile;
    use leptess::{LepTess, Variable};

    /// Language used when a profile carries no hint.
    const DEFAULT_LANG: &str = "eng";

    pub struct TesseractRecognizer {
        data_path: Option<String>,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>) -> Self {
            Self { data_path }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(
            &self,
            image: &EnhancedImage,
            profile: &RecognitionProfile,
        ) -> Result<Recognition, OcrError> {
            let lang = profile.language.as_deref().unwrap_or(DEFAULT_LANG);
            let mut lt = LepTess::new(self.data_path.as_deref(), lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(
                Variable::TesseditOcrEngineMode,
                &profile.engine_mode.code().to_string(),
            )
            .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(
                Variable::TesseditPagesegMode,
                &profile.segmentation.code().to_string(),
            )
            .map_err(|e| OcrError::Engine(e.to_string()))?;

            let png = image
                .to_png()
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;

            let text = lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))?;
            let tsv = lt.get_tsv_text(0).map_err(|e| OcrError::Engine(e.to_string()))?;
            Ok(Recognition { text, words: parse_tsv(&tsv) })
        }
    }
}
