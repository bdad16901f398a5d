use facturo_core::OcrSettings;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::extract::Extractor;
use crate::preprocess::{self, EnhancedImage, ImageEnhancer, PreprocessError};
use crate::recognizer::{OcrBackend, OcrError};
use crate::runner::ProfileRunner;
use crate::types::{ApiResponse, InvoiceScan, ProcessingInfo, ReceiptSummary, WordBox};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn re_receipt_amount() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\b(\d{1,3}(?:[.,]\d{3})*[.,]\d{2})\b").expect("invalid regex"))
}

/// Orchestrates: decode → enhance → profile selection → extract, plus the
/// single-profile receipt read.
pub struct InvoicePipeline<R: OcrBackend> {
    runner: ProfileRunner<R>,
    enhancer: ImageEnhancer,
    extractor: Extractor,
    settings: OcrSettings,
}

impl<R: OcrBackend + 'static> InvoicePipeline<R> {
    pub fn new(backend: R, settings: OcrSettings) -> Self {
        let runner =
            ProfileRunner::new(backend, settings.profiles.clone(), settings.attempt_timeout());
        Self {
            runner,
            enhancer: ImageEnhancer::default(),
            extractor: Extractor::new(settings.default_currency.clone()),
            settings,
        }
    }

    pub fn with_enhancer(mut self, enhancer: ImageEnhancer) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn settings(&self) -> &OcrSettings {
        &self.settings
    }

    /// Full invoice scan of an encoded image.
    ///
    /// Fields come from the best-scoring transcript; word boxes come from the
    /// reference profile and are limited to words above the configured
    /// confidence floor.
    pub async fn process_invoice(&self, data: &[u8]) -> Result<InvoiceScan, PipelineError> {
        let image = self.prepare(data).await?;
        let selection = self.runner.select_best(&image).await?;

        let best = &selection.best;
        tracing::info!(
            "Selected [{}] score={:.1} ({} chars)",
            best.profile,
            best.score(),
            best.transcript.chars().count()
        );
        let invoice_data = self.extractor.extract(&best.transcript);

        let reference = match selection.reference {
            Some(reference) => reference,
            None => self.runner.run_reference(&image).await?,
        };
        let words: Vec<WordBox> = reference
            .words
            .iter()
            .filter_map(|w| WordBox::from_word(w, self.settings.min_word_confidence))
            .collect();
        let processing_info = ProcessingInfo::from_words(&words);

        Ok(InvoiceScan { invoice_data, words, processing_info })
    }

    /// Single-profile read for till receipts: trimmed lines and the amount on
    /// the first line that mentions a total.
    pub async fn analyze_receipt(&self, data: &[u8]) -> Result<ReceiptSummary, PipelineError> {
        let image = self.prepare(data).await?;
        let recognition = self
            .runner
            .run_unguarded(&image, &self.settings.receipt_profile)
            .await?;

        let lines: Vec<String> = recognition
            .text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        let total = receipt_total(&lines);
        tracing::info!("Receipt read: {} lines, total={:?}", lines.len(), total);

        Ok(ReceiptSummary { text: recognition.text, lines, total })
    }

    pub async fn invoice_response(&self, data: &[u8]) -> ApiResponse<InvoiceScan> {
        let result = self.process_invoice(data).await;
        if let Err(e) = &result {
            tracing::warn!("Invoice scan failed: {e}");
        }
        result.into()
    }

    pub async fn receipt_response(&self, data: &[u8]) -> ApiResponse<ReceiptSummary> {
        let result = self.analyze_receipt(data).await;
        if let Err(e) = &result {
            tracing::warn!("Receipt read failed: {e}");
        }
        result.into()
    }

    /// Decode and enhance off the async workers.
    async fn prepare(&self, data: &[u8]) -> Result<Arc<EnhancedImage>, PipelineError> {
        let bytes = data.to_vec();
        let enhancer = self.enhancer.clone();
        let enhanced = tokio::task::spawn_blocking(move || {
            let raw = preprocess::decode_image(&bytes)?;
            tracing::debug!("Decoded {}x{} image", raw.width(), raw.height());
            Ok::<_, PreprocessError>(enhancer.enhance(&raw))
        })
        .await??;
        Ok(Arc::new(enhanced))
    }
}

fn receipt_total(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        let lower = line.to_lowercase();
        if !(lower.contains("total") || lower.contains("importe")) {
            return None;
        }
        re_receipt_amount()
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{MockRecognizer, Recognition};
    use facturo_core::RecognitionProfile;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::io::Cursor;

    const KIOSK: &str = "IRCC S.A.S.\n\
                         NIT 900.123.456-7\n\
                         FACTURA No. C168-152015\n\
                         Fecha: 9/10/2025 10:37\n\
                         CLIENTE: 222222222222\n\
                         CONSUMIDOR FINAL\n\
                         IVA 19%: $7.300\n\
                         TOTAL: $45.900\n";

    struct BrokenEngine;

    impl OcrBackend for BrokenEngine {
        fn recognize(
            &self,
            _: &EnhancedImage,
            _: &RecognitionProfile,
        ) -> Result<Recognition, OcrError> {
            Err(OcrError::Engine("no language data".into()))
        }
    }

    fn tiny_png() -> Vec<u8> {
        let img: GrayImage =
            ImageBuffer::from_fn(8, 6, |x, y| Luma([if (x + y) % 3 == 0 { 30 } else { 220 }]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn pipeline(text: &str) -> InvoicePipeline<MockRecognizer> {
        InvoicePipeline::new(MockRecognizer::new(text), OcrSettings::default())
    }

    #[tokio::test]
    async fn process_invoice_extracts_fields_and_words() {
        let scan = pipeline(KIOSK).process_invoice(&tiny_png()).await.unwrap();

        let data = &scan.invoice_data;
        assert_eq!(data.invoice_number.as_deref(), Some("C168-152015"));
        assert_eq!(data.total_amount, Some(Decimal::from(45900)));
        assert!(data.tax.is_some());
        assert!(data.confidence_score >= 42.8);

        assert_eq!(scan.words.len(), KIOSK.split_whitespace().count());
        assert_eq!(scan.processing_info.total_words, scan.words.len());
        assert_eq!(scan.processing_info.average_confidence, 90.0);
    }

    #[tokio::test]
    async fn low_confidence_words_are_dropped() {
        let p = InvoicePipeline::new(
            MockRecognizer::new(KIOSK).with_confidence(30.0),
            OcrSettings::default(),
        );
        let scan = p.process_invoice(&tiny_png()).await.unwrap();
        assert!(scan.words.is_empty());
        assert_eq!(scan.processing_info.total_words, 0);
        assert_eq!(scan.processing_info.average_confidence, 0.0);
        assert_eq!(scan.invoice_data.invoice_number.as_deref(), Some("C168-152015"));
    }

    #[tokio::test]
    async fn configured_currency_is_used() {
        let settings = OcrSettings { default_currency: "EUR".into(), ..OcrSettings::default() };
        let p = InvoicePipeline::new(MockRecognizer::new("TOTAL 12,50"), settings);
        let scan = p.process_invoice(&tiny_png()).await.unwrap();
        assert_eq!(scan.invoice_data.currency, "EUR");
    }

    #[tokio::test]
    async fn undecodable_bytes_fail_the_request() {
        let p = pipeline(KIOSK);
        let err = p.process_invoice(b"not an image").await.unwrap_err();
        assert!(matches!(err, PipelineError::Preprocess(PreprocessError::Decode(_))));

        let response = serde_json::to_value(p.invoice_response(b"not an image").await).unwrap();
        assert_eq!(response["success"], json!(false));
        assert!(response["error"].as_str().unwrap().contains("preprocessing"));
    }

    #[tokio::test]
    async fn engine_failure_is_reported_as_unavailable() {
        let p = InvoicePipeline::new(BrokenEngine, OcrSettings::default());
        let err = p.process_invoice(&tiny_png()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Ocr(OcrError::Unavailable(_))));
        assert!(!p.receipt_response(&tiny_png()).await.is_success());
    }

    #[tokio::test]
    async fn invoice_response_shape() {
        let response = pipeline(KIOSK).invoice_response(&tiny_png()).await;
        let v = serde_json::to_value(&response).unwrap();
        assert_eq!(v["success"], json!(true));
        assert_eq!(v["invoice_data"]["invoice_number"], json!("C168-152015"));
        assert_eq!(v["invoice_data"]["total_amount"], json!(45900.0));
        assert!(v["words"][0]["bounding_box"]["width"].is_u64());
        assert!(v["processing_info"]["total_words"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn analyze_receipt_reads_total_line() {
        let text = "  PANADERIA LA 14 \n\nPAN 3,00\nImporte total: 12,50\nCambio 7,50\n";
        let summary = pipeline(text).analyze_receipt(&tiny_png()).await.unwrap();
        assert_eq!(summary.text, text);
        assert_eq!(
            summary.lines,
            ["PANADERIA LA 14", "PAN 3,00", "Importe total: 12,50", "Cambio 7,50"]
        );
        assert_eq!(summary.total.as_deref(), Some("12,50"));
    }

    #[tokio::test]
    async fn analyze_receipt_without_total() {
        let summary = pipeline("GRACIAS\n").analyze_receipt(&tiny_png()).await.unwrap();
        assert!(summary.total.is_none());
        assert_eq!(summary.lines, ["GRACIAS"]);
    }

    #[test]
    fn receipt_total_needs_cents() {
        let lines = vec!["TOTAL: $45.900".to_string(), "Total a pagar 1.250,00".to_string()];
        assert_eq!(receipt_total(&lines).as_deref(), Some("1.250,00"));
    }
}
