use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::recognizer::{BoundingBox, Word};

/// Fields pulled from one transcript. Every field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub raw_text: String,
    pub invoice_number: Option<String>,
    /// Date as printed, e.g. `9/10/2025 10:37:21` or `15 de marzo de 2025`.
    pub date: Option<String>,
    /// `date` read day-first, when it names a real calendar day.
    pub issued_on: Option<NaiveDate>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub total_amount: Option<Decimal>,
    pub currency: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub subtotal: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub tax: Option<Decimal>,
    #[serde(rename = "nif_cif")]
    pub tax_id: Option<String>,
    pub vendor_name: Option<String>,
    pub client_name: Option<String>,
    pub email: Option<String>,
    /// Never populated; tables are not parsed.
    #[serde(rename = "items")]
    pub line_items: Vec<LineItem>,
    /// Share of the seven key fields that were found, 0–100.
    #[serde(rename = "confidence")]
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub quantity: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
}

// ── Response payloads ─────────────────────────────────────────────────────────

/// `{"success": true, ...body}` or `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Success {
        success: bool,
        #[serde(flatten)]
        body: T,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl<T> ApiResponse<T> {
    pub fn ok(body: T) -> Self {
        ApiResponse::Success { success: true, body }
    }

    pub fn failed(error: impl ToString) -> Self {
        ApiResponse::Failure { success: false, error: error.to_string() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for ApiResponse<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(body) => ApiResponse::ok(body),
            Err(e) => ApiResponse::failed(e),
        }
    }
}

/// A recognized word as reported to callers; only words with a confidence qualify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

impl WordBox {
    /// Keep `word` only if its confidence is strictly above `min_confidence`.
    pub fn from_word(word: &Word, min_confidence: f32) -> Option<Self> {
        let confidence = word.confidence.filter(|c| *c > min_confidence)?;
        Some(Self {
            text: word.text.clone(),
            confidence,
            bounding_box: word.bounding_box,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub total_words: usize,
    pub average_confidence: f64,
}

impl ProcessingInfo {
    pub fn from_words(words: &[WordBox]) -> Self {
        let average_confidence = if words.is_empty() {
            0.0
        } else {
            words.iter().map(|w| f64::from(w.confidence)).sum::<f64>() / words.len() as f64
        };
        Self { total_words: words.len(), average_confidence }
    }
}

/// Body of a successful invoice scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceScan {
    pub invoice_data: InvoiceRecord,
    pub words: Vec<WordBox>,
    pub processing_info: ProcessingInfo,
}

/// Body of a successful receipt read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub text: String,
    pub lines: Vec<String>,
    /// The amount exactly as printed on the total line.
    pub total: Option<String>,
}
