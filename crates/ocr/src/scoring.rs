use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::recognizer::Word;

/// Terms whose presence marks a transcript as invoice-like. Each counts once.
const KEYWORDS: [&str; 13] = [
    "factura", "invoice", "total", "iva", "tax", "fecha", "date", "nit", "cif", "cliente",
    "client", "proveedor", "vendor",
];

const LENGTH_WEIGHT: f64 = 0.1;
const KEYWORD_BONUS: f64 = 5.0;
const DIGIT_RUN_BONUS: f64 = 0.5;
const CURRENCY_BONUS: f64 = 3.0;
const SHORT_TEXT: usize = 50;
const LONG_TEXT: usize = 2000;
const SHORT_PENALTY: f64 = -10.0;
const LONG_PENALTY: f64 = -5.0;

fn re_digit_run() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\d+").expect("invalid regex"))
}

/// Components of the composite candidate score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub avg_confidence: f64,
    pub text_length: usize,
    pub keyword_hits: usize,
    pub digit_runs: usize,
    pub currency_symbols: usize,
    pub length_penalty: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.avg_confidence
            + LENGTH_WEIGHT * self.text_length as f64
            + KEYWORD_BONUS * self.keyword_hits as f64
            + DIGIT_RUN_BONUS * self.digit_runs as f64
            + CURRENCY_BONUS * self.currency_symbols as f64
            + self.length_penalty
    }
}

/// Score a transcript and its word confidences.
pub fn score(text: &str, words: &[Word]) -> ScoreBreakdown {
    let trimmed = text.trim();
    let text_length = trimmed.chars().count();
    let lower = trimmed.to_lowercase();

    let length_penalty = if text_length < SHORT_TEXT {
        SHORT_PENALTY
    } else if text_length > LONG_TEXT {
        LONG_PENALTY
    } else {
        0.0
    };

    ScoreBreakdown {
        avg_confidence: average_confidence(words),
        text_length,
        keyword_hits: KEYWORDS.iter().filter(|k| lower.contains(*k)).count(),
        digit_runs: re_digit_run().find_iter(trimmed).count(),
        currency_symbols: trimmed.chars().filter(|c| matches!(c, '$' | '€')).count(),
        length_penalty,
    }
}

/// Mean of the reported word confidences; words without one are skipped.
pub fn average_confidence(words: &[Word]) -> f64 {
    let reported: Vec<f64> = words.iter().filter_map(|w| w.confidence).map(f64::from).collect();
    if reported.is_empty() {
        0.0
    } else {
        reported.iter().sum::<f64>() / reported.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::BoundingBox;

    fn word(text: &str, confidence: Option<f32>) -> Word {
        Word {
            text: text.into(),
            confidence,
            bounding_box: BoundingBox { x: 0, y: 0, width: 1, height: 1 },
        }
    }

    #[test]
    fn average_skips_missing_confidences() {
        let words = [word("a", Some(80.0)), word("b", None), word("c", Some(60.0))];
        assert_eq!(average_confidence(&words), 70.0);
        assert_eq!(average_confidence(&[word("x", None)]), 0.0);
        assert_eq!(average_confidence(&[]), 0.0);
    }

    #[test]
    fn short_text_is_penalized() {
        let s = score("hola", &[]);
        assert_eq!(s.length_penalty, -10.0);
        assert_eq!(s.text_length, 4);
        assert!((s.total() - (0.4 - 10.0)).abs() < 1e-9);
    }

    #[test]
    fn long_text_is_penalized_less() {
        let s = score(&"a".repeat(2001), &[]);
        assert_eq!(s.length_penalty, -5.0);
    }

    #[test]
    fn counts_keywords_digits_and_currency() {
        let text = "FACTURA No. C168-152015\nFecha 9/10/2025\nTOTAL: $45.900\nIVA 19%: $7.300 total";
        let s = score(text, &[word("FACTURA", Some(90.0))]);
        // factura, total, iva, fecha
        assert_eq!(s.keyword_hits, 4);
        assert_eq!(s.digit_runs, 10);
        assert_eq!(s.currency_symbols, 2);
        assert_eq!(s.avg_confidence, 90.0);
        assert_eq!(s.length_penalty, 0.0);
    }

    #[test]
    fn total_combines_all_terms() {
        let s = ScoreBreakdown {
            avg_confidence: 50.0,
            text_length: 100,
            keyword_hits: 2,
            digit_runs: 4,
            currency_symbols: 1,
            length_penalty: 0.0,
        };
        assert!((s.total() - (50.0 + 10.0 + 10.0 + 2.0 + 3.0)).abs() < 1e-9);
    }
}
