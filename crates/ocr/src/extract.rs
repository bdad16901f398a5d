use std::sync::OnceLock;

use chrono::NaiveDate;
use facturo_core::{normalize_amount, Strictness};
use regex::Regex;
use rust_decimal::Decimal;

use crate::types::InvoiceRecord;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Invoice number
re!(re_inv_dian,
    r"(?i)FACTURA\s+ELECTR[OÓ]NICA\s+DE\s+VENTA\s+No\.?\s*:?\s*([A-Z0-9][A-Z0-9\-]+)");
re!(re_inv_labeled,
    r"(?i)(?:factura|invoice|fact\.)\s*(?:number|num\.?|n[úuº°o]?\.?|#)\s*:?\s*([A-Z0-9][A-Z0-9\-/]{2,})");
re!(re_inv_after_title,
    r"(?i)(?:factura|invoice)\s*(?:electr[oó]nica)?\s*:?\s*([A-Z0-9][A-Z0-9\-/]{2,})");
re!(re_inv_numero,
    r"(?i)(?:\b(?:number|num\.?|n[úuº°o]\.?)|#)\s*(?:factura|invoice)?\s*:?\s*([A-Z0-9][A-Z0-9\-/]{2,})");
re!(re_inv_kiosk, r"(?i)\b(C\d+-\d+)\b");
re!(re_inv_yearly, r"(?i)\b(F-\d{4}-\d+)\b");
re!(re_inv_prefixed, r"(?i)\b([A-Z]{1,3}\d{8,})\b");

// Date
re!(re_date_seconds, r"\b(\d{1,2}[/-]\d{1,2}[/-]\d{4}\s+\d{1,2}:\d{2}:\d{2})");
re!(re_date_minutes, r"\b(\d{1,2}[/-]\d{1,2}[/-]\d{4}\s+\d{1,2}:\d{2})");
re!(re_date_labeled, r"(?i)(?:fecha|date)\s*:?\s*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})");
re!(re_date_full_year, r"\b(\d{1,2}[/-]\d{1,2}[/-]\d{4})");
re!(re_date_short_year, r"\b(\d{1,2}[/-]\d{1,2}[/-]\d{2})\b");
re!(re_date_spanish,
    r"(?i)\b(\d{1,2}\s+(?:de\s+)?(?:enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|octubre|noviembre|diciembre)\s+(?:de\s+)?\d{4})");

re!(re_numeric_date, r"^(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})");
re!(re_spanish_date,
    r"(?i)^(\d{1,2})\s+(?:de\s+)?([a-z]+)\s+(?:de\s+)?(\d{4})");

// Tax id
re!(re_tax_id_es, r"(?i)\b([A-Z]\d{7}[A-Z0-9]|\d{8}[A-Z])\b");
re!(re_nit_dotted, r"(?i)\bNIT\s*[:.]?\s*(\d{1,3}(?:\.\d{3}){2,3}-\d)");
re!(re_nit_short, r"(?i)\bNIT\s*:?\s*(\d{1,3}-\d{1,3})\b");
re!(re_nit_plain, r"(?i)\bNIT\s*:?\s*(\d{6,12}(?:-\d)?)\b");
re!(re_nit_trailing, r"(?i)\b(\d{1,3}-\d{1,3})\s*NIT\b");

// Email
re!(re_email, r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b");
re!(re_email_labeled,
    r"(?i)(?:email|correo|e-mail)\s*:?\s*([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})");

// Client
re!(re_client_after_code,
    r"(?i)(?:cliente|client)\s*:?\s*\d+\s*\n?\s*([A-ZÁÉÍÓÚÑ][A-Za-zÁÉÍÓÚÑáéíóúñ \t]{3,50})");
re!(re_client_inline,
    r"(?i)(?:cliente|client)\s*:?\s*([A-ZÁÉÍÓÚÑ][A-Za-zÁÉÍÓÚÑáéíóúñ \t]{3,50})");
re!(re_client_next_line, r"(?i)cliente\s*:\s*\d+\s*\n([^\n]{5,50})");

// Amounts
re!(re_total_labeled,
    r"(?i)(?:total|amount|importe)\s*:?\s*[$€]?\s*(\d{1,3}(?:[.,]\d{3})*[.,]?\d{0,2})");
re!(re_total_dollar, r"\$\s*(\d{1,3}(?:[.,]\d{3})*[.,]?\d{0,2})");
re!(re_total_grouped, r"\d{1,3}(?:[.,]\d{3})+");
re!(re_total_cents, r"\d{1,3}(?:[.,]\d{3})*[.,]\d{2}");

re!(re_tax_decimal,
    r"(?i)\b(?:IVA|VAT|tax)\b\s*(?:\d{1,2}\s*%)?\s*:?\s*[$€]?\s*(\d{1,3}(?:[.,]\d{3})*[.,]\d{2})\b");
re!(re_tax_rate, r"(?i)\bIVA\s*\d{1,2}\s*%\s*:?\s*\$?\s*(\d{1,3}(?:[.,]\d{3})*[.,]?\d{0,2})");
re!(re_tax_label, r"(?i)\bIVA\s*:?\s*\$?\s*(\d{1,3}(?:[.,]\d{3})*[.,]?\d{0,2})");
re!(re_tax_trailing, r"(?i)(\d{1,3}(?:[.,]\d{3})*[.,]?\d{0,2})\s*\$?\s*(?:IVA|VAT)\b");

re!(re_subtotal,
    r"(?i)\b(?:sub\s*-?\s*total|base\s+gravable)\s*:?\s*[$€]?\s*(\d{1,3}(?:[.,]\d{3})*[.,]?\d{0,2})");

// ── Cascades ──────────────────────────────────────────────────────────────────

/// One step of a field cascade: where to look, which group holds the value,
/// and whether a match is good enough to stop on.
struct FieldPattern {
    regex: fn() -> &'static Regex,
    group: usize,
    accept: fn(&str) -> bool,
}

const fn step(
    regex: fn() -> &'static Regex,
    group: usize,
    accept: fn(&str) -> bool,
) -> FieldPattern {
    FieldPattern { regex, group, accept }
}

const INVOICE_NUMBER: &[FieldPattern] = &[
    step(re_inv_dian, 1, has_digit),
    step(re_inv_labeled, 1, has_digit),
    step(re_inv_after_title, 1, has_digit),
    step(re_inv_numero, 1, has_digit),
    step(re_inv_kiosk, 1, any),
    step(re_inv_yearly, 1, any),
    step(re_inv_prefixed, 1, any),
];

const DATE: &[FieldPattern] = &[
    step(re_date_seconds, 1, any),
    step(re_date_minutes, 1, any),
    step(re_date_labeled, 1, any),
    step(re_date_full_year, 1, any),
    step(re_date_short_year, 1, any),
    step(re_date_spanish, 1, any),
];

const TAX_ID: &[FieldPattern] = &[
    step(re_tax_id_es, 1, any),
    step(re_nit_dotted, 1, any),
    step(re_nit_short, 1, any),
    step(re_nit_plain, 1, any),
    step(re_nit_trailing, 1, any),
];

const EMAIL: &[FieldPattern] = &[step(re_email, 0, any), step(re_email_labeled, 1, any)];

const CLIENT: &[FieldPattern] = &[
    step(re_client_after_code, 1, plausible_client),
    step(re_client_inline, 1, plausible_client),
    step(re_client_next_line, 1, plausible_client),
];

const TAX: &[FieldPattern] = &[
    step(re_tax_decimal, 1, lenient_amount),
    step(re_tax_rate, 1, lenient_amount),
    step(re_tax_label, 1, lenient_amount),
    step(re_tax_trailing, 1, lenient_amount),
];

const SUBTOTAL: &[FieldPattern] = &[step(re_subtotal, 1, lenient_amount)];

/// Every group-1 capture of these feeds the total pool.
const TOTAL_LABELED: &[fn() -> &'static Regex] = &[re_total_labeled, re_total_dollar];

/// Bare numerals feed the pool only when they stand alone, so pieces of a
/// tax id (`900.123.456-7`) or of a longer figure never count.
const TOTAL_BARE: &[fn() -> &'static Regex] = &[re_total_grouped, re_total_cents];

/// Lines carrying these are labels, not a business name.
const VENDOR_SKIP: [&str; 9] =
    ["factura", "invoice", "fecha", "date", "cliente", "tel", "email", "cif", "nif"];

/// Legal-entity suffixes, compared with dots removed.
const LEGAL_SUFFIXES: [&str; 5] = ["SL", "SA", "SRL", "LTDA", "SAS"];

const CLIENT_REJECT: [&str; 5] = ["factura", "fecha", "total", "cif", "nif"];

/// Fields counted towards the confidence score.
const KEY_FIELDS: f64 = 7.0;

fn any(_: &str) -> bool {
    true
}

fn has_digit(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
}

fn lenient_amount(s: &str) -> bool {
    normalize_amount(s, Strictness::Lenient).is_some()
}

fn plausible_client(s: &str) -> bool {
    let lower = s.to_lowercase();
    s.chars().count() > 3 && !CLIENT_REJECT.iter().any(|k| lower.contains(k))
}

/// First accepted match across the cascade, trimmed.
fn first_match(cascade: &[FieldPattern], text: &str) -> Option<String> {
    cascade.iter().find_map(|p| {
        (p.regex)()
            .captures_iter(text)
            .filter_map(|c| c.get(p.group))
            .map(|m| m.as_str().trim())
            .find(|s| !s.is_empty() && (p.accept)(s))
            .map(str::to_string)
    })
}

// ── Public extraction API ─────────────────────────────────────────────────────

/// Turns a transcript into an [`InvoiceRecord`]. Never fails; fields that
/// cannot be found are left empty.
#[derive(Debug, Clone)]
pub struct Extractor {
    currency: String,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new("COP")
    }
}

impl Extractor {
    pub fn new(currency: impl Into<String>) -> Self {
        Self { currency: currency.into() }
    }

    pub fn extract(&self, text: &str) -> InvoiceRecord {
        let date = first_match(DATE, text);
        let issued_on = date.as_deref().and_then(parse_day_first);

        let mut record = InvoiceRecord {
            raw_text: text.to_string(),
            invoice_number: first_match(INVOICE_NUMBER, text),
            date,
            issued_on,
            total_amount: extract_total(text),
            currency: self.currency.clone(),
            subtotal: lenient(first_match(SUBTOTAL, text)),
            tax: lenient(first_match(TAX, text)),
            tax_id: first_match(TAX_ID, text),
            vendor_name: extract_vendor(text),
            client_name: first_match(CLIENT, text).or_else(|| scan_client(text)),
            email: first_match(EMAIL, text).map(|e| e.to_lowercase()),
            line_items: Vec::new(),
            confidence_score: 0.0,
        };
        record.confidence_score = confidence(&record);

        tracing::debug!(
            "Extracted {:.0}% of key fields (number={:?}, total={:?})",
            record.confidence_score,
            record.invoice_number,
            record.total_amount
        );
        record
    }
}

fn lenient(raw: Option<String>) -> Option<Decimal> {
    normalize_amount(&raw?, Strictness::Lenient)
}

/// Largest plausible amount among all total-pattern matches.
fn extract_total(text: &str) -> Option<Decimal> {
    let labeled = TOTAL_LABELED
        .iter()
        .flat_map(|re| re().captures_iter(text))
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str());
    let bare = TOTAL_BARE.iter().flat_map(|re| free_standing(re(), text));

    labeled
        .chain(bare)
        .filter_map(|raw| normalize_amount(raw, Strictness::Strict))
        .max()
}

/// Matches of `re` whose neighbours are neither digits, separators nor a dash.
/// The border is checked by hand so adjacent amounts do not consume each other's
/// delimiters.
fn free_standing<'t>(re: &'static Regex, text: &'t str) -> impl Iterator<Item = &'t str> {
    re.find_iter(text)
        .filter(move |m| {
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            !before.is_some_and(continues_amount) && !after.is_some_and(continues_amount)
        })
        .map(|m| m.as_str())
}

fn continues_amount(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | ',' | '-')
}

fn extract_vendor(text: &str) -> Option<String> {
    text.lines()
        .take(10)
        .map(str::trim)
        .filter(|l| l.chars().count() > 5)
        .filter(|l| {
            let lower = l.to_lowercase();
            !VENDOR_SKIP.iter().any(|k| lower.contains(k))
        })
        .find(|l| has_legal_suffix(l) || l.starts_with(char::is_uppercase))
        .map(str::to_string)
}

fn has_legal_suffix(line: &str) -> bool {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| token.replace('.', "").to_uppercase())
        .any(|token| LEGAL_SUFFIXES.contains(&token.as_str()))
}

/// After a `client ... :` line, the first of the next three non-empty lines
/// that is not a bare number.
fn scan_client(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let (label, _) = lines
        .iter()
        .enumerate()
        .find(|(_, l)| l.to_lowercase().contains("client") && l.contains(':'))?;

    lines[label + 1..]
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .take(3)
        .find(|l| l.chars().count() > 3 && !l.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

fn confidence(record: &InvoiceRecord) -> f64 {
    let populated = [
        record.invoice_number.is_some(),
        record.date.is_some(),
        record.total_amount.is_some(),
        record.tax_id.is_some(),
        record.vendor_name.is_some(),
        record.client_name.is_some(),
        record.email.is_some(),
    ]
    .iter()
    .filter(|found| **found)
    .count();
    populated as f64 / KEY_FIELDS * 100.0
}

// ── Date helpers ──────────────────────────────────────────────────────────────

/// Read a printed date as day, month, year. Two-digit years are 20xx.
fn parse_day_first(raw: &str) -> Option<NaiveDate> {
    if let Some(c) = re_numeric_date().captures(raw) {
        let day: u32 = c.get(1)?.as_str().parse().ok()?;
        let month: u32 = c.get(2)?.as_str().parse().ok()?;
        let year_str = c.get(3)?.as_str();
        let year: i32 = year_str.parse().ok()?;
        let year = match year_str.len() {
            2 => 2000 + year,
            4 => year,
            _ => return None,
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let c = re_spanish_date().captures(raw)?;
    let day: u32 = c.get(1)?.as_str().parse().ok()?;
    let month = spanish_month(c.get(2)?.as_str())?;
    let year: i32 = c.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn spanish_month(name: &str) -> Option<u32> {
    match name.to_lowercase().as_str() {
        "enero" => Some(1),
        "febrero" => Some(2),
        "marzo" => Some(3),
        "abril" => Some(4),
        "mayo" => Some(5),
        "junio" => Some(6),
        "julio" => Some(7),
        "agosto" => Some(8),
        "septiembre" => Some(9),
        "octubre" => Some(10),
        "noviembre" => Some(11),
        "diciembre" => Some(12),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
