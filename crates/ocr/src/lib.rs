pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod runner;
pub mod scoring;
pub mod types;

pub use extract::Extractor;
pub use pipeline::{InvoicePipeline, PipelineError};
pub use preprocess::{decode_image, EnhancedImage, ImageEnhancer, PreprocessError};
pub use recognizer::{BoundingBox, MockRecognizer, OcrBackend, OcrError, Recognition, Word};
pub use runner::{ProfileRunner, RecognitionCandidate, Selection};
pub use scoring::ScoreBreakdown;
pub use types::{
    ApiResponse, InvoiceRecord, InvoiceScan, LineItem, ProcessingInfo, ReceiptSummary, WordBox,
};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
