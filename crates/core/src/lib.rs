pub mod amount;
pub mod config;
pub mod profile;

pub use amount::{is_plausible_total, normalize_amount, Strictness};
pub use config::{ConfigError, OcrSettings};
pub use profile::{
    EngineMode, ProfileCatalogue, ProfileParseError, RecognitionProfile, SegmentationMode,
};
