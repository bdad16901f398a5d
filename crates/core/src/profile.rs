use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ProfileParseError {
    #[error("Unknown profile token: '{0}'")]
    UnknownToken(String),
    #[error("Missing value after '{0}'")]
    MissingValue(String),
    #[error("Unsupported engine mode: {0}")]
    EngineMode(String),
    #[error("Unsupported segmentation mode: {0}")]
    SegmentationMode(String),
    #[error("A profile catalogue needs at least one profile")]
    EmptyCatalogue,
}

/// Recognition engine variant (tesseract `--oem`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineMode {
    Legacy,
    Lstm,
    LegacyAndLstm,
    Default,
}

impl EngineMode {
    pub fn code(self) -> u8 {
        match self {
            EngineMode::Legacy => 0,
            EngineMode::Lstm => 1,
            EngineMode::LegacyAndLstm => 2,
            EngineMode::Default => 3,
        }
    }

    pub fn from_code(code: &str) -> Result<Self, ProfileParseError> {
        match code {
            "0" => Ok(EngineMode::Legacy),
            "1" => Ok(EngineMode::Lstm),
            "2" => Ok(EngineMode::LegacyAndLstm),
            "3" => Ok(EngineMode::Default),
            other => Err(ProfileParseError::EngineMode(other.to_string())),
        }
    }
}

/// Page segmentation strategy (tesseract `--psm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationMode {
    Auto,
    SingleColumn,
    SingleBlock,
    SingleLine,
    SingleWord,
    SparseText,
}

impl SegmentationMode {
    pub fn code(self) -> u8 {
        match self {
            SegmentationMode::Auto => 3,
            SegmentationMode::SingleColumn => 4,
            SegmentationMode::SingleBlock => 6,
            SegmentationMode::SingleLine => 7,
            SegmentationMode::SingleWord => 8,
            SegmentationMode::SparseText => 11,
        }
    }

    pub fn from_code(code: &str) -> Result<Self, ProfileParseError> {
        match code {
            "3" => Ok(SegmentationMode::Auto),
            "4" => Ok(SegmentationMode::SingleColumn),
            "6" => Ok(SegmentationMode::SingleBlock),
            "7" => Ok(SegmentationMode::SingleLine),
            "8" => Ok(SegmentationMode::SingleWord),
            "11" => Ok(SegmentationMode::SparseText),
            other => Err(ProfileParseError::SegmentationMode(other.to_string())),
        }
    }
}

/// One configuration of the recognition engine, tried as one candidate.
///
/// Written and parsed in tesseract argument form, e.g. `--oem 1 --psm 6 -l spa`.
/// A profile without `-l` lets the engine use its default language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecognitionProfile {
    pub engine_mode: EngineMode,
    pub segmentation: SegmentationMode,
    pub language: Option<String>,
}

impl RecognitionProfile {
    pub fn new(
        engine_mode: EngineMode,
        segmentation: SegmentationMode,
        language: Option<&str>,
    ) -> Self {
        Self {
            engine_mode,
            segmentation,
            language: language.map(str::to_string),
        }
    }
}

impl fmt::Display for RecognitionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "--oem {} --psm {}", self.engine_mode.code(), self.segmentation.code())?;
        if let Some(lang) = &self.language {
            write!(f, " -l {lang}")?;
        }
        Ok(())
    }
}

impl FromStr for RecognitionProfile {
    type Err = ProfileParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut engine_mode = EngineMode::Default;
        let mut segmentation = SegmentationMode::Auto;
        let mut language = None;

        let mut tokens = s.split_whitespace();
        while let Some(flag) = tokens.next() {
            let mut value = || {
                tokens
                    .next()
                    .ok_or_else(|| ProfileParseError::MissingValue(flag.to_string()))
            };
            match flag {
                "--oem" => engine_mode = EngineMode::from_code(value()?)?,
                "--psm" => segmentation = SegmentationMode::from_code(value()?)?,
                "-l" => language = Some(value()?.to_string()),
                other => return Err(ProfileParseError::UnknownToken(other.to_string())),
            }
        }

        Ok(Self { engine_mode, segmentation, language })
    }
}

impl TryFrom<String> for RecognitionProfile {
    type Error = ProfileParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RecognitionProfile> for String {
    fn from(p: RecognitionProfile) -> Self {
        p.to_string()
    }
}

/// Immutable, ordered, non-empty list of profiles.
///
/// Order is evaluation order. The first entry is the reference profile whose
/// word boxes are reported to callers, and the unguarded fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RecognitionProfile>", into = "Vec<RecognitionProfile>")]
pub struct ProfileCatalogue {
    profiles: Vec<RecognitionProfile>,
}

impl ProfileCatalogue {
    pub fn new(profiles: Vec<RecognitionProfile>) -> Result<Self, ProfileParseError> {
        if profiles.is_empty() {
            return Err(ProfileParseError::EmptyCatalogue);
        }
        Ok(Self { profiles })
    }

    pub fn reference(&self) -> &RecognitionProfile {
        &self.profiles[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecognitionProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ProfileCatalogue {
    /// LSTM and default engines over the segmentation modes that work for
    /// invoices, Spanish first, then language-agnostic variants.
    fn default() -> Self {
        use EngineMode::{Default as Oem3, Lstm};
        use SegmentationMode::{Auto, SingleBlock, SingleColumn, SingleWord};

        let spa = Some("spa");
        let profiles = vec![
            RecognitionProfile::new(Lstm, Auto, spa),
            RecognitionProfile::new(Lstm, SingleBlock, spa),
            RecognitionProfile::new(Lstm, SingleColumn, spa),
            RecognitionProfile::new(Lstm, SingleWord, spa),
            RecognitionProfile::new(Oem3, Auto, spa),
            RecognitionProfile::new(Oem3, SingleBlock, spa),
            RecognitionProfile::new(Oem3, SingleColumn, spa),
            RecognitionProfile::new(Lstm, Auto, None),
            RecognitionProfile::new(Oem3, Auto, None),
            RecognitionProfile::new(Lstm, SingleBlock, None),
            RecognitionProfile::new(Oem3, SingleBlock, None),
        ];
        Self { profiles }
    }
}

impl TryFrom<Vec<RecognitionProfile>> for ProfileCatalogue {
    type Error = ProfileParseError;
    fn try_from(profiles: Vec<RecognitionProfile>) -> Result<Self, Self::Error> {
        Self::new(profiles)
    }
}

impl From<ProfileCatalogue> for Vec<RecognitionProfile> {
    fn from(c: ProfileCatalogue) -> Self {
        c.profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_profile() {
        let p: RecognitionProfile = "--oem 1 --psm 6 -l spa".parse().unwrap();
        assert_eq!(p.engine_mode, EngineMode::Lstm);
        assert_eq!(p.segmentation, SegmentationMode::SingleBlock);
        assert_eq!(p.language.as_deref(), Some("spa"));
    }

    #[test]
    fn parse_without_language() {
        let p: RecognitionProfile = "--oem 3 --psm 3".parse().unwrap();
        assert_eq!(p.language, None);
        assert_eq!(p.to_string(), "--oem 3 --psm 3");
    }

    #[test]
    fn display_matches_parse_input() {
        let raw = "--oem 3 --psm 4 -l spa";
        assert_eq!(raw.parse::<RecognitionProfile>().unwrap().to_string(), raw);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            "--oem 9".parse::<RecognitionProfile>(),
            Err(ProfileParseError::EngineMode("9".into()))
        );
        assert_eq!(
            "--psm".parse::<RecognitionProfile>(),
            Err(ProfileParseError::MissingValue("--psm".into()))
        );
        assert!(matches!(
            "--dpi 300".parse::<RecognitionProfile>(),
            Err(ProfileParseError::UnknownToken(_))
        ));
    }

    #[test]
    fn default_catalogue_order() {
        let c = ProfileCatalogue::default();
        assert_eq!(c.len(), 11);
        assert_eq!(c.reference().to_string(), "--oem 1 --psm 3 -l spa");
        assert_eq!(c.iter().last().unwrap().to_string(), "--oem 3 --psm 6");
        assert_eq!(c.iter().filter(|p| p.language.is_none()).count(), 4);
    }

    #[test]
    fn empty_catalogue_rejected() {
        assert_eq!(ProfileCatalogue::new(vec![]), Err(ProfileParseError::EmptyCatalogue));
    }
}
