use facturo_core::{ProfileCatalogue, RecognitionProfile};
use std::sync::Arc;
use std::time::Duration;

use crate::preprocess::EnhancedImage;
use crate::recognizer::{OcrBackend, OcrError, Recognition, Word};
use crate::scoring::{self, ScoreBreakdown};

/// Output of one successful profile attempt, with its composite score.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionCandidate {
    pub profile: RecognitionProfile,
    pub transcript: String,
    pub words: Vec<Word>,
    pub breakdown: ScoreBreakdown,
}

impl RecognitionCandidate {
    fn new(profile: RecognitionProfile, recognition: Recognition) -> Self {
        let breakdown = scoring::score(&recognition.text, &recognition.words);
        Self {
            profile,
            transcript: recognition.text,
            words: recognition.words,
            breakdown,
        }
    }

    pub fn score(&self) -> f64 {
        self.breakdown.total()
    }
}

/// Result of a catalogue run.
#[derive(Debug, Clone)]
pub struct Selection {
    pub best: RecognitionCandidate,
    /// The reference profile's own recognition, when its attempt succeeded.
    pub reference: Option<Recognition>,
    /// Profiles that timed out or failed, in catalogue order.
    pub skipped: Vec<RecognitionProfile>,
    /// True when no guarded attempt succeeded and `best` came from the unguarded run.
    pub fell_back: bool,
}

/// Runs every catalogue profile against an image, each attempt bounded by a
/// deadline, and keeps the highest-scoring transcript.
pub struct ProfileRunner<R: OcrBackend> {
    backend: Arc<R>,
    catalogue: ProfileCatalogue,
    attempt_timeout: Duration,
}

impl<R: OcrBackend + 'static> ProfileRunner<R> {
    pub fn new(backend: R, catalogue: ProfileCatalogue, attempt_timeout: Duration) -> Self {
        Self {
            backend: Arc::new(backend),
            catalogue,
            attempt_timeout,
        }
    }

    pub fn catalogue(&self) -> &ProfileCatalogue {
        &self.catalogue
    }

    /// Attempt every profile in catalogue order and return the best candidate.
    ///
    /// Ties keep the earlier profile. When every attempt fails, the reference
    /// profile is run without a deadline and its output returned as is; only an
    /// error from that run is surfaced, as [`OcrError::Unavailable`].
    ///
    /// Timed-out attempts are abandoned, not stopped: each still holds a
    /// blocking-pool thread until the engine returns.
    pub async fn select_best(&self, image: &Arc<EnhancedImage>) -> Result<Selection, OcrError> {
        let mut best: Option<RecognitionCandidate> = None;
        let mut reference = None;
        let mut skipped = Vec::new();

        for (index, profile) in self.catalogue.iter().enumerate() {
            match self.attempt(image, profile).await {
                Ok(recognition) => {
                    if index == 0 {
                        reference = Some(recognition.clone());
                    }
                    let candidate = RecognitionCandidate::new(profile.clone(), recognition);
                    let b = &candidate.breakdown;
                    tracing::info!(
                        "Profile {:2} [{}]: conf={:5.1} text={:4} kw={} num={} cur={} score={:6.1}",
                        index + 1,
                        profile,
                        b.avg_confidence,
                        b.text_length,
                        b.keyword_hits,
                        b.digit_runs,
                        b.currency_symbols,
                        candidate.score()
                    );
                    if best.as_ref().map_or(true, |current| candidate.score() > current.score()) {
                        best = Some(candidate);
                    }
                }
                Err(OcrError::TimedOut { after, .. }) => {
                    tracing::warn!(
                        "Profile {:2} [{profile}]: timed out after {after:?}, skipping",
                        index + 1
                    );
                    skipped.push(profile.clone());
                }
                Err(e) => {
                    tracing::warn!("Profile {:2} [{profile}]: {e}, skipping", index + 1);
                    skipped.push(profile.clone());
                }
            }
        }

        if let Some(best) = best {
            tracing::info!("Best profile: {} (score {:.1})", best.profile, best.score());
            return Ok(Selection { best, reference, skipped, fell_back: false });
        }

        tracing::warn!("Every profile failed; running reference profile without a deadline");
        let recognition = self.run_reference(image).await?;
        let best =
            RecognitionCandidate::new(self.catalogue.reference().clone(), recognition.clone());
        Ok(Selection {
            best,
            reference: Some(recognition),
            skipped,
            fell_back: true,
        })
    }

    /// Run the reference profile (catalogue entry #1) with no deadline.
    pub async fn run_reference(&self, image: &Arc<EnhancedImage>) -> Result<Recognition, OcrError> {
        self.run_unguarded(image, self.catalogue.reference()).await
    }

    /// Run an arbitrary profile with no deadline.
    pub async fn run_unguarded(
        &self,
        image: &Arc<EnhancedImage>,
        profile: &RecognitionProfile,
    ) -> Result<Recognition, OcrError> {
        self.spawn(image, profile)
            .await
            .map_err(|e| OcrError::Unavailable(e.to_string()))?
            .map_err(|e| OcrError::Unavailable(e.to_string()))
    }

    /// One guarded attempt. The engine call runs on the blocking pool with its
    /// own handles to the image and profile; on timeout the handle is dropped and
    /// whatever the detached call later produces is discarded.
    ///
    /// A blocking task cannot be cancelled: a timed-out call keeps its pool
    /// thread until the engine returns, so it may still be running while the
    /// next profile (or the unguarded fallback) is attempted.
    async fn attempt(
        &self,
        image: &Arc<EnhancedImage>,
        profile: &RecognitionProfile,
    ) -> Result<Recognition, OcrError> {
        match tokio::time::timeout(self.attempt_timeout, self.spawn(image, profile)).await {
            Err(_) => Err(OcrError::TimedOut {
                profile: profile.to_string(),
                after: self.attempt_timeout,
            }),
            Ok(Err(join)) => Err(OcrError::Engine(join.to_string())),
            Ok(Ok(result)) => result,
        }
    }

    fn spawn(
        &self,
        image: &Arc<EnhancedImage>,
        profile: &RecognitionProfile,
    ) -> tokio::task::JoinHandle<Result<Recognition, OcrError>> {
        let backend = Arc::clone(&self.backend);
        let image = Arc::clone(image);
        let profile = profile.clone();
        tokio::task::spawn_blocking(move || backend.recognize(&image, &profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::BoundingBox;
    use facturo_core::{EngineMode, SegmentationMode};
    use image::{GrayImage, ImageBuffer, Luma};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Text(&'static str, f32),
        Fail,
        Hang,
    }

    /// Per-profile scripted outputs, keyed by the profile's argument string.
    /// `Hang` sleeps past the attempt deadline until `hangs` is used up, then
    /// answers immediately with an empty transcript.
    struct ScriptedRecognizer {
        script: HashMap<String, Behaviour>,
        hangs: AtomicUsize,
    }

    impl ScriptedRecognizer {
        fn new(script: Vec<(&str, Behaviour)>, hangs: usize) -> Self {
            Self {
                script: script.into_iter().map(|(p, b)| (p.to_string(), b)).collect(),
                hangs: AtomicUsize::new(hangs),
            }
        }
    }

    impl OcrBackend for ScriptedRecognizer {
        fn recognize(
            &self,
            _image: &EnhancedImage,
            profile: &RecognitionProfile,
        ) -> Result<Recognition, OcrError> {
            match self.script.get(&profile.to_string()) {
                Some(Behaviour::Text(text, conf)) => Ok(Recognition {
                    text: text.to_string(),
                    words: vec![Word {
                        text: text.split_whitespace().next().unwrap_or("").to_string(),
                        confidence: Some(*conf),
                        bounding_box: BoundingBox { x: 0, y: 0, width: 10, height: 10 },
                    }],
                }),
                Some(Behaviour::Hang) => {
                    let remaining = self
                        .hangs
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
                    if remaining.is_ok() {
                        std::thread::sleep(Duration::from_millis(300));
                    }
                    Ok(Recognition::default())
                }
                Some(Behaviour::Fail) | None => Err(OcrError::Engine("scripted failure".into())),
            }
        }
    }

    const A: &str = "--oem 1 --psm 3 -l spa";
    const B: &str = "--oem 1 --psm 6 -l spa";
    const C: &str = "--oem 3 --psm 3";

    fn catalogue() -> ProfileCatalogue {
        let profiles = vec![A.parse().unwrap(), B.parse().unwrap(), C.parse().unwrap()];
        ProfileCatalogue::new(profiles).unwrap()
    }

    fn image() -> Arc<EnhancedImage> {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([255u8]));
        Arc::new(EnhancedImage::new(img))
    }

    fn runner(script: Vec<(&str, Behaviour)>) -> ProfileRunner<ScriptedRecognizer> {
        hanging_runner(script, 0)
    }

    fn hanging_runner(
        script: Vec<(&str, Behaviour)>,
        hangs: usize,
    ) -> ProfileRunner<ScriptedRecognizer> {
        ProfileRunner::new(
            ScriptedRecognizer::new(script, hangs),
            catalogue(),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn highest_score_wins() {
        let r = runner(vec![
            (A, Behaviour::Text("hola", 90.0)),
            (B, Behaviour::Text("FACTURA No. 123 TOTAL $45.900 IVA $7.300 fecha 9/10/2025", 60.0)),
            (C, Behaviour::Text("ruido", 95.0)),
        ]);
        let sel = r.select_best(&image()).await.unwrap();
        assert_eq!(sel.best.profile.to_string(), B);
        assert!(!sel.fell_back);
        assert!(sel.skipped.is_empty());
    }

    #[tokio::test]
    async fn ties_keep_earliest_profile() {
        let r = runner(vec![
            (A, Behaviour::Fail),
            (B, Behaviour::Text("same text", 80.0)),
            (C, Behaviour::Text("same text", 80.0)),
        ]);
        let sel = r.select_best(&image()).await.unwrap();
        assert_eq!(sel.best.profile.to_string(), B);
        assert_eq!(sel.skipped.len(), 1);
        assert!(sel.reference.is_none());
    }

    #[tokio::test]
    async fn negative_scores_still_selected() {
        let r = runner(vec![
            (A, Behaviour::Fail),
            (B, Behaviour::Text("x", 0.0)),
            (C, Behaviour::Fail),
        ]);
        let sel = r.select_best(&image()).await.unwrap();
        assert!(sel.best.score() < 0.0);
        assert_eq!(sel.best.transcript, "x");
        assert!(!sel.fell_back);
    }

    #[tokio::test]
    async fn selected_score_dominates_all_successes() {
        let script = [
            (A, "TOTAL $10.000", 70.0f32),
            (B, "TOTAL $10.000 IVA $1.900", 65.0),
            (C, "nada", 99.0),
        ];
        let r = runner(script.iter().map(|(p, t, c)| (*p, Behaviour::Text(*t, *c))).collect());
        let sel = r.select_best(&image()).await.unwrap();
        for (_, text, conf) in script {
            let word = Word {
                text: text.split_whitespace().next().unwrap().to_string(),
                confidence: Some(conf),
                bounding_box: BoundingBox { x: 0, y: 0, width: 10, height: 10 },
            };
            assert!(sel.best.score() >= scoring::score(text, &[word]).total());
        }
    }

    #[tokio::test]
    async fn reference_recognition_is_kept_when_first_profile_succeeds() {
        let r = runner(vec![
            (A, Behaviour::Text("first", 50.0)),
            (B, Behaviour::Text("FACTURA TOTAL $1.000 IVA fecha", 90.0)),
            (C, Behaviour::Fail),
        ]);
        let sel = r.select_best(&image()).await.unwrap();
        assert_eq!(sel.best.profile.to_string(), B);
        assert_eq!(sel.reference.unwrap().text, "first");
    }

    #[tokio::test]
    async fn all_timeouts_fall_back_to_unguarded_reference() {
        let script = vec![(A, Behaviour::Hang), (B, Behaviour::Hang), (C, Behaviour::Hang)];
        let r = hanging_runner(script, 3);
        let sel = r.select_best(&image()).await.unwrap();
        assert!(sel.fell_back);
        assert_eq!(sel.skipped.len(), 3);
        assert_eq!(sel.best.profile.to_string(), A);
        assert_eq!(sel.best.transcript, "");
    }

    #[tokio::test]
    async fn fallback_failure_is_unavailable() {
        let r = runner(vec![(A, Behaviour::Fail), (B, Behaviour::Fail), (C, Behaviour::Fail)]);
        let err = r.select_best(&image()).await.unwrap_err();
        assert!(matches!(err, OcrError::Unavailable(_)));
    }

    #[tokio::test]
    async fn timed_out_attempt_does_not_leak_into_next() {
        let r = hanging_runner(
            vec![
                (A, Behaviour::Hang),
                (B, Behaviour::Text("segunda factura total", 70.0)),
                (C, Behaviour::Fail),
            ],
            1,
        );
        let sel = r.select_best(&image()).await.unwrap();
        assert_eq!(sel.best.transcript, "segunda factura total");
        assert_eq!(sel.skipped.len(), 2);
        assert!(sel.reference.is_none());
    }

    #[tokio::test]
    async fn run_unguarded_uses_given_profile() {
        let receipt = RecognitionProfile::new(
            EngineMode::Default,
            SegmentationMode::SingleColumn,
            Some("spa"),
        );
        let r = runner(vec![("--oem 3 --psm 4 -l spa", Behaviour::Text("TOTAL 12,50", 80.0))]);
        let rec = r.run_unguarded(&image(), &receipt).await.unwrap();
        assert_eq!(rec.text, "TOTAL 12,50");
    }
}
