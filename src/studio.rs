//! Per-session orchestration: form state, the generation state machine and
//! card export.
//!
//! `Idle -> Loading -> Ready | Failed`, and `Ready | Failed -> Loading` on a
//! new trigger. A trigger while `Loading` is rejected and issues no request.
//! The state lock is never held across the generator or rasterizer call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::card::{CardRequest, ExportedFile, GeneratedImage, RenderState};
use crate::constants::{CARD_PROMPT, DOWNLOAD_FILENAME, EXPORT_PIXEL_RATIO};
use crate::error::{ExportError, GenerationError};
use crate::generator::ImageGenerator;
use crate::raster::{CardComposition, CardRasterizer};

/// What happened to a generation trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// A new background is ready
    Ready,
    /// The attempt failed; the reason is in the render state
    Failed(GenerationError),
    /// Another request was already in flight; nothing was sent
    Rejected,
}

/// What happened to an export request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The card was rasterized
    Exported(ExportedFile),
    /// There is no generated background yet, so nothing to export
    NothingToExport,
    /// Rasterization failed; the render state is untouched
    Failed(ExportError),
}

/// A copy of the studio state for display.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StudioSnapshot {
    /// Current form values
    pub request: CardRequest,
    /// Generation state
    pub render: RenderState,
    /// Last export failure, kept apart from generation failures
    pub export_error: Option<ExportError>,
}

#[derive(Debug, Default)]
struct StudioState {
    request: CardRequest,
    render: RenderState,
    export_error: Option<ExportError>,
    /// Bumped on every accepted trigger; results from older cycles are dropped.
    epoch: u64,
}

/// Proof that a trigger was accepted and the studio is `Loading`.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an accepted trigger stays Loading until it is finished"]
pub struct GenerationTicket {
    epoch: u64,
}

/// One user's card: request form, generation and export.
pub struct CardStudio {
    generator: Arc<dyn ImageGenerator>,
    rasterizer: Arc<dyn CardRasterizer>,
    state: Mutex<StudioState>,
}

impl std::fmt::Debug for CardStudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardStudio").finish_non_exhaustive()
    }
}

impl CardStudio {
    /// A fresh studio in the `Idle` state with default form values.
    pub fn new(generator: Arc<dyn ImageGenerator>, rasterizer: Arc<dyn CardRasterizer>) -> Self {
        Self {
            generator,
            rasterizer,
            state: Mutex::new(StudioState::default()),
        }
    }

    /// Copies the current state.
    pub async fn snapshot(&self) -> StudioSnapshot {
        let state = self.state.lock().await;
        StudioSnapshot {
            request: state.request.clone(),
            render: state.render.clone(),
            export_error: state.export_error.clone(),
        }
    }

    /// Sets the recipient name.
    pub async fn set_recipient_name(&self, recipient_name: impl Into<String>) {
        self.state.lock().await.request.set_recipient_name(recipient_name);
    }

    /// Sets the wish text.
    pub async fn set_wish(&self, wish: impl Into<String>) {
        self.state.lock().await.request.set_wish(wish);
    }

    /// Sets both form fields at once.
    pub async fn update_request(&self, recipient_name: impl Into<String>, wish: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.request.set_recipient_name(recipient_name);
        state.request.set_wish(wish);
    }

    /// Overwrites the wish with suggestion `index` (0-based). Any generated
    /// background is kept.
    pub async fn choose_suggestion(&self, index: usize) -> Option<&'static str> {
        self.state.lock().await.request.choose_suggestion(index)
    }

    /// Runs one generation attempt for this studio.
    pub async fn generate(&self) -> GenerationOutcome {
        match self.begin_generation().await {
            Some(ticket) => self.finish_generation(ticket).await,
            None => GenerationOutcome::Rejected,
        }
    }

    /// Moves to `Loading` and clears the previous result, or returns `None`
    /// when a generation is already in flight.
    pub async fn begin_generation(&self) -> Option<GenerationTicket> {
        let mut state = self.state.lock().await;
        if state.render.is_loading() {
            warn!("Generation already in flight, rejecting trigger");
            return None;
        }
        state.epoch += 1;
        state.render = RenderState::Loading;
        state.export_error = None;
        Some(GenerationTicket { epoch: state.epoch })
    }

    /// Calls the generator for an accepted trigger and records the result.
    #[instrument(skip_all, fields(epoch = ticket.epoch))]
    pub async fn finish_generation(&self, ticket: GenerationTicket) -> GenerationOutcome {
        let result = self.generator.generate(CARD_PROMPT).await;

        let mut state = self.state.lock().await;
        if state.epoch != ticket.epoch {
            debug!("Dropping result of a superseded generation");
            return match result {
                Ok(_) => GenerationOutcome::Ready,
                Err(err) => GenerationOutcome::Failed(err),
            };
        }
        match result {
            Ok(image) => {
                info!("Card background ready");
                state.render = RenderState::Ready(image);
                GenerationOutcome::Ready
            }
            Err(err) => {
                warn!("Card background generation failed: {err}");
                state.render = RenderState::Failed(err.clone());
                GenerationOutcome::Failed(err)
            }
        }
    }

    /// Rasterizes the current card at the export pixel ratio.
    #[instrument(skip_all)]
    pub async fn export(&self) -> ExportOutcome {
        let (composition, epoch) = {
            let state = self.state.lock().await;
            match state.render.image() {
                Some(image) => (
                    CardComposition::new(image.clone(), &state.request),
                    state.epoch,
                ),
                None => {
                    debug!("Export requested before a background exists");
                    return ExportOutcome::NothingToExport;
                }
            }
        };

        let result = self
            .rasterizer
            .rasterize(&composition, EXPORT_PIXEL_RATIO)
            .await;

        let mut state = self.state.lock().await;
        let current = state.epoch == epoch;
        match result {
            Ok(bytes) => {
                if current {
                    state.export_error = None;
                }
                info!("Exported card, {} bytes", bytes.len());
                ExportOutcome::Exported(ExportedFile {
                    filename: DOWNLOAD_FILENAME.to_string(),
                    bytes,
                })
            }
            Err(err) => {
                warn!("Card export failed: {err}");
                if current {
                    state.export_error = Some(err.clone());
                }
                ExportOutcome::Failed(err)
            }
        }
    }

    /// The current background, if one is ready.
    pub async fn current_image(&self) -> Option<GeneratedImage> {
        self.state.lock().await.render.image().cloned()
    }
}

struct RegistryEntry {
    studio: Arc<CardStudio>,
    last_seen: Instant,
}

/// Studios keyed by session token, dropped after `idle_limit` unused.
pub struct StudioRegistry {
    generator: Arc<dyn ImageGenerator>,
    rasterizer: Arc<dyn CardRasterizer>,
    idle_limit: Duration,
    studios: RwLock<HashMap<String, RegistryEntry>>,
}

impl std::fmt::Debug for StudioRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudioRegistry")
            .field("idle_limit", &self.idle_limit)
            .finish_non_exhaustive()
    }
}

impl StudioRegistry {
    /// Every studio shares the generator and rasterizer.
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        rasterizer: Arc<dyn CardRasterizer>,
        idle_limit: Duration,
    ) -> Self {
        Self {
            generator,
            rasterizer,
            idle_limit,
            studios: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the studio for `token`, creating it on first use.
    pub async fn studio(&self, token: &str) -> Arc<CardStudio> {
        let now = Instant::now();
        let mut studios = self.studios.write().await;
        if let Some(entry) = studios.get_mut(token) {
            entry.last_seen = now;
            return entry.studio.clone();
        }

        let before = studios.len();
        studios.retain(|_, entry| now.duration_since(entry.last_seen) < self.idle_limit);
        if studios.len() != before {
            debug!("Dropped {} idle studios", before - studios.len());
        }

        let studio = Arc::new(CardStudio::new(
            self.generator.clone(),
            self.rasterizer.clone(),
        ));
        studios.insert(
            token.to_string(),
            RegistryEntry {
                studio: studio.clone(),
                last_seen: now,
            },
        );
        studio
    }

    /// Number of live studios.
    pub async fn len(&self) -> usize {
        self.studios.read().await.len()
    }

    /// True when no studio is live.
    pub async fn is_empty(&self) -> bool {
        self.studios.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SUGGESTED_WISHES;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct FixedGenerator {
        result: Result<GeneratedImage, GenerationError>,
        calls: AtomicUsize,
    }

    impl FixedGenerator {
        fn ok(bytes: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(GeneratedImage::new("image/jpeg", bytes.to_vec())),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(err: GenerationError) -> Arc<Self> {
            Arc::new(Self {
                result: Err(err),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ImageGenerator for FixedGenerator {
        async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
            assert_eq!(prompt, CARD_PROMPT);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    /// Blocks inside `generate` until released.
    struct GatedGenerator {
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageGenerator for GatedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<GeneratedImage, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(GeneratedImage::new("image/jpeg", vec![9, 9, 9]))
        }
    }

    struct StubRasterizer {
        fail: bool,
        seen: std::sync::Mutex<Vec<(CardComposition, u32)>>,
    }

    impl StubRasterizer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                seen: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CardRasterizer for StubRasterizer {
        async fn rasterize(
            &self,
            card: &CardComposition,
            pixel_ratio: u32,
        ) -> Result<Vec<u8>, ExportError> {
            self.seen
                .lock()
                .expect("stub lock")
                .push((card.clone(), pixel_ratio));
            if self.fail {
                Err(ExportError::Encode("simulated".to_string()))
            } else {
                Ok(b"\x89PNG fake".to_vec())
            }
        }
    }

    #[tokio::test]
    async fn successful_generation_holds_the_service_bytes() {
        let generator = FixedGenerator::ok(&[0xFF, 0xD8, 0xFF]);
        let studio = CardStudio::new(generator.clone(), StubRasterizer::new(false));
        assert_eq!(studio.snapshot().await.render, RenderState::Idle);

        assert_eq!(studio.generate().await, GenerationOutcome::Ready);
        let image = studio.current_image().await.expect("ready");
        assert_eq!(image.bytes(), &[0xFF, 0xD8, 0xFF]);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_images_leaves_a_failed_state() {
        let studio = CardStudio::new(
            FixedGenerator::failing(GenerationError::NoImages),
            StubRasterizer::new(false),
        );
        assert_eq!(
            studio.generate().await,
            GenerationOutcome::Failed(GenerationError::NoImages)
        );
        let snapshot = studio.snapshot().await;
        assert_eq!(snapshot.render.error(), Some(&GenerationError::NoImages));
        assert!(snapshot.render.image().is_none());
    }

    #[tokio::test]
    async fn trigger_while_loading_is_rejected() {
        let generator = Arc::new(GatedGenerator {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let studio = Arc::new(CardStudio::new(
            generator.clone(),
            StubRasterizer::new(false),
        ));

        let first = tokio::spawn({
            let studio = studio.clone();
            async move { studio.generate().await }
        });
        generator.entered.notified().await;
        assert!(studio.snapshot().await.render.is_loading());

        assert_eq!(studio.generate().await, GenerationOutcome::Rejected);
        assert!(studio.snapshot().await.render.is_loading());

        generator.release.notify_one();
        assert_eq!(first.await.expect("join"), GenerationOutcome::Ready);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_trigger_discards_previous_image_and_errors() {
        let studio = CardStudio::new(
            FixedGenerator::failing(GenerationError::Transport("offline".to_string())),
            StubRasterizer::new(true),
        );
        studio.generate().await;
        assert!(studio.snapshot().await.render.error().is_some());

        {
            let mut state = studio.state.lock().await;
            state.render = RenderState::Ready(GeneratedImage::new("image/jpeg", vec![1]));
        }
        studio.export().await;
        assert!(studio.snapshot().await.export_error.is_some());

        studio.generate().await;
        let snapshot = studio.snapshot().await;
        assert!(snapshot.export_error.is_none());
        assert!(snapshot.render.image().is_none());
        assert_eq!(
            snapshot.render.error(),
            Some(&GenerationError::Transport("offline".to_string()))
        );
    }

    /// Blocks inside `rasterize` until released, then fails.
    struct GatedRasterizer {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CardRasterizer for GatedRasterizer {
        async fn rasterize(
            &self,
            _card: &CardComposition,
            _pixel_ratio: u32,
        ) -> Result<Vec<u8>, ExportError> {
            self.entered.notify_one();
            self.release.notified().await;
            Err(ExportError::Encode("late".to_string()))
        }
    }

    #[tokio::test]
    async fn late_export_failure_does_not_leak_into_the_next_card() {
        let rasterizer = Arc::new(GatedRasterizer {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let studio = Arc::new(CardStudio::new(FixedGenerator::ok(&[4]), rasterizer.clone()));
        studio.generate().await;

        let export = tokio::spawn({
            let studio = studio.clone();
            async move { studio.export().await }
        });
        rasterizer.entered.notified().await;

        assert_eq!(studio.generate().await, GenerationOutcome::Ready);
        rasterizer.release.notify_one();
        assert!(matches!(
            export.await.expect("join"),
            ExportOutcome::Failed(_)
        ));

        let snapshot = studio.snapshot().await;
        assert!(snapshot.export_error.is_none());
        assert!(snapshot.render.image().is_some());
    }

    #[tokio::test]
    async fn begin_generation_is_loading_before_the_service_answers() {
        let generator = Arc::new(GatedGenerator {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let studio = Arc::new(CardStudio::new(
            generator.clone(),
            StubRasterizer::new(false),
        ));

        let ticket = studio.begin_generation().await.expect("accepted");
        assert!(studio.snapshot().await.render.is_loading());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert!(studio.begin_generation().await.is_none());

        let running = tokio::spawn({
            let studio = studio.clone();
            async move { studio.finish_generation(ticket).await }
        });
        generator.entered.notified().await;
        generator.release.notify_one();
        assert_eq!(running.await.expect("join"), GenerationOutcome::Ready);
        assert!(studio.snapshot().await.render.image().is_some());
    }

    #[tokio::test]
    async fn export_before_generation_is_a_no_op() {
        let rasterizer = StubRasterizer::new(false);
        let studio = CardStudio::new(FixedGenerator::ok(&[1]), rasterizer.clone());

        assert_eq!(studio.export().await, ExportOutcome::NothingToExport);
        let snapshot = studio.snapshot().await;
        assert!(snapshot.export_error.is_none());
        assert_eq!(snapshot.render, RenderState::Idle);
        assert!(rasterizer.seen.lock().expect("stub lock").is_empty());
    }

    #[tokio::test]
    async fn export_uses_current_text_at_double_density() {
        let rasterizer = StubRasterizer::new(false);
        let studio = CardStudio::new(FixedGenerator::ok(&[7, 7]), rasterizer.clone());
        studio.generate().await;
        studio.set_recipient_name("Mẹ").await;
        studio.choose_suggestion(2).await;

        let ExportOutcome::Exported(file) = studio.export().await else {
            panic!("expected an exported file");
        };
        assert_eq!(file.filename, DOWNLOAD_FILENAME);
        assert_eq!(file.bytes, b"\x89PNG fake");

        let seen = rasterizer.seen.lock().expect("stub lock");
        let (card, ratio) = &seen[0];
        assert_eq!(*ratio, 2);
        assert_eq!(card.recipient_name, "Mẹ");
        assert_eq!(card.wish, SUGGESTED_WISHES[2]);
        assert_eq!(card.background.bytes(), &[7, 7]);
    }

    #[tokio::test]
    async fn export_failure_keeps_the_ready_state() {
        let studio = CardStudio::new(FixedGenerator::ok(&[5]), StubRasterizer::new(true));
        studio.generate().await;

        let outcome = studio.export().await;
        assert!(matches!(outcome, ExportOutcome::Failed(_)));
        let snapshot = studio.snapshot().await;
        assert!(snapshot.render.image().is_some());
        assert_eq!(
            snapshot.export_error,
            Some(ExportError::Encode("simulated".to_string()))
        );
    }

    #[tokio::test]
    async fn suggestion_after_ready_keeps_the_image() {
        let studio = CardStudio::new(FixedGenerator::ok(&[3]), StubRasterizer::new(false));
        studio.generate().await;
        assert_eq!(studio.choose_suggestion(3).await, Some(SUGGESTED_WISHES[3]));
        let snapshot = studio.snapshot().await;
        assert!(snapshot.render.image().is_some());
        assert_eq!(snapshot.request.wish(), SUGGESTED_WISHES[3]);
    }

    #[tokio::test]
    async fn registry_reuses_and_prunes_studios() {
        let registry = StudioRegistry::new(
            FixedGenerator::ok(&[1]),
            StubRasterizer::new(false),
            Duration::from_secs(3600),
        );
        let first = registry.studio("a").await;
        let again = registry.studio("a").await;
        assert!(Arc::ptr_eq(&first, &again));
        registry.studio("b").await;
        assert_eq!(registry.len().await, 2);

        let eager = StudioRegistry::new(
            FixedGenerator::ok(&[1]),
            StubRasterizer::new(false),
            Duration::ZERO,
        );
        eager.studio("a").await;
        eager.studio("b").await;
        assert_eq!(eager.len().await, 1);
        assert!(!eager.is_empty().await);
    }
}
