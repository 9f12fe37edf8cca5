// Generation Orchestrator: premise → illustrated manga document

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use super::events::ProgressSink;
use crate::core::errors::GenerationResult;
use crate::core::types::{GenerationRequest, MangaDocument};
use crate::document::{merge_panel_image, with_character_images};
use crate::phases::{CallGuard, Phase1Pipeline, Phase2Pipeline, Phase3Pipeline};
use crate::services::backend::MangaBackend;
use crate::utils::Metrics;

pub const SCRIPT_LABEL: &str = "Generating manga script and storyboard...";
pub const CHARACTERS_LABEL: &str = "Creating character designs...";

/// Drives one generation run through the three phases
pub struct GenerationOrchestrator {
    phase1: Phase1Pipeline,
    phase2: Phase2Pipeline,
    phase3: Phase3Pipeline,
    call_timeout: Duration,
    metrics: Option<Metrics>,
}

impl GenerationOrchestrator {
    pub fn new(
        backend: Arc<dyn MangaBackend>,
        call_timeout: Duration,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            phase1: Phase1Pipeline::new(backend.clone(), metrics.clone()),
            phase2: Phase2Pipeline::new(backend.clone(), metrics.clone()),
            phase3: Phase3Pipeline::new(backend, metrics.clone()),
            call_timeout,
            metrics,
        }
    }

    /// Run the whole pipeline for one request.
    ///
    /// The sink first sees a document once every character sheet exists, then
    /// again after each panel is merged. On failure the last snapshot it saw
    /// is the partial result; `on_error` is called before the error returns.
    #[instrument(skip(self, request, sink, cancel), fields(style = %request.style, pages = request.page_count))]
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> GenerationResult<MangaDocument> {
        let request = request.clone().clamped();
        let start = Instant::now();

        if let Some(ref m) = self.metrics {
            m.record_run_started();
        }

        let guard = CallGuard::new(self.call_timeout, cancel.clone());
        let result = self.run(&request, sink, &guard).await;

        match &result {
            Ok(document) => info!(
                "✓ \"{}\" finished: {} panels in {:.2}s",
                document.title,
                document.total_panels(),
                start.elapsed().as_secs_f64()
            ),
            Err(e) => {
                let transient = e.api_error().map(|api| api.is_transient());
                error!(stage = %e.stage(), ?transient, "Generation failed: {}", e);
                sink.on_error(e);
            }
        }

        if let Some(ref m) = self.metrics {
            m.record_run_finished(result.is_ok());
        }

        result
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        sink: &dyn ProgressSink,
        guard: &CallGuard,
    ) -> GenerationResult<MangaDocument> {
        sink.on_progress(SCRIPT_LABEL);
        let script = self.phase1.execute(request, guard).await?;

        sink.on_progress(CHARACTERS_LABEL);
        let images = self
            .phase2
            .execute(&script.characters, request.style, guard)
            .await?;

        let mut document = with_character_images(&script, images);
        sink.on_partial_document(&document);

        let characters = document.characters.clone();
        let plan = Phase3Pipeline::plan(&document);
        for job in &plan.jobs {
            sink.on_progress(&job.progress_label());

            let image = self
                .phase3
                .draw(&plan, job, &characters, request.style, guard)
                .await?;

            document = merge_panel_image(&document, &job.page_id, &job.panel_id, &image);
            if let Some(ref m) = self.metrics {
                m.record_panel_drawn();
            }
            sink.on_partial_document(&document);
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{ApiError, ApiResult, GenerationError, Stage};
    use crate::core::types::{CharacterProfile, Dialogue, MangaStyle, Page, Panel};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockBackend {
        calls: Mutex<Vec<String>>,
        panel_characters: Mutex<Vec<Vec<CharacterProfile>>>,
        fail_script: bool,
        fail_character: Option<String>,
        fail_panel: Option<String>,
        hang_panel: Option<String>,
        panel_delay: Option<Duration>,
        panels_in_flight: AtomicUsize,
        max_panels_in_flight: AtomicUsize,
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            status: 500,
            body: "boom".to_string(),
        }
    }

    fn panel(id: &str, description: &str) -> Panel {
        Panel {
            id: id.to_string(),
            description: description.to_string(),
            dialogue: vec![Dialogue {
                character: "Rin".to_string(),
                text: "Let's go!".to_string(),
            }],
            narration: None,
            image_url: None,
        }
    }

    fn script() -> MangaDocument {
        MangaDocument {
            title: "Skybound".to_string(),
            characters: vec![
                CharacterProfile {
                    name: "Rin".to_string(),
                    description: "pilot with goggles".to_string(),
                    reference_image: None,
                },
                CharacterProfile {
                    name: "Oto".to_string(),
                    description: "mechanic robot".to_string(),
                    reference_image: None,
                },
            ],
            pages: vec![Page {
                id: "page-1".to_string(),
                page_number: 1,
                layout: "two stacked panels".to_string(),
                panels: vec![panel("p1", "hangar at dawn"), panel("p2", "takeoff")],
            }],
        }
    }

    #[async_trait]
    impl MangaBackend for MockBackend {
        async fn generate_script(
            &self,
            premise: &str,
            _style: MangaStyle,
            page_count: u32,
        ) -> ApiResult<MangaDocument> {
            self.calls
                .lock()
                .push(format!("script:{}:{}", premise, page_count));
            if self.fail_script {
                return Err(ApiError::InvalidResponse("not json".to_string()));
            }
            Ok(script())
        }

        async fn generate_character_image(
            &self,
            description: &str,
            _style: MangaStyle,
        ) -> ApiResult<String> {
            self.calls.lock().push(format!("character:{}", description));
            if self.fail_character.as_deref() == Some(description) {
                return Err(server_error());
            }
            Ok(format!("sheet({})", description))
        }

        async fn generate_panel_image(
            &self,
            description: &str,
            characters: &[CharacterProfile],
            _style: MangaStyle,
        ) -> ApiResult<String> {
            self.calls.lock().push(format!("panel:{}", description));
            self.panel_characters.lock().push(characters.to_vec());

            let now = self.panels_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_panels_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.panel_delay {
                tokio::time::sleep(delay).await;
            }
            self.panels_in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.hang_panel.as_deref() == Some(description) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if self.fail_panel.as_deref() == Some(description) {
                return Err(server_error());
            }
            Ok(format!("art({})", description))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        labels: Mutex<Vec<String>>,
        documents: Mutex<Vec<MangaDocument>>,
        errors: Mutex<Vec<String>>,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, label: &str) {
            self.labels.lock().push(label.to_string());
            if let Some((trigger, token)) = &self.cancel_on {
                if label == trigger {
                    token.cancel();
                }
            }
        }

        fn on_partial_document(&self, document: &MangaDocument) {
            self.documents.lock().push(document.clone());
        }

        fn on_error(&self, error: &GenerationError) {
            self.errors.lock().push(error.stage().to_string());
        }
    }

    fn orchestrator(backend: Arc<MockBackend>) -> GenerationOrchestrator {
        GenerationOrchestrator::new(backend, Duration::from_secs(5), Some(Metrics::new()))
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("a girl builds a plane", MangaStyle::Shonen, 1)
    }

    #[tokio::test]
    async fn test_full_run_reports_progress_and_snapshots() {
        let backend = Arc::new(MockBackend::default());
        let sink = RecordingSink::default();

        let document = orchestrator(backend.clone())
            .generate(&request(), &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert!(document.is_fully_illustrated());
        assert_eq!(
            document.find_panel("page-1", "p2").unwrap().image_url.as_deref(),
            Some("art(takeoff)")
        );
        assert_eq!(
            document.characters[1].reference_image.as_deref(),
            Some("sheet(mechanic robot)")
        );

        assert_eq!(
            *sink.labels.lock(),
            vec![
                SCRIPT_LABEL.to_string(),
                CHARACTERS_LABEL.to_string(),
                "Drawing panel 1 of 2...".to_string(),
                "Drawing panel 2 of 2...".to_string(),
            ]
        );

        let documents = sink.documents.lock();
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[0].illustrated_panels(), 0);
        assert!(documents[0].characters.iter().all(|c| c.reference_image.is_some()));
        assert_eq!(documents[1].illustrated_panels(), 1);
        assert_eq!(documents[2], document);
        assert!(sink.errors.lock().is_empty());

        // Panel calls see the characters with their reference sheets
        let seen = backend.panel_characters.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].iter().all(|c| c.reference_image.is_some()));
    }

    #[tokio::test]
    async fn test_calls_happen_in_phase_order() {
        let backend = Arc::new(MockBackend::default());
        orchestrator(backend.clone())
            .generate(&request(), &RecordingSink::default(), &CancellationToken::new())
            .await
            .unwrap();

        let calls = backend.calls.lock();
        assert_eq!(calls[0], "script:a girl builds a plane:1");
        let mut characters = calls[1..3].to_vec();
        characters.sort();
        assert_eq!(
            characters,
            vec!["character:mechanic robot", "character:pilot with goggles"]
        );
        assert_eq!(&calls[3..], &["panel:hangar at dawn", "panel:takeoff"]);
    }

    #[tokio::test]
    async fn test_page_count_is_clamped_before_script_call() {
        let backend = Arc::new(MockBackend::default());
        let request = GenerationRequest {
            premise: "p".to_string(),
            style: MangaStyle::Seinen,
            page_count: 40,
        };
        orchestrator(backend.clone())
            .generate(&request, &RecordingSink::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(backend.calls.lock()[0], "script:p:5");
    }

    #[tokio::test]
    async fn test_single_run_draws_one_panel_at_a_time() {
        let backend = Arc::new(MockBackend {
            panel_delay: Some(Duration::from_millis(30)),
            ..Default::default()
        });
        orchestrator(backend.clone())
            .generate(&request(), &RecordingSink::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(backend.max_panels_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_runs_do_not_share_panel_queue() {
        let backend = Arc::new(MockBackend {
            panel_delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let orchestrator = Arc::new(orchestrator(backend.clone()));

        let runs = (0..2).map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .generate(&request(), &RecordingSink::default(), &CancellationToken::new())
                    .await
            })
        });
        for run in futures::future::join_all(runs).await {
            assert!(run.unwrap().unwrap().is_fully_illustrated());
        }

        // One in flight per run, so both runs overlap
        assert_eq!(backend.max_panels_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_script_failure_publishes_nothing() {
        let backend = Arc::new(MockBackend {
            fail_script: true,
            ..Default::default()
        });
        let sink = RecordingSink::default();

        let err = orchestrator(backend.clone())
            .generate(&request(), &sink, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Script { .. }));
        assert!(sink.documents.lock().is_empty());
        assert_eq!(*sink.errors.lock(), vec!["script"]);
        assert_eq!(backend.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_character_failure_discards_all_sheets() {
        let backend = Arc::new(MockBackend {
            fail_character: Some("mechanic robot".to_string()),
            ..Default::default()
        });
        let sink = RecordingSink::default();

        let err = orchestrator(backend.clone())
            .generate(&request(), &sink, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            GenerationError::CharacterImage {
                character_index,
                ref name,
                ..
            } => {
                assert_eq!(character_index, 1);
                assert_eq!(name, "Oto");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(sink.documents.lock().is_empty());
        assert_eq!(*sink.errors.lock(), vec!["character-image"]);
        assert!(backend.calls.lock().iter().all(|c| !c.starts_with("panel:")));
    }

    #[tokio::test]
    async fn test_panel_failure_keeps_earlier_panels() {
        let backend = Arc::new(MockBackend {
            fail_panel: Some("takeoff".to_string()),
            ..Default::default()
        });
        let sink = RecordingSink::default();

        let err = orchestrator(backend)
            .generate(&request(), &sink, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            GenerationError::PanelImage {
                panel_index,
                ref panel_id,
                ..
            } => {
                assert_eq!(panel_index, 2);
                assert_eq!(panel_id, "p2");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let documents = sink.documents.lock();
        let last = documents.last().unwrap();
        assert!(last.find_panel("page-1", "p1").unwrap().image_url.is_some());
        assert!(last.find_panel("page-1", "p2").unwrap().image_url.is_none());
        assert_eq!(*sink.errors.lock(), vec!["panel-image"]);
    }

    #[tokio::test]
    async fn test_hung_panel_call_times_out() {
        let backend = Arc::new(MockBackend {
            hang_panel: Some("hangar at dawn".to_string()),
            ..Default::default()
        });
        let sink = RecordingSink::default();

        let err = GenerationOrchestrator::new(backend, Duration::from_millis(50), None)
            .generate(&request(), &sink, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GenerationError::PanelImage {
                panel_index: 1,
                source: ApiError::Timeout(_),
                ..
            }
        ));
        assert_eq!(sink.documents.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_call() {
        let backend = Arc::new(MockBackend::default());
        let cancel = CancellationToken::new();
        let sink = RecordingSink {
            cancel_on: Some(("Drawing panel 2 of 2...".to_string(), cancel.clone())),
            ..Default::default()
        };

        let err = orchestrator(backend.clone())
            .generate(&request(), &sink, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Cancelled {
                stage: Stage::PanelImage
            }
        ));
        assert!(!backend.calls.lock().contains(&"panel:takeoff".to_string()));

        let documents = sink.documents.lock();
        assert_eq!(documents.last().unwrap().illustrated_panels(), 1);
    }

    #[tokio::test]
    async fn test_run_metrics_recorded() {
        let metrics = Metrics::new();
        let backend = Arc::new(MockBackend {
            fail_panel: Some("takeoff".to_string()),
            ..Default::default()
        });
        let orchestrator =
            GenerationOrchestrator::new(backend, Duration::from_secs(5), Some(metrics.clone()));

        let _ = orchestrator
            .generate(&request(), &RecordingSink::default(), &CancellationToken::new())
            .await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs_started, 1);
        assert_eq!(snapshot.runs_failed, 1);
        assert_eq!(snapshot.panels_drawn, 1);
    }
}
