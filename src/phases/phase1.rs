// Phase 1: Script generation

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

use super::CallGuard;
use crate::core::errors::{GenerationResult, Stage, StageContext};
use crate::core::types::{GenerationRequest, MangaDocument};
use crate::services::backend::MangaBackend;
use crate::utils::Metrics;

/// Phase 1 pipeline: premise → script
pub struct Phase1Pipeline {
    backend: Arc<dyn MangaBackend>,
    metrics: Option<Metrics>,
}

impl Phase1Pipeline {
    pub fn new(backend: Arc<dyn MangaBackend>, metrics: Option<Metrics>) -> Self {
        Self { backend, metrics }
    }

    /// Ask the script generator for title, characters and pages.
    ///
    /// Any failure, including an unparsable script, fails the run before a
    /// document exists.
    #[instrument(skip(self, request, guard), fields(style = %request.style, pages = request.page_count))]
    pub async fn execute(
        &self,
        request: &GenerationRequest,
        guard: &CallGuard,
    ) -> GenerationResult<MangaDocument> {
        let start = Instant::now();

        let document = guard
            .run(
                Stage::Script,
                self.backend
                    .generate_script(&request.premise, request.style, request.page_count),
            )
            .await?
            .in_script_stage()?;

        if let Some(ref m) = self.metrics {
            m.record_stage_duration(Stage::Script, start.elapsed());
        }

        info!(
            "Script \"{}\": {} characters, {} pages, {} panels in {:.2}s",
            document.title,
            document.characters.len(),
            document.pages.len(),
            document.total_panels(),
            start.elapsed().as_secs_f64()
        );

        Ok(document)
    }
}
