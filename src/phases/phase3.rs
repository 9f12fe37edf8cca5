// Phase 3: Panel illustration
//
// Within one run panels are drawn strictly one at a time. Each run's plan
// owns a single-permit semaphore: whoever drives the jobs, at most one panel
// request of that run is outstanding. Independent runs do not wait on each
// other.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use super::CallGuard;
use crate::core::errors::{GenerationResult, Stage, StageContext};
use crate::core::types::{CharacterProfile, MangaDocument, MangaStyle};
use crate::services::backend::MangaBackend;
use crate::utils::Metrics;

/// Panels allowed in flight at once
const PANEL_CONCURRENCY: usize = 1;

/// One panel to draw, in page-major / panel-minor order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelJob {
    /// 1-based running position across the whole document
    pub index: usize,
    /// Total panels in the document, fixed once the script exists
    pub total: usize,
    pub page_id: String,
    pub panel_id: String,
    pub description: String,
}

impl PanelJob {
    pub fn progress_label(&self) -> String {
        format!("Drawing panel {} of {}...", self.index, self.total)
    }
}

/// One run's panel queue plus the permit that keeps its draws sequential
#[derive(Debug)]
pub struct PanelPlan {
    pub jobs: Vec<PanelJob>,
    in_flight: Semaphore,
}

/// Phase 3 pipeline: panel descriptions + character sheets → panel images
pub struct Phase3Pipeline {
    backend: Arc<dyn MangaBackend>,
    metrics: Option<Metrics>,
}

impl Phase3Pipeline {
    pub fn new(backend: Arc<dyn MangaBackend>, metrics: Option<Metrics>) -> Self {
        Self { backend, metrics }
    }

    /// Queue of every panel in drawing order, for a single run
    pub fn plan(document: &MangaDocument) -> PanelPlan {
        let total = document.total_panels();
        let jobs = document
            .panels_in_order()
            .into_iter()
            .enumerate()
            .map(|(i, (page, panel))| PanelJob {
                index: i + 1,
                total,
                page_id: page.id.clone(),
                panel_id: panel.id.clone(),
                description: panel.description.clone(),
            })
            .collect();

        PanelPlan {
            jobs,
            in_flight: Semaphore::new(PANEL_CONCURRENCY),
        }
    }

    /// Draw one panel of `plan`, waiting for that plan's previous draw first.
    ///
    /// The permit wait counts against the call timeout.
    #[instrument(skip(self, plan, job, characters, guard), fields(panel = job.index, total = job.total, panel_id = %job.panel_id))]
    pub async fn draw(
        &self,
        plan: &PanelPlan,
        job: &PanelJob,
        characters: &[CharacterProfile],
        style: MangaStyle,
        guard: &CallGuard,
    ) -> GenerationResult<String> {
        let start = Instant::now();
        let image = guard
            .run(Stage::PanelImage, async {
                // The plan's semaphore is never closed
                let _permit = plan.in_flight.acquire().await.ok();
                self.backend
                    .generate_panel_image(&job.description, characters, style)
                    .await
            })
            .await?
            .for_panel(job.index, &job.panel_id)?;

        if let Some(ref m) = self.metrics {
            m.record_stage_duration(Stage::PanelImage, start.elapsed());
        }
        debug!("Panel {} drawn in {:.2}s", job.index, start.elapsed().as_secs_f64());

        Ok(image)
    }
}
