// Phase 2: Character reference sheets

use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use super::CallGuard;
use crate::core::errors::{GenerationResult, Stage, StageContext};
use crate::core::types::{CharacterProfile, MangaStyle};
use crate::services::backend::MangaBackend;
use crate::utils::Metrics;

/// Phase 2 pipeline: one reference image per character, all issued together
pub struct Phase2Pipeline {
    backend: Arc<dyn MangaBackend>,
    metrics: Option<Metrics>,
}

impl Phase2Pipeline {
    pub fn new(backend: Arc<dyn MangaBackend>, metrics: Option<Metrics>) -> Self {
        Self { backend, metrics }
    }

    /// Draw every character concurrently and join all of them.
    ///
    /// Returns images in character order. The first failure aborts the batch
    /// and drops every image already received.
    #[instrument(skip(self, characters, guard), fields(characters = characters.len(), style = %style))]
    pub async fn execute(
        &self,
        characters: &[CharacterProfile],
        style: MangaStyle,
        guard: &CallGuard,
    ) -> GenerationResult<Vec<String>> {
        let start = Instant::now();

        let calls = characters.iter().enumerate().map(|(index, character)| async move {
            debug!("Designing character {} ({})", index, character.name);
            guard
                .run(
                    Stage::CharacterImage,
                    self.backend
                        .generate_character_image(&character.description, style),
                )
                .await?
                .for_character(index, &character.name)
        });

        let images = try_join_all(calls).await?;

        if let Some(ref m) = self.metrics {
            m.record_stage_duration(Stage::CharacterImage, start.elapsed());
        }
        info!(
            "Designed {} characters in {:.2}s",
            images.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(images)
    }
}
