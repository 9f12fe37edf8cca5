use async_trait::async_trait;

use crate::core::errors::ApiResult;
use crate::core::types::{CharacterProfile, MangaDocument, MangaStyle};

/// The three remote collaborators the orchestrator drives.
///
/// Image results are base64 payloads, opaque beyond re-embedding.
#[async_trait]
pub trait MangaBackend: Send + Sync {
    /// Write a script: title, characters (without images) and pages of panels
    async fn generate_script(
        &self,
        premise: &str,
        style: MangaStyle,
        page_count: u32,
    ) -> ApiResult<MangaDocument>;

    /// Draw one full-body reference sheet for a character
    async fn generate_character_image(
        &self,
        description: &str,
        style: MangaStyle,
    ) -> ApiResult<String>;

    /// Draw one panel, using the character reference sheets for consistency
    async fn generate_panel_image(
        &self,
        description: &str,
        characters: &[CharacterProfile],
        style: MangaStyle,
    ) -> ApiResult<String>;
}
