// Prompt text for script, character sheet and panel generation

use rand::seq::SliceRandom;

use crate::core::types::{CharacterProfile, MangaStyle};

/// Story ideas offered when the user asks to be surprised
pub const SURPRISE_PREMISES: [&str; 5] = [
    "A time-traveling cat saves ancient Japan from a meteor.",
    "A rookie space pilot discovers a sentient nebula.",
    "A baker whose cakes predict the future.",
    "Two rival student detectives solve a mystery at their high school festival.",
    "A lonely robot tends to a garden on a post-apocalyptic Earth.",
];

pub fn random_premise() -> &'static str {
    SURPRISE_PREMISES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(SURPRISE_PREMISES[0])
}

pub fn script_prompt(premise: &str, style: MangaStyle, page_count: u32) -> String {
    format!(
        "You are a professional manga scriptwriter. Based on the following story idea, create a script \
         for a {pages}-page manga in the {style} style. The story should be engaging and visually \
         interesting. Distribute the story across the pages and panels appropriately.\n\n\
         Story Idea: \"{premise}\"\n\n\
         Generate a complete JSON object that follows the provided schema. Ensure every field is filled \
         out correctly. The number of pages must be exactly {pages}. Each page can have between 2 to 6 panels.",
        pages = page_count,
        style = style,
        premise = premise,
    )
}

pub fn character_prompt(description: &str, style: MangaStyle) -> String {
    format!(
        "Create a full-body character reference sheet for a manga character in a {} style. \
         The character is: \"{}\". The background should be a simple, plain white to isolate \
         the character. The character should have a neutral expression.",
        style, description
    )
}

pub fn panel_prompt(description: &str, characters: &[CharacterProfile], style: MangaStyle) -> String {
    let roster = characters
        .iter()
        .map(|c| format!("- {}: {}", c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Generate a single manga panel in a black and white {} style. The panel must be detailed \
         and visually compelling.\n\n\
         Scene description: \"{}\"\n\n\
         The characters involved are described below. Use their reference images to ensure consistency.\n{}",
        style, description, roster
    )
}
