// Manga document model and generation request types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smallest page count a run may request
pub const MIN_PAGES: u32 = 1;
/// Largest page count a run may request
pub const MAX_PAGES: u32 = 5;
/// Page count used when the caller does not pick one
pub const DEFAULT_PAGES: u32 = 2;

/// Visual genre for all generated art
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MangaStyle {
    #[default]
    Shonen,
    Shojo,
    Seinen,
    Chibi,
}

impl MangaStyle {
    pub const ALL: [MangaStyle; 4] = [
        MangaStyle::Shonen,
        MangaStyle::Shojo,
        MangaStyle::Seinen,
        MangaStyle::Chibi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MangaStyle::Shonen => "Shonen",
            MangaStyle::Shojo => "Shojo",
            MangaStyle::Seinen => "Seinen",
            MangaStyle::Chibi => "Chibi",
        }
    }
}

impl fmt::Display for MangaStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MangaStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MangaStyle::ALL
            .iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| {
                format!(
                    "unknown manga style '{}' (expected one of: Shonen, Shojo, Seinen, Chibi)",
                    s
                )
            })
    }
}

/// One line of speech in a panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialogue {
    /// Display label of the speaker, not a key into `characters`
    pub character: String,
    pub text: String,
}

/// One illustrated cell of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub dialogue: Vec<Dialogue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    /// Base64 panel illustration, set once when the panel is drawn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub page_number: u32,
    /// Advisory layout hint such as "3-panel-pyramid"
    #[serde(default)]
    pub layout: String,
    pub panels: Vec<Panel>,
}

/// A character's description plus the reference sheet used for consistency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterProfile {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
}

/// The structured result of a generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MangaDocument {
    pub title: String,
    #[serde(default)]
    pub characters: Vec<CharacterProfile>,
    pub pages: Vec<Page>,
}

impl MangaDocument {
    /// Total number of panels across all pages
    pub fn total_panels(&self) -> usize {
        self.pages.iter().map(|p| p.panels.len()).sum()
    }

    /// Panels in drawing order: ascending page number, then declared panel order.
    ///
    /// Pages sharing a page number keep their declared relative order.
    pub fn panels_in_order(&self) -> Vec<(&Page, &Panel)> {
        let mut pages: Vec<&Page> = self.pages.iter().collect();
        pages.sort_by_key(|p| p.page_number);
        pages
            .into_iter()
            .flat_map(|page| page.panels.iter().map(move |panel| (page, panel)))
            .collect()
    }

    pub fn is_fully_illustrated(&self) -> bool {
        self.pages
            .iter()
            .flat_map(|p| p.panels.iter())
            .all(|panel| panel.image_url.is_some())
    }

    pub fn illustrated_panels(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| p.panels.iter())
            .filter(|panel| panel.image_url.is_some())
            .count()
    }

    pub fn find_panel(&self, page_id: &str, panel_id: &str) -> Option<&Panel> {
        self.pages
            .iter()
            .find(|p| p.id == page_id)
            .and_then(|p| p.panels.iter().find(|panel| panel.id == panel_id))
    }
}

/// Input to a generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub premise: String,
    #[serde(default)]
    pub style: MangaStyle,
    #[serde(default = "default_page_count")]
    pub page_count: u32,
}

fn default_page_count() -> u32 {
    DEFAULT_PAGES
}

impl GenerationRequest {
    /// Build a request, clamping the page count to [MIN_PAGES, MAX_PAGES]
    pub fn new(premise: impl Into<String>, style: MangaStyle, page_count: u32) -> Self {
        Self {
            premise: premise.into(),
            style,
            page_count: clamp_page_count(page_count),
        }
    }

    /// Re-apply the page count clamp (for requests built by deserialization)
    pub fn clamped(mut self) -> Self {
        self.page_count = clamp_page_count(self.page_count);
        self
    }
}

pub fn clamp_page_count(page_count: u32) -> u32 {
    page_count.clamp(MIN_PAGES, MAX_PAGES)
}

/// Which text field of a panel an edit replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEditKind {
    Dialogue,
    Narration,
}

/// A user text edit addressed by (page id, panel id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub page_id: String,
    pub panel_id: String,
    pub kind: TextEditKind,
    pub new_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialogue_index: Option<usize>,
}
