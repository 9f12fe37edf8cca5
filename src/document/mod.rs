// Manga document store: pure transforms over MangaDocument

pub mod edit;
pub mod merge;

pub use edit::{apply_edit, apply_text_edit};
pub use merge::{merge_panel_image, with_character_images};
