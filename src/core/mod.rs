pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{ApiError, ConfigError, GenerationError, Stage};
pub use types::{
    CharacterProfile, Dialogue, GenerationRequest, MangaDocument, MangaStyle, Page, Panel,
    TextEdit, TextEditKind,
};
