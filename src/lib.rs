// Library exports for the manga generation pipeline

pub mod core;
pub mod document;
pub mod middleware;
pub mod orchestration;
pub mod phases;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{ApiError, ConfigError, GenerationError, Stage},
    types::{
        CharacterProfile, Dialogue, GenerationRequest, MangaDocument, MangaStyle, Page, Panel,
        TextEdit, TextEditKind,
    },
};

pub use document::{apply_edit, apply_text_edit, merge_panel_image, with_character_images};

pub use middleware::{ApiKeyPool, CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::{ChannelSink, GenerationEvent, GenerationOrchestrator, ProgressSink};

pub use services::{ApiClient, MangaBackend};

pub use utils::{Metrics, MetricsSnapshot};
