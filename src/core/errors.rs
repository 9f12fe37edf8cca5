// Error types for the generation pipeline
//
// Three layers:
// - ApiError: one remote call to the generative service failed
// - GenerationError: a pipeline stage failed (what the user sees)
// - ConfigError: environment configuration is unusable

use thiserror::Error;

/// Failure of a single remote call (script, character image or panel image)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Circuit breaker is open, API is unavailable")]
    CircuitOpen,

    #[error("No healthy API keys available")]
    NoApiKeys,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Response JSON could not be parsed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No image was generated for the {0}")]
    NoImage(&'static str),

    #[error("Remote call timed out after {0}s")]
    Timeout(u64),
}

impl ApiError {
    /// Whether a retry of the same request could plausibly succeed.
    ///
    /// Network faults, rate limits, server overload and an open breaker are
    /// transient. Bad requests, auth failures and unusable payloads are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::CircuitOpen | ApiError::NoApiKeys | ApiError::Timeout(_) => true,
            ApiError::InvalidResponse(_) | ApiError::Json(_) | ApiError::NoImage(_) => false,
        }
    }
}

/// Pipeline stage, used for error reporting and cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Script,
    CharacterImage,
    PanelImage,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Script => "script",
            Stage::CharacterImage => "character-image",
            Stage::PanelImage => "panel-image",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation run errors, surfaced to the user as a single message
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Failed to generate the manga script from the story idea: {source}")]
    Script {
        #[source]
        source: ApiError,
    },

    #[error("Failed to generate character reference image for {name} (character {character_index}): {source}")]
    CharacterImage {
        character_index: usize,
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to generate panel image {panel_index} ({panel_id}): {source}")]
    PanelImage {
        /// 1-based position in page-major, panel-minor order
        panel_index: usize,
        panel_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Generation cancelled during {stage} stage")]
    Cancelled { stage: Stage },
}

impl GenerationError {
    pub fn stage(&self) -> Stage {
        match self {
            GenerationError::Script { .. } => Stage::Script,
            GenerationError::CharacterImage { .. } => Stage::CharacterImage,
            GenerationError::PanelImage { .. } => Stage::PanelImage,
            GenerationError::Cancelled { stage } => *stage,
        }
    }

    /// The underlying remote failure, if any
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            GenerationError::Script { source }
            | GenerationError::CharacterImage { source, .. }
            | GenerationError::PanelImage { source, .. } => Some(source),
            GenerationError::Cancelled { .. } => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No API keys configured (set GEMINI_API_KEYS or API_KEY environment variable)")]
    NoApiKeys,

    #[error("Default page count must be in [1, 5], got {0}")]
    InvalidPageCount(u32),

    #[error("{name} must be > 0")]
    InvalidTimeout { name: &'static str },

    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

pub type ApiResult<T> = Result<T, ApiError>;
pub type GenerationResult<T> = Result<T, GenerationError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

// Helper trait for attaching stage context to remote call failures
pub trait StageContext<T> {
    fn in_script_stage(self) -> GenerationResult<T>;
    fn for_character(self, character_index: usize, name: &str) -> GenerationResult<T>;
    fn for_panel(self, panel_index: usize, panel_id: &str) -> GenerationResult<T>;
}

impl<T> StageContext<T> for ApiResult<T> {
    fn in_script_stage(self) -> GenerationResult<T> {
        self.map_err(|source| GenerationError::Script { source })
    }

    fn for_character(self, character_index: usize, name: &str) -> GenerationResult<T> {
        self.map_err(|source| GenerationError::CharacterImage {
            character_index,
            name: name.to_string(),
            source,
        })
    }

    fn for_panel(self, panel_index: usize, panel_id: &str) -> GenerationResult<T> {
        self.map_err(|source| GenerationError::PanelImage {
            panel_index,
            panel_id: panel_id.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        let err = GenerationError::Script {
            source: ApiError::InvalidResponse("not json".into()),
        };
        assert_eq!(err.stage().as_str(), "script");

        let err: GenerationResult<()> =
            Err(ApiError::NoImage("panel")).for_panel(3, "page-1-panel-3");
        let err = err.unwrap_err();
        assert_eq!(err.stage(), Stage::PanelImage);
        assert!(err.to_string().contains("page-1-panel-3"));

        let err = GenerationError::Cancelled { stage: Stage::CharacterImage };
        assert_eq!(err.stage().to_string(), "character-image");
        assert!(err.api_error().is_none());
    }

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Status { status: 429, body: String::new() }.is_transient());
        assert!(ApiError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!ApiError::Status { status: 400, body: String::new() }.is_transient());
        assert!(ApiError::Timeout(30).is_transient());
        assert!(!ApiError::NoImage("character").is_transient());
        assert!(!ApiError::InvalidResponse("empty".into()).is_transient());
    }
}
