pub mod events;
pub mod generation_orchestrator;

pub use events::{ChannelSink, GenerationEvent, ProgressSink};
pub use generation_orchestrator::{GenerationOrchestrator, CHARACTERS_LABEL, SCRIPT_LABEL};
