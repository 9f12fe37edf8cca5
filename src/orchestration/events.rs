// Progress reporting for generation runs

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::errors::GenerationError;
use crate::core::types::MangaDocument;

/// Observer of a generation run.
///
/// Calls arrive in order from the task driving the run. Implementations must
/// not block.
pub trait ProgressSink: Send + Sync {
    /// Human-readable label for the step about to start
    fn on_progress(&self, label: &str);

    /// A new snapshot of the document. Each snapshot supersedes the previous one.
    fn on_partial_document(&self, document: &MangaDocument);

    /// The run failed; called once, before the error is returned
    fn on_error(&self, error: &GenerationError);
}

/// Wire form of the progress stream
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationEvent {
    Progress { label: String },
    Document { document: MangaDocument },
    Error { stage: String, message: String },
    Complete { document: MangaDocument },
}

impl GenerationEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            GenerationEvent::Progress { .. } => "progress",
            GenerationEvent::Document { .. } => "document",
            GenerationEvent::Error { .. } => "error",
            GenerationEvent::Complete { .. } => "complete",
        }
    }

    pub fn from_error(error: &GenerationError) -> Self {
        GenerationEvent::Error {
            stage: error.stage().to_string(),
            message: error.to_string(),
        }
    }
}

/// Forwards every callback into an unbounded channel.
///
/// Sends after the receiver is gone are dropped; the run notices the
/// disconnect through its cancellation token instead.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<GenerationEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GenerationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: GenerationEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, label: &str) {
        self.send(GenerationEvent::Progress {
            label: label.to_string(),
        });
    }

    fn on_partial_document(&self, document: &MangaDocument) {
        self.send(GenerationEvent::Document {
            document: document.clone(),
        });
    }

    fn on_error(&self, error: &GenerationError) {
        self.send(GenerationEvent::from_error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{ApiError, Stage};

    #[tokio::test]
    async fn test_channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelSink::new();
        let document = MangaDocument {
            title: "Night Shift".to_string(),
            characters: Vec::new(),
            pages: Vec::new(),
        };

        sink.on_progress("Creating character designs...");
        sink.on_partial_document(&document);
        sink.on_error(&GenerationError::Cancelled {
            stage: Stage::PanelImage,
        });
        drop(sink);

        let mut names = Vec::new();
        while let Some(event) = rx.recv().await {
            names.push(event.name());
        }
        assert_eq!(names, vec!["progress", "document", "error"]);
    }

    #[test]
    fn test_error_event_wire_format() {
        let error = GenerationError::CharacterImage {
            character_index: 1,
            name: "Mika".to_string(),
            source: ApiError::NoImage("character sheet"),
        };
        let json = serde_json::to_value(GenerationEvent::from_error(&error)).unwrap();

        assert_eq!(json["type"], "error");
        assert_eq!(json["stage"], "character-image");
        assert!(json["message"].as_str().unwrap().contains("Mika"));
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_progress("Drawing panel 1 of 1...");
    }
}
