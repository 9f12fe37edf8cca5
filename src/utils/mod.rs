pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{
    decode_image_payload, image_mime_type, sanitize_file_stem, save_payload_as_png_async,
};
pub use metrics::{Metrics, MetricsSnapshot};
