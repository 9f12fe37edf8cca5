pub mod backend;
pub mod gemini;

// Re-export commonly used services
pub use backend::MangaBackend;
pub use gemini::ApiClient;
