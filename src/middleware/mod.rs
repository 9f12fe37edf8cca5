// Middleware for resilient calls to the generative service
//
// Provides API key health tracking and circuit breaking

pub mod api_key_pool;
pub mod circuit_breaker;

// Re-export commonly used types
pub use api_key_pool::{ApiKeyPool, KeyHealth, KeyStats};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
