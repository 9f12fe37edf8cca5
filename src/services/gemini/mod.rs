pub mod api_client;
pub mod prompts;
pub mod schema;

pub use api_client::ApiClient;
pub use prompts::{random_premise, SURPRISE_PREMISES};
