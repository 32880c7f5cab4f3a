pub mod api_client;
pub mod backend;
pub mod http_backend;
pub mod memory;

pub use api_client::ApiClient;
pub use backend::Backend;
pub use http_backend::HttpBackend;
pub use memory::{MemoryBackend, Operation};
