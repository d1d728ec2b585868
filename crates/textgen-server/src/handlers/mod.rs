//! HTTP request handlers for API endpoints.

pub mod generate;
pub mod health;
pub mod stream;

pub use generate::handle_generate;
pub use health::handle_health;
pub use stream::handle_generate_stream;
