pub mod ollama;
pub mod schema;
pub mod util;

pub use ollama::Ollama;
pub use schema::StructuredOutput;
