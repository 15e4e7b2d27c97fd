mod memory;
mod r#trait;

pub use memory::InMemoryStore;
pub use r#trait::{ScoreRepository, SuggestionRepository};
