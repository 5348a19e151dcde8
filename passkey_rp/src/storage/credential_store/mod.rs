mod memory;
mod sqlite;
mod types;

pub use memory::InMemoryCredentialStore;
pub use sqlite::SqliteCredentialStore;
pub use types::CredentialStore;
