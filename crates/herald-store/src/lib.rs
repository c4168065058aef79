pub mod database;
pub mod drafts;
pub mod error;
pub mod schema;

pub use database::Database;
pub use drafts::{DraftRepo, DraftRow};
pub use error::StoreError;
