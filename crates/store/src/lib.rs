mod error;
mod schema;
mod store;

pub use error::{DbError, Result};
pub use schema::CURRENT_SCHEMA_VERSION;
pub use store::{MetadataStore, ProjectRow};
