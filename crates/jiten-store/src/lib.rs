pub mod delete;
pub mod error;
pub mod key;
pub mod query;
pub mod schema;
pub mod store;

pub use self::error::StoreError;
pub use self::key::IndexKey;
pub use self::query::Query;
pub use self::schema::{SchemaUpgrade, StoreDefinition};
pub use self::store::{CountTarget, Store, UpdateItem};

#[cfg(test)]
mod tests;
