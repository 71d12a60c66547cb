pub mod core;
pub mod relation;
pub mod store_object;

pub use self::core::{GenericStore, TableSchema};
pub use relation::attach_relation;
