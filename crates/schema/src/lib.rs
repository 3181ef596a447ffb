//! Composite persisted objects built from a declared field schema.
//!
//! A [`Schema`] is a closed list of named fields. Each field's type picks one
//! strategy when it is declared: plain values go through serde and need a
//! default, while list, set and map fields start empty and are exposed as live
//! views. [`PersistentObject`] stores all fields in one root container, one JSON
//! object per file.
//!
//! # Invariants
//! - Every declared field is present and holds its declared type. Writes through
//!   `LockedAccess` that break this are reshaped back to the schema before the lock drops.
//! - All fields and every view handed out share the object's single root lock.
//! - Schema mistakes surface from `SchemaBuilder::build`, never at access time.

mod error;
mod object;
mod record;
mod schema;
mod strategy;

pub use error::{ObjectError, SchemaError};
pub use object::{Composite, PersistentObject};
pub use record::Record;
pub use schema::{Field, FieldSpec, Schema, SchemaBuilder};
pub use strategy::FieldKind;

pub fn crate_info() -> &'static str {
    "keepsake-schema v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("schema"));
    }
}
