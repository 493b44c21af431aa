//! Row types for the tag tables.
//!
//! Column names follow the schema created by [`crate::schema`].

pub mod item;
pub mod tag;

pub use item::*;
pub use tag::*;
