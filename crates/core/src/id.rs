//! Unique identifiers for Stratus entities.
//!
//! Identifiers are strongly-typed UUID wrappers built with
//! [`domain-key`](https://crates.io/crates/domain-key) `Uuid<D>`, so a
//! [`NodeId`] can never be mixed up with another UUID-shaped value.
//!
//! All ID types are `Copy` (16 bytes, stack-allocated) and support:
//! - `v4()` for random UUID generation
//! - `nil()` for zero-valued default
//! - `parse(&str)` for string parsing
//! - Full serde support (serializes as UUID string)
//! - `Display`, `FromStr`, `Eq`, `Ord`, `Hash`

use domain_key::define_uuid;

// Re-export for downstream parse error handling
pub use domain_key::UuidParseError;

define_uuid!(pub NodeIdDomain => NodeId);
