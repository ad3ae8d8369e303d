#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Stratus Auth
//!
//! The authorization boundary consumed by the node metadata endpoint.
//!
//! - [`TokenResolver`] -- resolves a bearer token to an optional [`Capability`]
//! - [`NodeCapability`] -- answers "may this caller read / write the node?"
//! - [`NodePolicy`] -- the `deny` / `read` / `write` capability
//! - [`AclDisabled`] and [`StaticTokenResolver`] -- built-in resolvers
//!
//! Token issuance and bearer-token verification live with the ACL
//! authority; this crate only consumes its answer.

pub mod capability;
pub mod error;
pub mod resolver;

pub use capability::{NodeCapability, NodePolicy};
pub use error::AuthError;
pub use resolver::{AclDisabled, Capability, StaticTokenResolver, TokenResolver};
