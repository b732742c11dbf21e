//! # nixcage-common
//!
//! Shared error definitions, constants, the insertion-ordered string set,
//! and the bundle-layout context used across the entire nixcage workspace.
//!
//! This crate is the leaf of the dependency graph — it depends on no other
//! internal crate and provides the foundational primitives that all other
//! crates build upon.

pub mod bundle;
pub mod constants;
pub mod error;
pub mod strset;
