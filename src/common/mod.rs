//! Common types, traits, and error definitions for stomp_costs
//!
//! This module provides the foundational building blocks used across
//! all cost functions in this crate.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
