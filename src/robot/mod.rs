//! Robot description and posed state

pub mod model;
pub mod state;

#[cfg(test)]
pub(crate) mod fixtures;

pub use model::*;
pub use state::*;
