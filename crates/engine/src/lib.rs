//! Banner rotation domain: choosing the next banner for a slot and managing
//! which banners are in rotation.

#![warn(clippy::unwrap_used)]

pub mod association;
pub mod selection;

#[cfg(test)]
pub(crate) mod testing;

pub use association::AssociationManager;
pub use selection::SelectionEngine;
