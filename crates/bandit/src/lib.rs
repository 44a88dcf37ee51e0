//! Multi-armed bandit scoring for banner rotation.

pub mod ucb;

pub use ucb::{select_arm, ucb1_score};
