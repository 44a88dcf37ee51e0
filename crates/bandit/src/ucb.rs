//! UCB1 arm selection over show (attempt) and click (success) counts.
//!
//! `score[i] = successes[i] / attempts[i] + sqrt(2 * ln(total_attempts) / attempts[i])`

use rotator_core::{RotatorError, RotatorResult};

/// UCB1 score of one arm. `attempts` must be non-zero.
pub fn ucb1_score(attempts: u64, successes: u64, log_total: f64) -> f64 {
    let attempts = attempts as f64;
    let avg_reward = successes as f64 / attempts;
    let exploration = (2.0 * log_total / attempts).sqrt();
    avg_reward + exploration
}

/// Index of the arm with the highest UCB1 score. Ties go to the lowest index.
///
/// Every arm must have been tried at least once; a zero attempt count is a
/// caller bug and is rejected rather than scored as infinity.
pub fn select_arm(attempts: &[u64], successes: &[u64]) -> RotatorResult<usize> {
    if attempts.len() != successes.len() {
        return Err(RotatorError::InvalidInput(format!(
            "attempts has {} entries but successes has {}",
            attempts.len(),
            successes.len()
        )));
    }
    if attempts.is_empty() {
        return Err(RotatorError::InvalidInput("no arms to score".to_string()));
    }
    if let Some(index) = attempts.iter().position(|&a| a == 0) {
        return Err(RotatorError::InvalidInput(format!(
            "arm {index} has zero attempts"
        )));
    }

    let total: u64 = attempts.iter().sum();
    let log_total = (total as f64).ln();

    let mut best_score = f64::NEG_INFINITY;
    let mut best_index = 0;

    for (index, (&a, &s)) in attempts.iter().zip(successes).enumerate() {
        let score = ucb1_score(a, s, log_total);
        if score > best_score {
            best_score = score;
            best_index = index;
        }
    }

    Ok(best_index)
}
