//! Scalar reward for the transition between two consecutive ticks.

use sentinel_core::{round_to, Context};

/// Weight of the failure-rate improvement.
pub const CORRECTNESS_WEIGHT: f64 = 0.5;
/// Weight of the cleanliness improvement.
pub const QUALITY_WEIGHT: f64 = 0.3;
/// Weight of the (capped) edit activity.
pub const ACTIVITY_WEIGHT: f64 = 0.2;
/// Number of code changes that saturates the activity term.
pub const ACTIVITY_SATURATION: f64 = 10.0;

/// Reward of moving from `previous` to `current`, rounded to three decimals.
///
/// Without a previous context the reward is exactly `0.0`.
#[must_use]
pub fn compute_reward(current: &Context, previous: Option<&Context>) -> f64 {
    let Some(prev) = previous else {
        return 0.0;
    };

    #[allow(clippy::cast_precision_loss)]
    let change_delta = current.total_changes as f64 - prev.total_changes as f64;
    let activity = (change_delta / ACTIVITY_SATURATION).clamp(0.0, 1.0);

    let reward = CORRECTNESS_WEIGHT * (prev.fail_rate - current.fail_rate)
        + QUALITY_WEIGHT * (current.cleanliness - prev.cleanliness)
        + ACTIVITY_WEIGHT * activity;
    round_to(reward, 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{Difficulty, ErrorKind};

    fn ctx(fail_rate: f64, cleanliness: f64, total_changes: u64) -> Context {
        Context {
            pause_length: 0.0,
            pause_norm: 0.0,
            cleanliness,
            fail_rate,
            error_type: ErrorKind::None,
            difficulty: Difficulty::Medium,
            hints_used: 0,
            total_changes,
        }
    }

    #[test]
    fn cold_start_is_zero() {
        for c in [ctx(1.0, 0.0, 0), ctx(0.0, 1.0, 100), ctx(0.5, 0.5, 3)] {
            assert!(compute_reward(&c, None).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn improvement_is_weighted() {
        let prev = ctx(1.0, 0.5, 2);
        let curr = ctx(0.5, 0.9, 7);
        // 0.5*0.5 + 0.3*0.4 + 0.2*0.5
        assert!((compute_reward(&curr, Some(&prev)) - 0.47).abs() < 1e-9);
    }

    #[test]
    fn activity_term_is_capped_and_never_negative() {
        let prev = ctx(0.0, 1.0, 50);
        let churn = ctx(0.0, 1.0, 500);
        assert!((compute_reward(&churn, Some(&prev)) - 0.2).abs() < 1e-9);

        let reset = ctx(0.0, 1.0, 0);
        assert!(compute_reward(&reset, Some(&prev)).abs() < 1e-9);
    }

    #[test]
    fn regression_is_penalized() {
        let prev = ctx(0.0, 1.0, 0);
        let curr = ctx(1.0, 0.4, 0);
        assert!((compute_reward(&curr, Some(&prev)) + 0.68).abs() < 1e-9);
    }
}
