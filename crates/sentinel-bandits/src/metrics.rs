//! Per-tick drift of the interpretable policy facets.

use sentinel_core::{round_to, Context, ErrorKind, PolicyMetrics};

const DEBUGGING_RATE: f64 = 0.2;
const REFACTOR_TARGET_CLEANLINESS: f64 = 0.7;
const REFACTOR_RATE: f64 = 0.15;
/// Pause seconds that add a full unit to the time facet.
const TIME_FACTOR_SCALE: f64 = 300.0;
const EDGE_CASE_STEP: f64 = 0.2;
const REWARD_REINFORCEMENT: f64 = 0.05;

/// Applies the facet updates for `ctx`, then reinforces every facet by the
/// reward. Facets end clamped to `[0, 1]` and rounded to three decimals.
pub fn update_policy_metrics(metrics: &mut PolicyMetrics, ctx: &Context, reward: f64) {
    metrics.debugging += ctx.fail_rate * DEBUGGING_RATE;
    metrics.refactor += (REFACTOR_TARGET_CLEANLINESS - ctx.cleanliness) * REFACTOR_RATE;
    metrics.time_factor_optimization += ctx.pause_length / TIME_FACTOR_SCALE;
    if ctx.error_type == ErrorKind::EdgeCase {
        metrics.edge_case_resilience += EDGE_CASE_STEP;
    }

    for facet in metrics.facets_mut() {
        *facet += reward * REWARD_REINFORCEMENT;
        *facet = round_to(facet.clamp(0.0, 1.0), 3);
    }
}
