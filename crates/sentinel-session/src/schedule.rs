//! Advisory delay until the caller's polling loop should tick again.

use sentinel_core::{Action, Context};

pub const BASE_DELAY_MS: u64 = 20_000;
pub const STRONG_INTERVENTION_DELAY_MS: u64 = 12_000;
pub const STALL_DELAY_MS: u64 = 8_000;
pub const HEALTHY_DELAY_MS: u64 = 30_000;
const STALL_PAUSE_SECS: f64 = 45.0;
const HEALTHY_CLEANLINESS: f64 = 0.8;

/// Rules apply in order; a later match overrides an earlier one.
#[must_use]
pub fn next_evaluation_ms(action: Action, ctx: &Context) -> u64 {
    let mut delay = BASE_DELAY_MS;
    if action == Action::StrongHint {
        delay = STRONG_INTERVENTION_DELAY_MS;
    }
    if ctx.pause_length > STALL_PAUSE_SECS {
        delay = STALL_DELAY_MS;
    }
    if ctx.fail_rate == 0.0 && ctx.cleanliness > HEALTHY_CLEANLINESS {
        delay = HEALTHY_DELAY_MS;
    }
    delay
}
