use chrono::{DateTime, Utc};

use crate::models::EfficiencyState;
use crate::{
    COMBO_RESET_IDLE_MINUTES, COMBO_STEP_PER_ACTIVITY, DECAY_IDLE_MINUTES,
    EFFICIENCY_RECOVERY_PER_ACTIVITY, MAX_COMBO_MULTIPLIER, MAX_EFFICIENCY, MIN_EFFICIENCY,
};

/// Entry state whenever a mining session starts.
pub fn fresh(now: DateTime<Utc>) -> EfficiencyState {
    EfficiencyState {
        efficiency: MAX_EFFICIENCY,
        combo_multiplier: 1.0,
        last_interaction: now,
    }
}

/// One periodic decay check. Efficiency drops by a point past the idle
/// threshold, floored at the minimum; the combo multiplier resets to 1 past
/// the longer threshold, never below.
pub fn decay_tick(state: &mut EfficiencyState, now: DateTime<Utc>) {
    let minutes_since_interaction =
        now.signed_duration_since(state.last_interaction).num_milliseconds() as f64 / 60_000.0;

    if minutes_since_interaction > DECAY_IDLE_MINUTES {
        state.efficiency = (state.efficiency - 1).max(MIN_EFFICIENCY);
    }

    if minutes_since_interaction > COMBO_RESET_IDLE_MINUTES && state.combo_multiplier > 1.0 {
        state.combo_multiplier = 1.0;
    }
}

/// A qualifying interaction resets the decay clock. It does not restore
/// efficiency; recovery rides the reward-granting path.
pub fn register_interaction(state: &mut EfficiencyState, at: DateTime<Utc>) {
    state.last_interaction = at;
}

/// Applied when the backend confirms a rewarded activity: sustained activity
/// rebuilds efficiency and grows the combo multiplier, both capped.
pub fn apply_reward_recovery(state: &mut EfficiencyState, at: DateTime<Utc>) {
    state.last_interaction = at;
    state.efficiency = (state.efficiency + EFFICIENCY_RECOVERY_PER_ACTIVITY).min(MAX_EFFICIENCY);
    state.combo_multiplier =
        (state.combo_multiplier + COMBO_STEP_PER_ACTIVITY).min(MAX_COMBO_MULTIPLIER);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn efficiency_never_drops_below_floor() {
        let t0 = Utc::now();
        let mut state = fresh(t0);
        for i in 0..500i64 {
            decay_tick(&mut state, t0 + Duration::minutes(10) + Duration::seconds(30 * i));
        }
        assert_eq!(state.efficiency, MIN_EFFICIENCY);
    }

    #[test]
    fn three_idle_ticks_cost_three_points() {
        let t0 = Utc::now();
        let mut state = fresh(t0);
        for _ in 0..3 {
            // each tick observes 3 idle minutes, past the 2-minute threshold
            decay_tick(&mut state, t0 + Duration::minutes(3));
        }
        assert_eq!(state.efficiency, 97);
    }

    #[test]
    fn no_decay_under_idle_threshold() {
        let t0 = Utc::now();
        let mut state = fresh(t0);
        decay_tick(&mut state, t0 + Duration::seconds(90));
        assert_eq!(state.efficiency, MAX_EFFICIENCY);
        assert_eq!(state.combo_multiplier, 1.0);
    }

    #[test]
    fn combo_resets_to_exactly_one_past_long_idle() {
        let t0 = Utc::now();
        let mut state = fresh(t0);
        state.combo_multiplier = 2.0;
        decay_tick(&mut state, t0 + Duration::minutes(6));
        assert_eq!(state.combo_multiplier, 1.0);
    }

    #[test]
    fn combo_survives_short_idle() {
        let t0 = Utc::now();
        let mut state = fresh(t0);
        state.combo_multiplier = 2.0;
        decay_tick(&mut state, t0 + Duration::minutes(3));
        assert_eq!(state.combo_multiplier, 2.0);
    }

    #[test]
    fn interaction_resets_clock_but_not_efficiency() {
        let t0 = Utc::now();
        let mut state = fresh(t0);
        state.efficiency = 80;
        register_interaction(&mut state, t0 + Duration::minutes(10));
        assert_eq!(state.efficiency, 80);
        // decay clock restarted: a tick two minutes later sees no idle time
        decay_tick(&mut state, t0 + Duration::minutes(11));
        assert_eq!(state.efficiency, 80);
    }

    #[test]
    fn reward_recovery_is_capped() {
        let t0 = Utc::now();
        let mut state = fresh(t0);
        state.efficiency = 98;
        state.combo_multiplier = 2.95;
        apply_reward_recovery(&mut state, t0);
        assert_eq!(state.efficiency, MAX_EFFICIENCY);
        assert_eq!(state.combo_multiplier, MAX_COMBO_MULTIPLIER);
    }
}
