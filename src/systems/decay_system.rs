use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tracing::info;

use crate::efficiency;
use crate::models::{EfficiencyState, MiningSession};
use crate::{InteractionEvent, DECAY_CHECK_INTERVAL_MS};

/// Owns the engagement-decay state machine. This is the only task that
/// mutates `EfficiencyState`, and it is spawned exactly once, so there can
/// never be duplicate decay timers compounding the decay rate.
pub async fn decay_system(
    mut session_receiver: watch::Receiver<MiningSession>,
    mut interaction_receiver: UnboundedReceiver<InteractionEvent>,
    efficiency_sender: watch::Sender<EfficiencyState>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(DECAY_CHECK_INTERVAL_MS));
    let mut state = efficiency::fresh(Utc::now());
    let mut was_mining = session_receiver.borrow().is_mining;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if session_receiver.borrow().is_mining {
                    efficiency::decay_tick(&mut state, Utc::now());
                }
                let _ = efficiency_sender.send(state);
            }
            changed = session_receiver.changed() => {
                if changed.is_err() {
                    break;
                }
                let is_mining = session_receiver.borrow().is_mining;
                if is_mining != was_mining {
                    // entering or leaving a session resets to the Full state
                    state = efficiency::fresh(Utc::now());
                    if !is_mining {
                        info!(target: "engine_log", "Mining stopped, efficiency reset");
                    }
                    let _ = efficiency_sender.send(state);
                }
                was_mining = is_mining;
            }
            event = interaction_receiver.recv() => {
                match event {
                    Some(event) => {
                        if event.rewarded {
                            efficiency::apply_reward_recovery(&mut state, event.at);
                        } else {
                            efficiency::register_interaction(&mut state, event.at);
                        }
                        info!(target: "engine_log", "Interaction ({}) refreshed engagement, efficiency {} combo {:.1}", event.activity_type, state.efficiency, state.combo_multiplier);
                        let _ = efficiency_sender.send(state);
                    }
                    None => break,
                }
            }
        }
    }
}
