use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tracing::info;

use crate::models::MiningSession;
use crate::StoreCommand;

/// Sole writer of the authoritative mining session. Start/stop actions and
/// heartbeat reconciliation send commands here; every other component holds a
/// read-only watch projection. Display interpolation and efficiency decay
/// keep their own derived state and never write back into this record.
pub async fn session_state_system(
    mut command_receiver: UnboundedReceiver<StoreCommand>,
    session_sender: watch::Sender<MiningSession>,
) {
    while let Some(command) = command_receiver.recv().await {
        match command {
            StoreCommand::Start(session) => {
                info!(target: "engine_log", "Mining session started at {}/min", session.current_rate_per_minute);
                let _ = session_sender.send(session);
            }
            StoreCommand::Stop => {
                info!(target: "engine_log", "Mining session stopped");
                session_sender.send_modify(|session| {
                    session.is_mining = false;
                });
            }
            StoreCommand::Reconcile(fresh) => {
                // snap-to-truth: the server total replaces whatever the
                // display extrapolated, even if that steps backward
                let _ = session_sender.send(fresh);
            }
        }
    }
}
