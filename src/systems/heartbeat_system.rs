use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tracing::{error, info};

use crate::api_client::ApiClient;
use crate::models::{EfficiencyState, MiningSession};
use crate::{Config, StoreCommand};

/// Keeps the mining session alive server-side and reconciles the cached
/// session against the authoritative one. Failed calls log and wait for the
/// next tick; the loop interval is the retry policy.
pub async fn heartbeat_system(
    api_client: Arc<ApiClient>,
    config: Arc<Config>,
    session_receiver: watch::Receiver<MiningSession>,
    efficiency_receiver: watch::Receiver<EfficiencyState>,
    store_sender: UnboundedSender<StoreCommand>,
) {
    let mut ticker = tokio::time::interval(config.heartbeat_interval);
    loop {
        ticker.tick().await;
        if !session_receiver.borrow().is_mining {
            continue;
        }
        let user_id = config.user_id.as_str();

        if api_client.send_mining_heartbeat(user_id).await {
            match api_client.get_mining_session(user_id).await {
                Ok(Some(fresh)) => {
                    let _ = store_sender.send(StoreCommand::Reconcile(fresh));
                }
                Ok(None) => {
                    error!(target: "engine_log", "Mining session missing on backend, stopping");
                    let _ = store_sender.send(StoreCommand::Stop);
                }
                Err(e) => {
                    error!(target: "engine_log", "Failed to refresh mining session: {}", e);
                }
            }
        }

        let last_interaction = efficiency_receiver.borrow().last_interaction;
        let timed_out = idle_longer_than(last_interaction, config.inactivity_timeout);
        let ok =
            check_inactivity(&api_client, user_id, last_interaction, config.inactivity_timeout)
                .await;
        if timed_out && ok {
            let _ = store_sender.send(StoreCommand::Stop);
        }
    }
}

/// Past the inactivity timeout the session is stopped server-side and the
/// result of that stop is returned; inside the budget a lighter
/// activity-check ping goes out instead.
pub async fn check_inactivity(
    api_client: &ApiClient,
    user_id: &str,
    last_activity_at: DateTime<Utc>,
    inactivity_timeout: Duration,
) -> bool {
    if idle_longer_than(last_activity_at, inactivity_timeout) {
        info!(target: "engine_log", "User idle past {}s, stopping mining session", inactivity_timeout.as_secs());
        match api_client.stop_mining(user_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(target: "engine_log", "Failed to stop inactive mining session: {}", e);
                false
            }
        }
    } else {
        api_client.activity_check(user_id).await
    }
}

fn idle_longer_than(last_activity_at: DateTime<Utc>, timeout: Duration) -> bool {
    Utc::now().signed_duration_since(last_activity_at).num_seconds() > timeout.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{patch, post};
    use axum::Router;
    use chrono::Duration as ChronoDuration;
    use std::net::SocketAddr;

    async fn spawn_backend(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr) -> ApiClient {
        ApiClient::new(format!("http://{}", addr), "test-token".to_string())
    }

    // backend that only accepts stops: proves which endpoint was chosen
    fn stop_only_backend() -> Router {
        Router::new().route("/mining/stop/", post(|| async { StatusCode::OK }))
    }

    fn check_only_backend() -> Router {
        Router::new().route("/mining/activity-check/", patch(|| async { StatusCode::OK }))
    }

    #[tokio::test]
    async fn idle_past_timeout_stops_the_session() {
        let client = client_for(spawn_backend(stop_only_backend()).await);
        let stale = Utc::now() - ChronoDuration::minutes(30);
        assert!(check_inactivity(&client, "u-1", stale, Duration::from_secs(600)).await);
    }

    #[tokio::test]
    async fn recent_activity_pings_the_activity_check() {
        let client = client_for(spawn_backend(check_only_backend()).await);
        let recent = Utc::now() - ChronoDuration::seconds(30);
        assert!(check_inactivity(&client, "u-1", recent, Duration::from_secs(600)).await);
    }

    #[tokio::test]
    async fn failed_stop_reports_false() {
        // only the activity-check route exists, so the stop call 404s
        let client = client_for(spawn_backend(check_only_backend()).await);
        let stale = Utc::now() - ChronoDuration::minutes(30);
        assert!(!check_inactivity(&client, "u-1", stale, Duration::from_secs(600)).await);
    }
}
