use std::str::FromStr;
use std::sync::Arc;

use axum::extract::Query;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::api_client::ApiClient;
use crate::limiter::ActivityLimiter;
use crate::models::{
    ActivityCountResponse, ActivityRecord, ActivityType, InsertActivity, MiningSession,
    MiningStatsResponse,
};
use crate::retry::fetch_with_retry;
use crate::{Config, EngineReadHandles, EngineSenders, InteractionEvent, StoreCommand};

#[derive(Deserialize)]
pub struct AuthParams {
    p: String,
}

#[derive(Deserialize)]
pub struct ActivityCountParams {
    activity_type: String,
}

#[derive(Deserialize)]
pub struct PostActivityRequest {
    activity_type: String,
}

pub async fn get_mining_stats(
    Extension(handles): Extension<EngineReadHandles>,
) -> Result<Json<MiningStatsResponse>, String> {
    let session = handles.session.borrow().clone();
    let efficiency = *handles.efficiency.borrow();
    let display_tokens = *handles.display.borrow();

    let effective_rate_per_minute = session.current_rate_per_minute
        * (efficiency.efficiency as f64 / 100.0)
        * efficiency.combo_multiplier;

    Ok(Json(MiningStatsResponse {
        user_id: session.user_id,
        is_mining: session.is_mining,
        display_tokens,
        accumulated_tokens: session.accumulated_tokens,
        current_rate_per_minute: session.current_rate_per_minute,
        effective_rate_per_minute,
        efficiency: efficiency.efficiency,
        combo_multiplier: efficiency.combo_multiplier,
        last_heartbeat: session.last_heartbeat,
    }))
}

pub async fn post_start_mining(
    query_params: Query<AuthParams>,
    Extension(app_config): Extension<Arc<Config>>,
    Extension(api_client): Extension<Arc<ApiClient>>,
    Extension(senders): Extension<EngineSenders>,
) -> Result<Json<MiningSession>, String> {
    if !query_params.p.eq(app_config.password.as_str()) {
        return Err("Unauthorized".to_string());
    }

    match api_client.start_mining(&app_config.user_id).await {
        Ok(session) => {
            let _ = senders.store.send(StoreCommand::Start(session.clone()));
            Ok(Json(session))
        }
        Err(_) => Err("Failed to start mining session".to_string()),
    }
}

pub async fn post_stop_mining(
    query_params: Query<AuthParams>,
    Extension(app_config): Extension<Arc<Config>>,
    Extension(api_client): Extension<Arc<ApiClient>>,
    Extension(senders): Extension<EngineSenders>,
) -> Result<String, String> {
    if !query_params.p.eq(app_config.password.as_str()) {
        return Err("Unauthorized".to_string());
    }

    match api_client.stop_mining(&app_config.user_id).await {
        Ok(()) => {
            let _ = senders.store.send(StoreCommand::Stop);
            Ok("SUCCESS".to_string())
        }
        Err(_) => Err("Failed to stop mining session".to_string()),
    }
}

pub async fn post_activity(
    query_params: Query<AuthParams>,
    Extension(app_config): Extension<Arc<Config>>,
    Extension(api_client): Extension<Arc<ApiClient>>,
    Extension(limiter): Extension<Arc<ActivityLimiter>>,
    Extension(senders): Extension<EngineSenders>,
    Json(payload): Json<PostActivityRequest>,
) -> Result<Json<ActivityRecord>, String> {
    if !query_params.p.eq(app_config.password.as_str()) {
        return Err("Unauthorized".to_string());
    }

    let activity_type = ActivityType::from_str(&payload.activity_type)?;
    if activity_type == ActivityType::Mining {
        return Err("Mining activity is not rewarded through this endpoint".to_string());
    }

    if limiter.check_daily_activity_limit(&app_config.user_id).await {
        info!(target: "reward_log", "Daily activity limit reached for {}", app_config.user_id);
        // the action still happened, so the decay clock resets without reward
        let _ = senders.interactions.send(InteractionEvent {
            activity_type,
            at: Utc::now(),
            rewarded: false,
        });
        return Err("Daily activity limit reached".to_string());
    }

    let activity = InsertActivity {
        user_id: app_config.user_id.clone(),
        activity_type,
    };
    match fetch_with_retry("record_activity", || {
        api_client.record_activity(activity.clone())
    })
    .await
    {
        Ok(record) => {
            let _ = senders.interactions.send(InteractionEvent {
                activity_type,
                at: Utc::now(),
                rewarded: true,
            });
            Ok(Json(record))
        }
        Err(_) => {
            let _ = senders.interactions.send(InteractionEvent {
                activity_type,
                at: Utc::now(),
                rewarded: false,
            });
            Err("Failed to record activity".to_string())
        }
    }
}

pub async fn get_activity_count(
    query_params: Query<ActivityCountParams>,
    Extension(app_config): Extension<Arc<Config>>,
    Extension(limiter): Extension<Arc<ActivityLimiter>>,
) -> Result<Json<ActivityCountResponse>, String> {
    if !app_config.stats_enabled {
        return Err("Stats not enabled for this engine.".to_string());
    }
    let activity_type = ActivityType::from_str(&query_params.activity_type)?;
    let count = limiter
        .get_activity_count_by_type(&app_config.user_id, activity_type)
        .await;
    Ok(Json(ActivityCountResponse {
        activity_type,
        count,
    }))
}
