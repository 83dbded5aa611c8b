use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tracing::error;

use crate::api_client::ApiClient;
use crate::models::ActivityType;
use crate::DAILY_ACTIVITY_LIMIT;

/// Daily ceiling on rewarded actions, consulted before any reward is granted.
/// Backend failures fail open: a user is never blocked because the count
/// query was down.
pub struct ActivityLimiter {
    api_client: Arc<ApiClient>,
}

impl ActivityLimiter {
    pub fn new(api_client: Arc<ApiClient>) -> Self {
        ActivityLimiter { api_client }
    }

    /// True iff the user has exhausted today's reward-granting actions.
    pub async fn check_daily_activity_limit(&self, user_id: &str) -> bool {
        match self
            .api_client
            .count_activities_since(user_id, start_of_today(), None)
            .await
        {
            Ok(count) => is_limited(count),
            Err(e) => {
                error!(target: "engine_log", "Failed to get daily activity count, treating as not limited: {}", e);
                false
            }
        }
    }

    pub async fn get_activity_count_by_type(&self, user_id: &str, activity_type: ActivityType) -> i64 {
        match self
            .api_client
            .count_activities_since(user_id, start_of_today(), Some(activity_type))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!(target: "engine_log", "Failed to get {} activity count, treating as 0: {}", activity_type, e);
                0
            }
        }
    }
}

pub fn is_limited(count: i64) -> bool {
    count >= DAILY_ACTIVITY_LIMIT
}

/// Today's boundary is local wall-clock midnight, not the server's timezone.
/// Known skew source; the backend counts with whatever instant we hand it.
pub fn start_of_today() -> DateTime<Utc> {
    let now = Local::now();
    match now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_local_timezone(Local))
    {
        Some(chrono::LocalResult::Single(start)) => start.with_timezone(&Utc),
        Some(chrono::LocalResult::Ambiguous(earliest, _)) => earliest.with_timezone(&Utc),
        _ => now.with_timezone(&Utc),
    }
}
