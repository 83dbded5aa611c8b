use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Post,
    Comment,
    Like,
    Share,
    Invite,
    Mining,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Post => "post",
            ActivityType::Comment => "comment",
            ActivityType::Like => "like",
            ActivityType::Share => "share",
            ActivityType::Invite => "invite",
            ActivityType::Mining => "mining",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ActivityType::Post),
            "comment" => Ok(ActivityType::Comment),
            "like" => Ok(ActivityType::Like),
            "share" => Ok(ActivityType::Share),
            "invite" => Ok(ActivityType::Invite),
            "mining" => Ok(ActivityType::Mining),
            other => Err(format!("Unknown activity type: {}", other)),
        }
    }
}

/// Server-owned mining session row, cached client-side. `accumulated_tokens`
/// only ever advances through server confirmation; the display interpolation
/// in `accrual` never writes back into this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningSession {
    pub user_id: String,
    pub is_mining: bool,
    pub accumulated_tokens: f64,
    pub current_rate_per_minute: f64,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl MiningSession {
    pub fn idle(user_id: String) -> Self {
        MiningSession {
            user_id,
            is_mining: false,
            accumulated_tokens: 0.0,
            current_rate_per_minute: 0.0,
            last_heartbeat: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub user_id: String,
    pub activity_type: ActivityType,
    pub points: i64,
    pub tokens: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsertActivity {
    pub user_id: String,
    pub activity_type: ActivityType,
}

#[derive(Debug, Deserialize)]
pub struct ActivityCount {
    pub count: i64,
}

/// Client-local engagement state. Owned and written exclusively by the decay
/// system; everyone else reads a watch projection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EfficiencyState {
    pub efficiency: i32,
    pub combo_multiplier: f64,
    pub last_interaction: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MiningStatsResponse {
    pub user_id: String,
    pub is_mining: bool,
    pub display_tokens: f64,
    pub accumulated_tokens: f64,
    pub current_rate_per_minute: f64,
    /// Server rate scaled by the current efficiency and combo, the number the
    /// UI shows as "your mining rate". Accrual itself sticks to the server
    /// rate; the server owns multiplier application.
    pub effective_rate_per_minute: f64,
    pub efficiency: i32,
    pub combo_multiplier: f64,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ActivityCountResponse {
    pub activity_type: ActivityType,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_type_round_trips_through_str() {
        for ty in [
            ActivityType::Post,
            ActivityType::Comment,
            ActivityType::Like,
            ActivityType::Share,
            ActivityType::Invite,
            ActivityType::Mining,
        ] {
            assert_eq!(ty.as_str().parse::<ActivityType>().unwrap(), ty);
        }
        assert!("downvote".parse::<ActivityType>().is_err());
    }

    #[test]
    fn mining_session_deserializes_without_heartbeat() {
        let session: MiningSession = serde_json::from_str(
            r#"{"user_id":"u-1","is_mining":true,"accumulated_tokens":12.5,"current_rate_per_minute":3.0,"last_heartbeat":null}"#,
        )
        .unwrap();
        assert!(session.is_mining);
        assert!(session.last_heartbeat.is_none());
    }
}
