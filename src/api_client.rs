use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::{ActivityCount, ActivityRecord, ActivityType, InsertActivity, MiningSession};

#[derive(Debug)]
pub enum ApiClientError {
    RequestFailed,
    BadStatus(StatusCode),
    MalformedResponse,
}

impl fmt::Display for ApiClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiClientError::RequestFailed => write!(f, "request failed"),
            ApiClientError::BadStatus(status) => write!(f, "unexpected status {}", status),
            ApiClientError::MalformedResponse => write!(f, "malformed response body"),
        }
    }
}

impl std::error::Error for ApiClientError {}

/// Thin client over the mining backend. The backend was a hosted table store
/// and is mid-migration to REST, so every operation here is a plain HTTP call
/// against the new endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl ApiClient {
    pub fn new(base_url: String, api_token: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        ApiClient {
            http: reqwest::Client::new(),
            base_url,
            api_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get_mining_session(
        &self,
        user_id: &str,
    ) -> Result<Option<MiningSession>, ApiClientError> {
        let res = self
            .http
            .get(self.url("/mining/session/"))
            .bearer_auth(&self.api_token)
            .query(&[("user_id", user_id)])
            .send()
            .await;

        match res {
            Ok(response) => {
                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !response.status().is_success() {
                    error!(target: "engine_log", "Failed to get mining session: status {}", response.status());
                    return Err(ApiClientError::BadStatus(response.status()));
                }
                match response.json::<MiningSession>().await {
                    Ok(session) => Ok(Some(session)),
                    Err(e) => {
                        error!(target: "engine_log", "Failed to parse mining session: {}", e);
                        Err(ApiClientError::MalformedResponse)
                    }
                }
            }
            Err(e) => {
                error!(target: "engine_log", "Failed to get mining session: {}", e);
                Err(ApiClientError::RequestFailed)
            }
        }
    }

    pub async fn start_mining(&self, user_id: &str) -> Result<MiningSession, ApiClientError> {
        let res = self
            .http
            .post(self.url("/mining/start/"))
            .bearer_auth(&self.api_token)
            .query(&[("user_id", user_id)])
            .send()
            .await;

        match res {
            Ok(response) => {
                if !response.status().is_success() {
                    error!(target: "engine_log", "Failed to start mining: status {}", response.status());
                    return Err(ApiClientError::BadStatus(response.status()));
                }
                match response.json::<MiningSession>().await {
                    Ok(session) => Ok(session),
                    Err(e) => {
                        error!(target: "engine_log", "Failed to parse started mining session: {}", e);
                        Err(ApiClientError::MalformedResponse)
                    }
                }
            }
            Err(e) => {
                error!(target: "engine_log", "Failed to start mining: {}", e);
                Err(ApiClientError::RequestFailed)
            }
        }
    }

    pub async fn stop_mining(&self, user_id: &str) -> Result<(), ApiClientError> {
        let res = self
            .http
            .post(self.url("/mining/stop/"))
            .bearer_auth(&self.api_token)
            .query(&[("user_id", user_id)])
            .send()
            .await;

        match res {
            Ok(response) => {
                if response.status() == StatusCode::OK {
                    Ok(())
                } else {
                    error!(target: "engine_log", "Failed to stop mining: status {}", response.status());
                    Err(ApiClientError::BadStatus(response.status()))
                }
            }
            Err(e) => {
                error!(target: "engine_log", "Failed to stop mining: {}", e);
                Err(ApiClientError::RequestFailed)
            }
        }
    }

    /// Liveness signal keeping the session active server-side. Never throws;
    /// the heartbeat loop decides what to do on the next tick.
    pub async fn send_mining_heartbeat(&self, user_id: &str) -> bool {
        let res = self
            .http
            .patch(self.url("/mining/heartbeat/"))
            .bearer_auth(&self.api_token)
            .query(&[("user_id", user_id)])
            .send()
            .await;

        match res {
            Ok(response) => {
                if response.status() == StatusCode::OK {
                    true
                } else {
                    error!(target: "engine_log", "Heartbeat rejected: status {}", response.status());
                    false
                }
            }
            Err(e) => {
                error!(target: "engine_log", "Heartbeat failed: {}", e);
                false
            }
        }
    }

    /// Lighter ping used when the session is still within its idle budget.
    pub async fn activity_check(&self, user_id: &str) -> bool {
        let res = self
            .http
            .patch(self.url("/mining/activity-check/"))
            .bearer_auth(&self.api_token)
            .query(&[("user_id", user_id)])
            .send()
            .await;

        match res {
            Ok(response) => {
                if response.status() == StatusCode::OK {
                    true
                } else {
                    error!(target: "engine_log", "Activity check rejected: status {}", response.status());
                    false
                }
            }
            Err(e) => {
                error!(target: "engine_log", "Activity check failed: {}", e);
                false
            }
        }
    }

    /// Count of a user's activity records created at or after `since`. With no
    /// explicit type the backend excludes `mining` records, which do not count
    /// against the daily cap.
    pub async fn count_activities_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        activity_type: Option<ActivityType>,
    ) -> Result<i64, ApiClientError> {
        let mut params = vec![
            ("user_id".to_string(), user_id.to_string()),
            ("since".to_string(), since.to_rfc3339()),
        ];
        match activity_type {
            Some(ty) => params.push(("activity_type".to_string(), ty.to_string())),
            None => params.push((
                "exclude_type".to_string(),
                ActivityType::Mining.to_string(),
            )),
        }

        let res = self
            .http
            .get(self.url("/activities/count/"))
            .bearer_auth(&self.api_token)
            .query(&params)
            .send()
            .await;

        match res {
            Ok(response) => {
                if !response.status().is_success() {
                    error!(target: "engine_log", "Failed to count activities: status {}", response.status());
                    return Err(ApiClientError::BadStatus(response.status()));
                }
                match response.json::<ActivityCount>().await {
                    Ok(body) => Ok(body.count),
                    Err(e) => {
                        error!(target: "engine_log", "Failed to parse activity count: {}", e);
                        Err(ApiClientError::MalformedResponse)
                    }
                }
            }
            Err(e) => {
                error!(target: "engine_log", "Failed to count activities: {}", e);
                Err(ApiClientError::RequestFailed)
            }
        }
    }

    /// Requests a reward record for a qualifying user action. The reward path
    /// wraps this in `fetch_with_retry` for at-least-once delivery.
    pub async fn record_activity(
        &self,
        activity: InsertActivity,
    ) -> Result<ActivityRecord, ApiClientError> {
        let id = Uuid::new_v4();
        info!(target: "reward_log", "{} - Recording {} activity for {}", id, activity.activity_type, activity.user_id);

        let res = self
            .http
            .post(self.url("/activities/"))
            .bearer_auth(&self.api_token)
            .json(&activity)
            .send()
            .await;

        match res {
            Ok(response) => {
                if !response.status().is_success() {
                    error!(target: "reward_log", "{} - Activity rejected: status {}", id, response.status());
                    return Err(ApiClientError::BadStatus(response.status()));
                }
                match response.json::<ActivityRecord>().await {
                    Ok(record) => {
                        info!(target: "reward_log", "{} - Granted {} tokens", id, record.tokens);
                        Ok(record)
                    }
                    Err(e) => {
                        error!(target: "reward_log", "{} - Failed to parse activity record: {}", id, e);
                        Err(ApiClientError::MalformedResponse)
                    }
                }
            }
            Err(e) => {
                error!(target: "reward_log", "{} - Activity request failed: {}", id, e);
                Err(ApiClientError::RequestFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::{get, patch, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
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

    #[tokio::test]
    async fn heartbeat_returns_true_on_ok() {
        let app = Router::new().route("/mining/heartbeat/", patch(|| async { StatusCode::OK }));
        let client = client_for(spawn_backend(app).await);
        assert!(client.send_mining_heartbeat("u-1").await);
    }

    #[tokio::test]
    async fn heartbeat_returns_false_on_server_error() {
        let app = Router::new().route(
            "/mining/heartbeat/",
            patch(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let client = client_for(spawn_backend(app).await);
        assert!(!client.send_mining_heartbeat("u-1").await);
    }

    #[tokio::test]
    async fn heartbeat_returns_false_when_unreachable() {
        // bind then drop to get a port nothing is listening on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client_for(addr);
        assert!(!client.send_mining_heartbeat("u-1").await);
    }

    #[tokio::test]
    async fn missing_session_maps_to_none() {
        let app = Router::new().route(
            "/mining/session/",
            get(|| async { StatusCode::NOT_FOUND }),
        );
        let client = client_for(spawn_backend(app).await);
        assert!(client.get_mining_session("u-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_body_is_parsed() {
        let app = Router::new().route(
            "/mining/session/",
            get(|| async {
                Json(json!({
                    "user_id": "u-1",
                    "is_mining": true,
                    "accumulated_tokens": 15.5,
                    "current_rate_per_minute": 6.0,
                    "last_heartbeat": "2026-08-07T10:00:00Z"
                }))
            }),
        );
        let client = client_for(spawn_backend(app).await);
        let session = client.get_mining_session("u-1").await.unwrap().unwrap();
        assert!(session.is_mining);
        assert_eq!(session.accumulated_tokens, 15.5);
    }

    #[tokio::test]
    async fn count_query_carries_exclusion_for_global_cap() {
        let app = Router::new().route(
            "/activities/count/",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("exclude_type").map(String::as_str), Some("mining"));
                assert!(params.contains_key("since"));
                Json(json!({ "count": 4 }))
            }),
        );
        let client = client_for(spawn_backend(app).await);
        let count = client
            .count_activities_since("u-1", Utc::now(), None)
            .await
            .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn record_activity_parses_granted_record() {
        let app = Router::new().route(
            "/activities/",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["activity_type"], "like");
                Json(json!({
                    "id": 31,
                    "user_id": "u-1",
                    "activity_type": "like",
                    "points": 5,
                    "tokens": 0.5,
                    "created_at": "2026-08-07T10:00:00Z"
                }))
            }),
        );
        let client = client_for(spawn_backend(app).await);
        let record = client
            .record_activity(InsertActivity {
                user_id: "u-1".to_string(),
                activity_type: ActivityType::Like,
            })
            .await
            .unwrap();
        assert_eq!(record.id, 31);
        assert_eq!(record.points, 5);
    }
}
