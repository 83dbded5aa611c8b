use std::{sync::Arc, time::Duration};

use axum::{
    http::Method,
    routing::{get, post},
    Extension, Router,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::sync::{mpsc::UnboundedSender, watch};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::api_client::ApiClient;
use crate::limiter::ActivityLimiter;
use crate::models::{ActivityType, MiningSession};
use crate::systems::{
    decay_system::decay_system, display_ticker_system::display_ticker_system,
    heartbeat_system::heartbeat_system, session_state_system::session_state_system,
};

mod accrual;
mod api_client;
mod efficiency;
mod limiter;
mod models;
mod retry;
mod routes;
mod systems;

pub const DAILY_ACTIVITY_LIMIT: i64 = 10;

pub const DISPLAY_TICK_MS: u64 = 200;
pub const DECAY_CHECK_INTERVAL_MS: u64 = 30_000;
pub const DECAY_IDLE_MINUTES: f64 = 2.0;
pub const COMBO_RESET_IDLE_MINUTES: f64 = 5.0;
pub const MIN_EFFICIENCY: i32 = 50;
pub const MAX_EFFICIENCY: i32 = 100;
pub const EFFICIENCY_RECOVERY_PER_ACTIVITY: i32 = 5;
pub const COMBO_STEP_PER_ACTIVITY: f64 = 0.1;
pub const MAX_COMBO_MULTIPLIER: f64 = 3.0;

pub const RETRY_MAX_ATTEMPTS: u32 = 3;
pub const RETRY_INITIAL_DELAY_MS: u64 = 1000;

pub struct Config {
    pub user_id: String,
    pub password: String,
    pub heartbeat_interval: Duration,
    pub inactivity_timeout: Duration,
    pub stats_enabled: bool,
}

/// Mutations of the authoritative mining session. Only the session state
/// system applies these; everything else holds read-only projections.
#[derive(Debug)]
pub enum StoreCommand {
    Start(MiningSession),
    Stop,
    Reconcile(MiningSession),
}

/// A qualifying user action, fed to the decay system. Every interaction
/// resets the decay clock; only backend-confirmed rewards also restore
/// efficiency and grow the combo.
#[derive(Debug, Clone, Copy)]
pub struct InteractionEvent {
    pub activity_type: ActivityType,
    pub at: DateTime<Utc>,
    pub rewarded: bool,
}

#[derive(Clone)]
pub struct EngineReadHandles {
    pub session: watch::Receiver<MiningSession>,
    pub efficiency: watch::Receiver<models::EfficiencyState>,
    pub display: watch::Receiver<f64>,
}

#[derive(Clone)]
pub struct EngineSenders {
    pub store: UnboundedSender<StoreCommand>,
    pub interactions: UnboundedSender<InteractionEvent>,
}

#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    #[arg(
        long,
        value_name = "port",
        help = "Port for the local control API",
        default_value = "3000",
        global = true
    )]
    port: u16,
    #[arg(
        long,
        value_name = "heartbeat interval",
        help = "Seconds between mining heartbeats",
        default_value = "30",
        global = true
    )]
    heartbeat_interval: u64,
    #[arg(
        long,
        value_name = "inactivity timeout",
        help = "Seconds of idle time before the mining session is stopped",
        default_value = "600",
        global = true
    )]
    inactivity_timeout: u64,
    #[arg(long, short, action, help = "Enable stats endpoints")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let engine_logs = tracing_appender::rolling::daily("./logs", "ember-mining-engine.log");
    let (engine_logs, _guard) = tracing_appender::non_blocking(engine_logs);
    let engine_log_layer = tracing_subscriber::fmt::layer()
        .with_writer(engine_logs)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "engine_log"
        }));

    let reward_logs = tracing_appender::rolling::daily("./logs", "ember-mining-rewards.log");
    let (reward_logs, _guard) = tracing_appender::non_blocking(reward_logs);
    let reward_log_layer = tracing_subscriber::fmt::layer()
        .with_writer(reward_logs)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "reward_log"
        }));

    let console_log_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "engine_log" || metadata.target() == "reward_log"
        }));

    tracing_subscriber::registry()
        .with(engine_log_layer)
        .with(reward_log_layer)
        .with(console_log_layer)
        .init();

    // load envs
    let base_url = std::env::var("API_BASE_URL").expect("API_BASE_URL must be set.");
    let api_token = std::env::var("API_TOKEN").expect("API_TOKEN must be set.");
    let user_id = std::env::var("USER_ID").expect("USER_ID must be set.");
    let password = std::env::var("PASSWORD").expect("PASSWORD must be set.");

    let api_client = Arc::new(ApiClient::new(base_url, api_token));
    let limiter = Arc::new(ActivityLimiter::new(api_client.clone()));

    let config = Arc::new(Config {
        user_id: user_id.clone(),
        password,
        heartbeat_interval: Duration::from_secs(args.heartbeat_interval),
        inactivity_timeout: Duration::from_secs(args.inactivity_timeout),
        stats_enabled: args.stats,
    });

    info!(target: "engine_log", "Loading mining session for {}", user_id);
    let initial_session = match api_client.get_mining_session(&user_id).await {
        Ok(Some(session)) => {
            info!(target: "engine_log", "Resuming mining session, {} tokens confirmed", session.accumulated_tokens);
            session
        }
        Ok(None) => {
            info!(target: "engine_log", "No mining session on backend yet");
            MiningSession::idle(user_id.clone())
        }
        Err(e) => {
            error!(target: "engine_log", "Failed to load mining session, starting idle: {}", e);
            MiningSession::idle(user_id.clone())
        }
    };

    let (store_sender, store_receiver) = tokio::sync::mpsc::unbounded_channel::<StoreCommand>();
    let (interaction_sender, interaction_receiver) =
        tokio::sync::mpsc::unbounded_channel::<InteractionEvent>();

    let initial_display = initial_session.accumulated_tokens;
    let (session_sender, session_receiver) = watch::channel(initial_session);
    let (efficiency_sender, efficiency_receiver) = watch::channel(efficiency::fresh(Utc::now()));
    let (display_sender, display_receiver) = watch::channel(initial_display);

    // Single writer of the authoritative session record
    tokio::spawn(session_state_system(store_receiver, session_sender));

    // Engagement decay, gated on the session lifecycle
    let app_session_receiver = session_receiver.clone();
    tokio::spawn(decay_system(
        app_session_receiver,
        interaction_receiver,
        efficiency_sender,
    ));

    // Display interpolation between authoritative updates
    let app_session_receiver = session_receiver.clone();
    tokio::spawn(display_ticker_system(app_session_receiver, display_sender));

    // Keep the session alive server-side and reconcile on each beat
    let app_api_client = api_client.clone();
    let app_config = config.clone();
    let app_session_receiver = session_receiver.clone();
    let app_efficiency_receiver = efficiency_receiver.clone();
    let app_store_sender = store_sender.clone();
    tokio::spawn(heartbeat_system(
        app_api_client,
        app_config,
        app_session_receiver,
        app_efficiency_receiver,
        app_store_sender,
    ));

    let handles = EngineReadHandles {
        session: session_receiver,
        efficiency: efficiency_receiver,
        display: display_receiver,
    };
    let senders = EngineSenders {
        store: store_sender,
        interactions: interaction_sender,
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(tower_http::cors::Any);

    let app = Router::new()
        .route("/mining/stats", get(routes::get_mining_stats))
        .route("/mining/start", post(routes::post_start_mining))
        .route("/mining/stop", post(routes::post_stop_mining))
        .route("/activity", post(routes::post_activity))
        .route("/activity/count", get(routes::get_activity_count))
        .layer(Extension(config))
        .layer(Extension(api_client))
        .layer(Extension(limiter))
        .layer(Extension(handles))
        .layer(Extension(senders))
        // Logging
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .unwrap();

    tracing::info!(target: "engine_log", "listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();

    Ok(())
}
